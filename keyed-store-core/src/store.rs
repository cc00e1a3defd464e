//! Keyed state store with per-field subscriptions
//!
//! The store holds one state record and notifies listeners per field. All
//! state changes go through [`Store::dispatch`]:
//!
//! 1. a fresh [`Batch`] is allocated,
//! 2. the middleware may cancel the dispatch or merge extra fields into it,
//! 3. every incoming field is resolved, through its transform when one is
//!    registered, or by direct assignment (optionally skipping unchanged
//!    values),
//! 4. the resolved changed-set is merged into a new state record,
//! 5. listeners of exactly the changed fields run, then `on_changed`, then the
//!    middleware's `after_dispatch`. In hand-off mode step 5 is left to the
//!    owner, who calls [`Store::execute_listeners`] later.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::debug::{DispatchLogConfig, DispatchLogHandle, DispatchLoggerMiddleware};
use crate::dispatch::{Batch, DispatchOutcome, DispatchStatus};
use crate::error::{Result, StoreError};
use crate::middleware::{BeforeDispatch, ComposedMiddleware, Middleware};
use crate::options::{DispatchArgs, DispatchOptions};
use crate::record::{merge_into, value_kind, IntoRecord, Record};
use crate::registry::{Listener, SubscriberRegistry, Unsubscribe};

/// Per-field transform: `(incoming value, current state) -> changed fields`.
///
/// The returned record is what enters the changed-set, not the incoming
/// value. It may name other fields, or be empty to suppress the update.
pub type Transform = Arc<dyn Fn(&Value, &Record) -> Record + Send + Sync>;

/// Build a [`Transform`] from a closure
pub fn transform<F>(f: F) -> Transform
where
    F: Fn(&Value, &Record) -> Record + Send + Sync + 'static,
{
    Arc::new(f)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve an update against the current state into a changed-set.
///
/// Fields are visited in the update's order. A transform fully decides its
/// field's contribution and bypasses `check`.
fn resolve_changes(
    transforms: &HashMap<String, Transform>,
    current: &Record,
    next: Record,
    check: bool,
) -> Record {
    let mut changed = Record::new();

    for (field, incoming) in next {
        if let Some(transform) = transforms.get(&field) {
            let contribution = transform(&incoming, current);
            tracing::trace!(
                field = %field,
                produced = contribution.len(),
                "transform applied"
            );
            merge_into(&mut changed, contribution);
        } else if check && current.get(&field) == Some(&incoming) {
            tracing::trace!(field = %field, "unchanged, skipped");
        } else {
            changed.insert(field, incoming);
        }
    }

    changed
}

/// Live state plus the revision counting effective dispatches
struct StateCell {
    record: Arc<Record>,
    revision: u64,
}

struct Inner {
    state: RwLock<StateCell>,
    transforms: HashMap<String, Transform>,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    pending: Mutex<HashMap<Batch, DispatchOptions>>,
    last_batch: AtomicU64,
    hand_off: AtomicBool,
    defaults: RwLock<DispatchOptions>,
    middleware: RwLock<Option<Arc<dyn Middleware>>>,
    log: Option<DispatchLogHandle>,
}

/// Keyed state store
///
/// `Store` is a handle: clones share the same state, subscribers and
/// counters. Separately constructed stores share nothing.
///
/// No lock is held while listeners, hooks or `on_changed` callbacks run, so
/// they may read from the store, subscribe, unsubscribe or dispatch again.
/// Transforms are the exception: they run while the state is locked and
/// must not call back into the store.
///
/// # Example
/// ```
/// use keyed_store_core::{listener, DispatchOptions, Store};
/// use serde_json::json;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let store = Store::new(json!({"count": 0, "name": "a"}));
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let h = hits.clone();
/// let _sub = store.subscribe(listener(move || { h.fetch_add(1, Ordering::SeqCst); }), "count");
///
/// store.dispatch(json!({"count": 1}), DispatchOptions::new().with_check(true));
/// assert_eq!(store.field("count"), Some(json!(1)));
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Create a store with an initial state and no transforms
    pub fn new(initial: impl IntoRecord) -> Self {
        StoreBuilder::new(initial).build()
    }

    /// Create a store with an initial state and per-field transforms
    pub fn with_transforms<I, K>(initial: impl IntoRecord, transforms: I) -> Self
    where
        I: IntoIterator<Item = (K, Transform)>,
        K: Into<String>,
    {
        let mut builder = StoreBuilder::new(initial);
        for (field, t) in transforms {
            builder.transforms.insert(field.into(), t);
        }
        builder.build()
    }

    /// Start building a store
    pub fn builder(initial: impl IntoRecord) -> StoreBuilder {
        StoreBuilder::new(initial)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Current state snapshot
    ///
    /// Every dispatch that changes at least one field installs a new record.
    /// [`set_unsynchronized`](Self::set_unsynchronized) may also install a
    /// copy while snapshots are held, so pointer identity alone does not
    /// tell dispatches apart from silent writes: compare
    /// [`revision`](Self::revision) for that.
    pub fn state(&self) -> Arc<Record> {
        read(&self.inner.state).record.clone()
    }

    /// Number of dispatches that changed at least one field
    ///
    /// Silent writes through [`set_unsynchronized`](Self::set_unsynchronized)
    /// leave it untouched.
    pub fn revision(&self) -> u64 {
        read(&self.inner.state).revision
    }

    /// Current value of one field
    pub fn field(&self, name: &str) -> Option<Value> {
        read(&self.inner.state).record.get(name).cloned()
    }

    /// Current value of one field, decoded into `T`
    pub fn field_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .field(name)
            .ok_or_else(|| StoreError::MissingField(name.to_string()))?;
        serde_json::from_value(value).map_err(|source| StoreError::Decode {
            field: name.to_string(),
            source,
        })
    }

    /// Write fields straight into the live state, bypassing dispatch.
    ///
    /// No batch is allocated, no transform runs, no listener, `on_changed`
    /// or middleware hook fires. Subscribers will not learn about this
    /// change until a later dispatch touches the same fields, so use this
    /// sparingly: it is meant for state that must never trigger a refresh.
    ///
    /// The record is updated in place when no snapshot is held. Otherwise
    /// held snapshots keep the old values and a copy is installed; either
    /// way [`revision`](Self::revision) does not move. Callers writing from
    /// several threads while also dispatching must order those calls
    /// themselves.
    pub fn set_unsynchronized(&self, partial: impl IntoRecord) {
        let partial = partial.into_record();
        let mut state = write(&self.inner.state);
        merge_into(Arc::make_mut(&mut state.record), partial);
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register `listener` on `field`
    ///
    /// Registering the same listener on the same field again changes
    /// nothing, but still returns a working handle.
    pub fn subscribe(&self, listener: Listener, field: &str) -> Unsubscribe {
        let added = lock(&self.inner.subscribers).subscribe(field, listener.clone());
        if !added {
            tracing::trace!(field = %field, "listener already subscribed");
        }
        Unsubscribe::new(&self.inner.subscribers, field, listener)
    }

    /// Number of listeners on a field
    pub fn subscriber_count(&self, field: &str) -> usize {
        lock(&self.inner.subscribers).count(field)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Dispatch a partial update
    ///
    /// `args` is either [`DispatchOptions`] or a bare `on_changed` callback.
    /// Unset options take the store's defaults.
    ///
    /// Never fails: unknown fields are simply added, an empty update
    /// produces an empty changed-set. The only way to stop a dispatch is a
    /// middleware returning [`BeforeDispatch::Cancel`]; the batch number is
    /// consumed either way.
    pub fn dispatch(&self, next: impl IntoRecord, args: impl Into<DispatchArgs>) -> DispatchOutcome {
        let batch = Batch(self.inner.last_batch.fetch_add(1, Ordering::SeqCst) + 1);
        let mut next = next.into_record();
        let options = args
            .into()
            .into_options()
            .merged_over(&read(&self.inner.defaults));

        if let Some(middleware) = self.middleware() {
            match middleware.before_dispatch(batch, &next, &options) {
                BeforeDispatch::Continue => {}
                BeforeDispatch::Cancel => {
                    tracing::debug!(batch = batch.0, "dispatch cancelled");
                    return DispatchOutcome::cancelled(batch);
                }
                BeforeDispatch::Merge(extra) => merge_into(&mut next, extra),
            }
        }

        let changed = self.apply(next, options.check());

        if self.is_hand_off() {
            lock(&self.inner.pending).insert(batch, options);
            tracing::debug!(
                batch = batch.0,
                changed = changed.len(),
                "notification deferred"
            );
            return DispatchOutcome {
                batch,
                status: DispatchStatus::Deferred,
                changed,
            };
        }

        self.execute_listeners(batch, &changed, Some(options));
        DispatchOutcome {
            batch,
            status: DispatchStatus::Notified,
            changed,
        }
    }

    /// Resolve and apply an update, returning the changed-set.
    ///
    /// An empty changed-set leaves the current record in place.
    fn apply(&self, next: Record, check: bool) -> Record {
        let mut state = write(&self.inner.state);
        let changed = resolve_changes(&self.inner.transforms, &state.record, next, check);

        if !changed.is_empty() {
            let mut updated = Record::clone(&state.record);
            merge_into(&mut updated, changed.clone());
            state.record = Arc::new(updated);
            state.revision += 1;
        }

        changed
    }

    /// Run the notification pass for a batch
    ///
    /// Calls every listener registered on each field of `changed`, skipping
    /// any that an earlier listener unsubscribed during the pass, then the
    /// batch's `on_changed` with the current state, then the middleware's
    /// `after_dispatch`.
    ///
    /// When `options` is `None` they are taken from the options recorded
    /// by a hand-off dispatch. The record is consumed either way, so a
    /// second call for the same batch finds nothing: it logs a warning,
    /// skips `on_changed`, and still notifies listeners and middleware.
    pub fn execute_listeners(
        &self,
        batch: Batch,
        changed: &Record,
        options: Option<DispatchOptions>,
    ) {
        let recorded = lock(&self.inner.pending).remove(&batch);
        let options = options.or(recorded);

        for field in changed.keys() {
            let listeners = lock(&self.inner.subscribers).listeners(field);
            for listener in listeners {
                // May have been unsubscribed by an earlier listener this pass
                if !lock(&self.inner.subscribers).contains(field, &listener) {
                    continue;
                }
                listener();
            }
        }

        match options {
            Some(options) => {
                if let Some(on_changed) = options.on_changed {
                    let state = self.state();
                    on_changed(&state);
                }
            }
            None => tracing::warn!(
                batch = batch.0,
                "no dispatch options recorded for batch (already notified or never deferred)"
            ),
        }

        if let Some(middleware) = self.middleware() {
            middleware.after_dispatch(batch, changed);
        }
    }

    // ------------------------------------------------------------------
    // Extension points
    // ------------------------------------------------------------------

    /// Whether notification is left to the owner
    pub fn is_hand_off(&self) -> bool {
        self.inner.hand_off.load(Ordering::SeqCst)
    }

    /// Switch hand-off mode
    ///
    /// Only affects dispatches made after the switch; batches already
    /// deferred still wait for [`execute_listeners`](Self::execute_listeners).
    pub fn set_hand_off(&self, enabled: bool) {
        self.inner.hand_off.store(enabled, Ordering::SeqCst);
    }

    /// Options applied under every dispatch's own options
    pub fn default_options(&self) -> DispatchOptions {
        read(&self.inner.defaults).clone()
    }

    pub fn set_default_options(&self, options: DispatchOptions) {
        *write(&self.inner.defaults) = options;
    }

    /// Install the middleware, replacing any previous one
    ///
    /// This also replaces the builder's dispatch logger; the handle from
    /// [`dispatch_log`](Self::dispatch_log) then stops receiving entries.
    pub fn set_middleware<M: Middleware + 'static>(&self, middleware: M) {
        *write(&self.inner.middleware) = Some(Arc::new(middleware));
    }

    /// Remove the middleware
    pub fn clear_middleware(&self) {
        *write(&self.inner.middleware) = None;
    }

    fn middleware(&self) -> Option<Arc<dyn Middleware>> {
        read(&self.inner.middleware).clone()
    }

    /// Dispatch log installed by [`StoreBuilder::dispatch_log`] or
    /// [`StoreConfig::log`], if any
    pub fn dispatch_log(&self) -> Option<DispatchLogHandle> {
        self.inner.log.clone()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The most recently allocated batch (`Batch(0)` before any dispatch)
    pub fn current_batch(&self) -> Batch {
        Batch(self.inner.last_batch.load(Ordering::SeqCst))
    }

    /// Deferred batches still waiting for notification, oldest first
    pub fn pending_batches(&self) -> Vec<Batch> {
        let mut batches: Vec<Batch> = lock(&self.inner.pending).keys().copied().collect();
        batches.sort_unstable();
        batches
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*read(&self.inner.state).record)
            .field("revision", &self.revision())
            .field("transforms", &self.inner.transforms.keys().collect::<Vec<_>>())
            .field("subscribers", &*lock(&self.inner.subscribers))
            .field("last_batch", &self.current_batch())
            .field("hand_off", &self.is_hand_off())
            .finish()
    }
}

/// Builder for [`Store`]
///
/// ```
/// use keyed_store_core::{IntoRecord, StoreBuilder};
/// use serde_json::json;
///
/// let store = StoreBuilder::new(json!({"count": 0, "name": ""}))
///     .transform("count", |incoming, _state| {
///         json!({"count": incoming, "name": format!("n{}", incoming)}).into_record()
///     })
///     .build();
///
/// let outcome = store.dispatch(json!({"count": 5}), keyed_store_core::DispatchOptions::new());
/// assert_eq!(outcome.changed, json!({"count": 5, "name": "n5"}).into_record());
/// ```
pub struct StoreBuilder {
    initial: Record,
    transforms: HashMap<String, Transform>,
    middleware: ComposedMiddleware,
    defaults: DispatchOptions,
    hand_off: bool,
    log: Option<DispatchLogConfig>,
}

impl StoreBuilder {
    /// Start from an initial state
    pub fn new(initial: impl IntoRecord) -> Self {
        Self {
            initial: initial.into_record(),
            transforms: HashMap::new(),
            middleware: ComposedMiddleware::new(),
            defaults: DispatchOptions::default(),
            hand_off: false,
            log: None,
        }
    }

    /// Start from a JSON value, which must be an object
    pub fn from_value(initial: Value) -> Result<Self> {
        match initial {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(StoreError::NotAnObject {
                found: value_kind(&other),
            }),
        }
    }

    /// Register a transform for a field, replacing any earlier one
    pub fn transform<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &Record) -> Record + Send + Sync + 'static,
    {
        self.transforms.insert(field.into(), transform(f));
        self
    }

    /// Add a middleware. Several calls compose in call order.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Default dispatch options
    pub fn default_options(mut self, options: DispatchOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Start in hand-off mode
    pub fn hand_off(mut self, enabled: bool) -> Self {
        self.hand_off = enabled;
        self
    }

    /// Install a dispatch log, readable through [`Store::dispatch_log`]
    pub fn dispatch_log(mut self, config: DispatchLogConfig) -> Self {
        self.log = Some(config);
        self
    }

    /// Apply a [`StoreConfig`]
    ///
    /// Options the config leaves unset keep whatever
    /// [`default_options`](Self::default_options) set before.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.hand_off = config.hand_off;
        self.defaults = config.dispatch_defaults().merged_over(&self.defaults);
        if let Some(log) = &config.log {
            self.log = Some(log.to_log_config());
        }
        self
    }

    pub fn build(self) -> Store {
        let mut middleware = self.middleware;
        let mut log = None;
        if let Some(config) = self.log {
            let logger = DispatchLoggerMiddleware::new(config);
            log = Some(logger.handle());
            // Logger first so it sees cancellations from later middleware
            let mut with_logger = ComposedMiddleware::new().with(logger);
            if !middleware.is_empty() {
                with_logger.add(middleware);
            }
            middleware = with_logger;
        }

        let middleware: Option<Arc<dyn Middleware>> = if middleware.is_empty() {
            None
        } else {
            Some(Arc::new(middleware))
        };

        Store {
            inner: Arc::new(Inner {
                state: RwLock::new(StateCell {
                    record: Arc::new(self.initial),
                    revision: 0,
                }),
                transforms: self.transforms,
                subscribers: Arc::new(Mutex::new(SubscriberRegistry::new())),
                pending: Mutex::new(HashMap::new()),
                last_batch: AtomicU64::new(0),
                hand_off: AtomicBool::new(self.hand_off),
                defaults: RwLock::new(self.defaults),
                middleware: RwLock::new(middleware),
                log,
            }),
        }
    }
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("initial", &self.initial)
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field("middleware", &self.middleware)
            .field("defaults", &self.defaults)
            .field("hand_off", &self.hand_off)
            .finish()
    }
}
