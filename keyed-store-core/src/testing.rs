//! Test utilities for code built on keyed-store
//!
//! - [`ListenerProbe`]: a listener that counts its calls
//! - [`RecordingMiddleware`]: captures every hook call for later inspection
//! - [`assert_fields!`](crate::assert_fields) /
//!   [`assert_not_fields!`](crate::assert_not_fields): assertions on
//!   changed-sets
//!
//! # Example
//!
//! ```
//! use keyed_store_core::testing::{ListenerProbe, RecordingMiddleware};
//! use keyed_store_core::{assert_fields, DispatchOptions, StoreBuilder};
//! use serde_json::json;
//!
//! let recorder = RecordingMiddleware::new();
//! let store = StoreBuilder::new(json!({"count": 0}))
//!     .middleware(recorder.clone())
//!     .build();
//! let probe = ListenerProbe::new();
//! let _sub = store.subscribe(probe.listener(), "count");
//!
//! let outcome = store.dispatch(json!({"count": 1}), DispatchOptions::new());
//!
//! assert_fields!(outcome.changed, ["count"]);
//! assert_eq!(probe.count(), 1);
//! assert_eq!(recorder.drain_after().len(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::dispatch::Batch;
use crate::middleware::{BeforeDispatch, Middleware};
use crate::options::DispatchOptions;
use crate::record::Record;
use crate::registry::Listener;

/// A listener that counts how often it was called
///
/// Every call to [`listener`](Self::listener) returns the same `Arc`, so
/// subscribing it twice to one field registers it once.
#[derive(Clone)]
pub struct ListenerProbe {
    hits: Arc<AtomicUsize>,
    listener: Listener,
}

impl Default for ListenerProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerProbe {
    pub fn new() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        Self {
            hits,
            listener: Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        }
    }

    /// The listener to subscribe
    pub fn listener(&self) -> Listener {
        self.listener.clone()
    }

    /// Calls so far
    pub fn count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Whether it was called at least once
    pub fn was_called(&self) -> bool {
        self.count() > 0
    }

    /// Reset the counter to zero
    pub fn reset(&self) {
        self.hits.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ListenerProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerProbe")
            .field("hits", &self.count())
            .finish()
    }
}

#[derive(Default)]
struct Recorded {
    before: Vec<(Batch, Record)>,
    after: Vec<(Batch, Record)>,
}

/// Middleware that records every hook call
///
/// Clones share the recording, so keep one clone and install the other.
/// An optional verdict is returned from every `before_dispatch`.
#[derive(Clone, Default)]
pub struct RecordingMiddleware {
    recorded: Arc<Mutex<Recorded>>,
    verdict: Arc<Mutex<BeforeDispatch>>,
}

impl RecordingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verdict returned from subsequent `before_dispatch` calls
    pub fn set_verdict(&self, verdict: BeforeDispatch) {
        *self.verdict.lock().unwrap_or_else(PoisonError::into_inner) = verdict;
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain recorded `before_dispatch` calls
    pub fn drain_before(&self) -> Vec<(Batch, Record)> {
        std::mem::take(&mut self.recorded().before)
    }

    /// Drain recorded `after_dispatch` calls
    pub fn drain_after(&self) -> Vec<(Batch, Record)> {
        std::mem::take(&mut self.recorded().after)
    }

    /// Number of `after_dispatch` calls not yet drained
    pub fn after_count(&self) -> usize {
        self.recorded().after.len()
    }
}

impl Middleware for RecordingMiddleware {
    fn before_dispatch(
        &self,
        batch: Batch,
        next: &Record,
        _options: &DispatchOptions,
    ) -> BeforeDispatch {
        self.recorded().before.push((batch, next.clone()));
        self.verdict
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn after_dispatch(&self, batch: Batch, changed: &Record) {
        self.recorded().after.push((batch, changed.clone()));
    }
}

/// Assert that a record contains exactly the given fields, in order.
///
/// # Example
///
/// ```
/// use keyed_store_core::{assert_fields, IntoRecord};
/// use serde_json::json;
///
/// let changed = json!({"count": 5, "name": "n5"}).into_record();
/// assert_fields!(changed, ["count", "name"]);
/// ```
#[macro_export]
macro_rules! assert_fields {
    ($record:expr, [$($field:expr),* $(,)?]) => {{
        let record = &$record;
        let actual: Vec<&str> = record.keys().map(|k| k.as_str()).collect();
        let expected: Vec<&str> = vec![$($field),*];
        assert_eq!(
            actual, expected,
            "Expected fields {:?}, but record has {:?}",
            expected, actual
        );
    }};
}

/// Assert that none of the given fields are in a record.
///
/// # Example
///
/// ```
/// use keyed_store_core::{assert_not_fields, IntoRecord};
/// use serde_json::json;
///
/// let changed = json!({"count": 1}).into_record();
/// assert_not_fields!(changed, ["name"]);
/// ```
#[macro_export]
macro_rules! assert_not_fields {
    ($record:expr, [$($field:expr),* $(,)?]) => {{
        let record = &$record;
        $(
            assert!(
                !record.contains_key($field),
                "Expected field `{}` NOT to be in record, but it was: {:?}",
                $field,
                record
            );
        )*
    }};
}
