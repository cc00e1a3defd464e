//! Bridge for reactive readers outside the store
//!
//! A rendering layer (or anything else that wants to re-read a field when it
//! changes) needs two functions from the store: one to register a listener
//! on a field, and one to read the field's current value. [`ReadBridge`]
//! packages exactly those two, so the store never depends on whoever drives
//! them.
//!
//! Listeners fire synchronously inside [`Store::dispatch`], or inside
//! [`Store::execute_listeners`] in hand-off mode. When to re-read is the
//! consumer's business; [`FieldWatch`] is the simplest such consumer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::registry::{Listener, Unsubscribe};
use crate::store::Store;

/// Injected subscribe function: `(listener, field) -> unsubscribe handle`
pub type SubscribeFn = Box<dyn Fn(Listener, &str) -> Unsubscribe + Send + Sync>;

/// Injected snapshot function: `field -> current value`
pub type SnapshotFn = Box<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// The subscribe/snapshot pair handed to an external reactive reader
#[derive(Clone)]
pub struct ReadBridge {
    store: Store,
}

impl ReadBridge {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Register `listener` on `field`
    pub fn subscribe(&self, listener: Listener, field: &str) -> Unsubscribe {
        self.store.subscribe(listener, field)
    }

    /// Current value of `field`
    pub fn get_snapshot(&self, field: &str) -> Option<Value> {
        self.store.field(field)
    }

    /// Split into the two injected functions
    pub fn into_fns(self) -> (SubscribeFn, SnapshotFn) {
        let for_subscribe = self.store.clone();
        let for_snapshot = self.store;
        (
            Box::new(move |listener: Listener, field: &str| {
                for_subscribe.subscribe(listener, field)
            }),
            Box::new(move |field: &str| for_snapshot.field(field)),
        )
    }

    /// Watch a single field
    pub fn watch(&self, field: &str) -> FieldWatch {
        FieldWatch::new(self, field)
    }
}

impl fmt::Debug for ReadBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBridge").finish_non_exhaustive()
    }
}

/// Polling reader of one field
///
/// The listener only raises a dirty flag; [`poll`](Self::poll) re-reads the
/// snapshot when the flag is set. Starts dirty so the first poll yields the
/// initial value. Unsubscribes on drop.
///
/// ```
/// use keyed_store_core::{DispatchOptions, ReadBridge, Store};
/// use serde_json::json;
///
/// let store = Store::new(json!({"count": 0}));
/// let watch = ReadBridge::new(&store).watch("count");
///
/// assert_eq!(watch.poll(), Some(Some(json!(0))));
/// assert_eq!(watch.poll(), None);
///
/// store.dispatch(json!({"count": 1}), DispatchOptions::new());
/// assert_eq!(watch.poll(), Some(Some(json!(1))));
/// ```
pub struct FieldWatch {
    field: String,
    dirty: Arc<AtomicBool>,
    snapshot: ReadBridge,
    subscription: Unsubscribe,
}

impl FieldWatch {
    fn new(bridge: &ReadBridge, field: &str) -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let flag = dirty.clone();
        let subscription = bridge.subscribe(
            Arc::new(move || flag.store(true, Ordering::SeqCst)),
            field,
        );
        Self {
            field: field.to_string(),
            dirty,
            snapshot: bridge.clone(),
            subscription,
        }
    }

    /// Whether the field was notified since the last poll
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// The field's current value if it was notified since the last poll
    pub fn poll(&self) -> Option<Option<Value>> {
        self.dirty
            .swap(false, Ordering::SeqCst)
            .then(|| self.snapshot.get_snapshot(&self.field))
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Drop for FieldWatch {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

impl fmt::Debug for FieldWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldWatch")
            .field("field", &self.field)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
