//! Per-field subscriber registry

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// A zero-argument callback registered on a field.
///
/// Identity is the `Arc` allocation: subscribing clones of the same `Arc`
/// to one field registers it once.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Build a [`Listener`] from a closure
pub fn listener<F>(f: F) -> Listener
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Subscriptions: field name -> listeners in registration order
#[derive(Default)]
pub struct SubscriberRegistry {
    subscriptions: HashMap<String, Vec<Listener>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on a field.
    ///
    /// Returns `false` if that listener was already registered there.
    pub fn subscribe(&mut self, field: &str, listener: Listener) -> bool {
        let listeners = self.subscriptions.entry(field.to_string()).or_default();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener from a field.
    ///
    /// Returns `false` if it was not registered there.
    pub fn unsubscribe(&mut self, field: &str, listener: &Listener) -> bool {
        let Some(listeners) = self.subscriptions.get_mut(field) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.subscriptions.remove(field);
        }
        removed
    }

    /// Listeners registered on a field, in registration order
    pub fn listeners(&self, field: &str) -> Vec<Listener> {
        self.subscriptions.get(field).cloned().unwrap_or_default()
    }

    /// Whether this exact listener is registered on a field
    pub fn contains(&self, field: &str, listener: &Listener) -> bool {
        self.subscriptions
            .get(field)
            .is_some_and(|listeners| listeners.iter().any(|l| same_listener(l, listener)))
    }

    /// Number of listeners registered on a field
    pub fn count(&self, field: &str) -> usize {
        self.subscriptions.get(field).map_or(0, Vec::len)
    }

    /// Fields with at least one listener
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.keys().map(String::as_str)
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .subscriptions
            .iter()
            .map(|(field, listeners)| (field.as_str(), listeners.len()))
            .collect();
        f.debug_struct("SubscriberRegistry")
            .field("subscriptions", &counts)
            .finish()
    }
}

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe)
///
/// Removes exactly the listener it was created for from exactly one field.
/// Calling [`unsubscribe`](Self::unsubscribe) more than once is harmless, and
/// the handle does not keep the store alive. Dropping the handle does *not*
/// unsubscribe.
pub struct Unsubscribe {
    registry: Weak<Mutex<SubscriberRegistry>>,
    field: String,
    listener: Listener,
}

impl Unsubscribe {
    pub(crate) fn new(
        registry: &Arc<Mutex<SubscriberRegistry>>,
        field: &str,
        listener: Listener,
    ) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            field: field.to_string(),
            listener,
        }
    }

    /// Remove the listener.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.unsubscribe(&self.field, &self.listener)
    }

    /// Field this handle is bound to
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("field", &self.field)
            .finish()
    }
}
