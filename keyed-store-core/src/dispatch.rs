//! Batch numbers and dispatch outcomes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Monotonic id assigned to every dispatch call of a store.
///
/// Batches start at 1 and are never reused by the same store, including for
/// dispatches that end up cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Batch(pub u64);

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    /// The pre-dispatch hook returned [`BeforeDispatch::Cancel`](crate::BeforeDispatch::Cancel)
    Cancelled,
    /// State was applied and listeners ran inline
    Notified,
    /// State was applied; notification waits for
    /// [`Store::execute_listeners`](crate::Store::execute_listeners)
    Deferred,
}

/// Result of [`Store::dispatch`](crate::Store::dispatch)
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Batch allocated to this dispatch
    pub batch: Batch,
    /// How the dispatch ended
    pub status: DispatchStatus,
    /// Fields applied to state (empty when cancelled)
    pub changed: Record,
}

impl DispatchOutcome {
    pub(crate) fn cancelled(batch: Batch) -> Self {
        Self {
            batch,
            status: DispatchStatus::Cancelled,
            changed: Record::new(),
        }
    }

    /// Whether the dispatch was vetoed
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.status == DispatchStatus::Cancelled
    }

    /// Whether notification was left to the owner
    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.status == DispatchStatus::Deferred
    }

    /// Whether any field was applied
    #[inline]
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// The notification still owed for a deferred dispatch
    pub fn pending(&self) -> Option<PendingNotification> {
        self.is_deferred().then(|| PendingNotification {
            batch: self.batch,
            changed: self.changed.clone(),
        })
    }
}

/// A deferred notification, ready to be carried to whoever drives
/// [`Store::execute_listeners`](crate::Store::execute_listeners)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub batch: Batch,
    pub changed: Record,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IntoRecord;
    use serde_json::json;

    #[test]
    fn test_pending_only_for_deferred() {
        let outcome = DispatchOutcome {
            batch: Batch(3),
            status: DispatchStatus::Deferred,
            changed: json!({"count": 1}).into_record(),
        };
        let pending = outcome.pending().unwrap();
        assert_eq!(pending.batch, Batch(3));
        assert_eq!(pending.changed, outcome.changed);

        let outcome = DispatchOutcome {
            status: DispatchStatus::Notified,
            ..outcome
        };
        assert!(outcome.pending().is_none());
        assert!(DispatchOutcome::cancelled(Batch(4)).pending().is_none());
    }

    #[test]
    fn test_pending_notification_serializes() {
        let pending = PendingNotification {
            batch: Batch(7),
            changed: json!({"a": 1}).into_record(),
        };
        let wire = serde_json::to_string(&pending).unwrap();
        assert_eq!(wire, r#"{"batch":7,"changed":{"a":1}}"#);

        let back: PendingNotification = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, pending);
    }

    #[test]
    fn test_batch_display() {
        assert_eq!(Batch(12).to_string(), "#12");
    }
}
