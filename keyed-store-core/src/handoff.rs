//! Driving hand-off notifications from another task
//!
//! In hand-off mode [`Store::dispatch`] applies state but leaves the
//! notification pass to the owner. This module carries the owed
//! notifications over a channel to a tokio task that runs them, so
//! listeners execute in that task's context instead of the dispatcher's.
//!
//! # Example
//!
//! ```ignore
//! let (tx, rx) = handoff_channel();
//! let cancel = CancellationToken::new();
//! let _notifier = spawn_notifier(store.clone(), rx, cancel.clone());
//!
//! store.set_hand_off(true);
//! let outcome = store.dispatch(json!({"count": 1}), DispatchOptions::new());
//! if let Some(pending) = outcome.pending() {
//!     tx.send(pending)?;
//! }
//! ```

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatch::PendingNotification;
use crate::store::Store;

/// Sending half for owed notifications
pub type HandOffSender = mpsc::UnboundedSender<PendingNotification>;

/// Receiving half for owed notifications
pub type HandOffReceiver = mpsc::UnboundedReceiver<PendingNotification>;

/// Create a channel for owed notifications
pub fn handoff_channel() -> (HandOffSender, HandOffReceiver) {
    mpsc::unbounded_channel()
}

/// Spawn a task running [`Store::execute_listeners`] for every received
/// notification, in arrival order.
///
/// The task ends when the token is cancelled or every sender is dropped.
pub fn spawn_notifier(
    store: Store,
    mut rx: HandOffReceiver,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Hand-off notifier cancelled");
                    break;
                }
                received = rx.recv() => {
                    let Some(PendingNotification { batch, changed }) = received else {
                        debug!("Hand-off channel closed");
                        break;
                    };
                    store.execute_listeners(batch, &changed, None);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DispatchOptions;
    use crate::registry::listener;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_notifier_runs_deferred_batches() {
        let store = Store::new(json!({"count": 0}));
        store.set_hand_off(true);

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = store.subscribe(
            listener(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
            "count",
        );

        let (tx, rx) = handoff_channel();
        let notifier = spawn_notifier(store.clone(), rx, CancellationToken::new());

        for i in 1..=3 {
            let outcome = store.dispatch(json!({"count": i}), DispatchOptions::new());
            tx.send(outcome.pending().unwrap()).unwrap();
        }
        assert_eq!(store.pending_batches().len(), 3);

        // Closing the channel lets the task drain and exit
        drop(tx);
        notifier.await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(store.pending_batches().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_stops_on_cancel() {
        let store = Store::new(json!({}));
        let (_tx, rx) = handoff_channel();
        let cancel = CancellationToken::new();
        let notifier = spawn_notifier(store, rx, cancel.clone());

        cancel.cancel();
        notifier.await.unwrap();
    }
}
