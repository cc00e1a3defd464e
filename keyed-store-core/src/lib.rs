//! Core types for keyed-store
//!
//! A keyed store holds one state record and notifies subscribers per field.
//! Updates are dispatched as partial records and resolved into a changed-set;
//! only listeners registered on fields of that changed-set run.
//!
//! # Core Concepts
//!
//! - **Store**: the state record, the subscriber registry and the dispatch
//!   pipeline
//! - **Transform**: per-field function deciding what an incoming value
//!   actually changes
//! - **Middleware**: hooks before (cancel / augment) and after (observe)
//!   every dispatch
//! - **Hand-off mode**: dispatch applies state, the owner triggers
//!   notification later with the batch number
//! - **ReadBridge**: the subscribe / snapshot pair an external reactive
//!   reader needs
//!
//! # Basic Example
//!
//! ```
//! use keyed_store_core::prelude::*;
//! use serde_json::json;
//!
//! let store = StoreBuilder::new(json!({"count": 0, "name": "a"}))
//!     .transform("count", |incoming, _state| {
//!         json!({"count": incoming, "name": format!("n{}", incoming)}).into_record()
//!     })
//!     .build();
//!
//! let outcome = store.dispatch(json!({"count": 5}), DispatchOptions::new());
//! assert_eq!(outcome.changed, json!({"count": 5, "name": "n5"}).into_record());
//! assert_eq!(store.field("name"), Some(json!("n5")));
//! ```
//!
//! # Hand-off Pattern
//!
//! When listeners must run somewhere else than the dispatching code (another
//! task, a UI thread), switch the store to hand-off mode and carry the
//! [`PendingNotification`] over:
//!
//! ```
//! use keyed_store_core::prelude::*;
//! use serde_json::json;
//!
//! let store = StoreBuilder::new(json!({"count": 0})).hand_off(true).build();
//!
//! let outcome = store.dispatch(json!({"count": 1}), DispatchOptions::new());
//! let pending = outcome.pending().unwrap();
//!
//! // ...later, in the notifying context
//! store.execute_listeners(pending.batch, &pending.changed, None);
//! ```

pub mod bridge;
pub mod config;
pub mod debug;
pub mod dispatch;
pub mod error;
#[cfg(feature = "handoff")]
pub mod handoff;
pub mod middleware;
pub mod options;
pub mod record;
pub mod registry;
pub mod store;
pub mod testing;

// Record exports
pub use record::{IntoRecord, Record};

// Store exports
pub use dispatch::{Batch, DispatchOutcome, DispatchStatus, PendingNotification};
pub use options::{DispatchArgs, DispatchOptions, OnChanged};
pub use registry::{listener, Listener, SubscriberRegistry, Unsubscribe};
pub use store::{transform, Store, StoreBuilder, Transform};

// Middleware exports
pub use middleware::{
    AfterDispatchFn, BeforeDispatch, BeforeDispatchFn, ComposedMiddleware, LoggingMiddleware,
    Middleware, NoopMiddleware,
};

// Bridge exports
pub use bridge::{FieldWatch, ReadBridge, SnapshotFn, SubscribeFn};

// Config and error exports
pub use config::{LogSettings, StoreConfig};
pub use error::StoreError;

// Hand-off exports (requires "handoff" feature)
#[cfg(feature = "handoff")]
pub use handoff::{handoff_channel, spawn_notifier, HandOffReceiver, HandOffSender};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{FieldWatch, ReadBridge};
    pub use crate::dispatch::{Batch, DispatchOutcome, DispatchStatus, PendingNotification};
    pub use crate::middleware::{
        AfterDispatchFn, BeforeDispatch, BeforeDispatchFn, ComposedMiddleware, LoggingMiddleware,
        Middleware, NoopMiddleware,
    };
    pub use crate::options::{DispatchArgs, DispatchOptions};
    pub use crate::record::{IntoRecord, Record};
    pub use crate::registry::{listener, Listener, Unsubscribe};
    pub use crate::store::{transform, Store, StoreBuilder, Transform};

    #[cfg(feature = "handoff")]
    pub use crate::handoff::{handoff_channel, spawn_notifier};
}
