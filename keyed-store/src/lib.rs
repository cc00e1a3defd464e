//! keyed-store: per-field publish/subscribe state for Rust
//!
//! One state record, listeners per field, and a dispatch pipeline that only
//! wakes the listeners of fields that actually changed.
//!
//! # Example
//! ```
//! use keyed_store::prelude::*;
//! use serde_json::json;
//!
//! let store = Store::new(json!({"count": 0, "name": "a"}));
//! let watch = ReadBridge::new(&store).watch("name");
//! watch.poll();
//!
//! store.dispatch(json!({"count": 1}), DispatchOptions::new().with_check(true));
//! assert_eq!(store.field("count"), Some(json!(1)));
//! assert!(!watch.is_dirty());
//! ```

// Re-export everything from core
pub use keyed_store_core::*;

/// Prelude for convenient imports
pub mod prelude {
    // Store
    pub use keyed_store_core::{
        listener, transform, Batch, DispatchArgs, DispatchOptions, DispatchOutcome,
        DispatchStatus, IntoRecord, Listener, PendingNotification, Record, Store, StoreBuilder,
        Transform, Unsubscribe,
    };

    // Middleware
    pub use keyed_store_core::{
        AfterDispatchFn, BeforeDispatch, BeforeDispatchFn, ComposedMiddleware, LoggingMiddleware,
        Middleware, NoopMiddleware,
    };

    // Bridge
    pub use keyed_store_core::{FieldWatch, ReadBridge};

    // Config
    pub use keyed_store_core::{StoreConfig, StoreError};

    // Debug
    pub use keyed_store_core::debug::{
        DispatchLogConfig, DispatchLogHandle, DispatchLoggerMiddleware, FieldFilter,
    };

    // Hand-off
    #[cfg(feature = "handoff")]
    pub use keyed_store_core::{handoff_channel, spawn_notifier};
}
