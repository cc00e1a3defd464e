//! Debugging aids
//!
//! - [`FieldFilter`]: glob-based include/exclude over field names
//! - [`DispatchLog`]: ring buffer of recent dispatches
//! - [`DispatchLoggerMiddleware`]: middleware feeding a shared [`DispatchLog`]
//!   and `tracing`

mod dispatch_log;
mod filter;

pub use dispatch_log::{
    DispatchLog, DispatchLogConfig, DispatchLogEntry, DispatchLogHandle, DispatchLoggerMiddleware,
};
pub use filter::{glob_match, FieldFilter};
