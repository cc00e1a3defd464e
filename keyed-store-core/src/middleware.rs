//! Dispatch interception hooks
//!
//! A store carries at most one [`Middleware`]. It sees every dispatch twice:
//! once before anything is computed, where it may cancel the dispatch or add
//! fields to it, and once after notification with the changed-set.

use std::fmt;

use crate::dispatch::Batch;
use crate::options::DispatchOptions;
use crate::record::{merge_into, Record};

/// Verdict of [`Middleware::before_dispatch`]
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BeforeDispatch {
    /// Proceed with the update as given
    #[default]
    Continue,
    /// Abort the dispatch: no state change, no transforms, no notification
    Cancel,
    /// Merge these fields into the pending update, then proceed
    Merge(Record),
}

/// Middleware trait for intercepting dispatches
///
/// Both methods default to doing nothing. Hooks run without any store lock
/// held, so they may read from the store.
pub trait Middleware: Send + Sync {
    /// Called before the update is resolved against current state.
    fn before_dispatch(
        &self,
        _batch: Batch,
        _next: &Record,
        _options: &DispatchOptions,
    ) -> BeforeDispatch {
        BeforeDispatch::Continue
    }

    /// Called after the listeners for `batch` have run.
    ///
    /// In hand-off mode this happens during
    /// [`Store::execute_listeners`](crate::Store::execute_listeners), not
    /// during dispatch.
    fn after_dispatch(&self, _batch: Batch, _changed: &Record) {}
}

/// A no-op middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {}

/// Middleware that logs dispatches (for debugging)
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Whether to log before dispatch
    pub log_before: bool,
    /// Whether to log after dispatch
    pub log_after: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

fn field_list(record: &Record) -> String {
    record.keys().map(String::as_str).collect::<Vec<_>>().join(",")
}

impl Middleware for LoggingMiddleware {
    fn before_dispatch(
        &self,
        batch: Batch,
        next: &Record,
        options: &DispatchOptions,
    ) -> BeforeDispatch {
        if self.log_before {
            tracing::debug!(
                batch = batch.0,
                fields = %field_list(next),
                check = options.check(),
                "Dispatching update"
            );
        }
        BeforeDispatch::Continue
    }

    fn after_dispatch(&self, batch: Batch, changed: &Record) {
        if self.log_after {
            tracing::debug!(batch = batch.0, changed = %field_list(changed), "Update notified");
        }
    }
}

/// Compose multiple middleware into a single middleware
///
/// `before_dispatch` runs in insertion order. The first `Cancel` stops the
/// chain; `Merge`s accumulate and later middleware see the merged update.
/// `after_dispatch` runs in reverse order.
#[derive(Default)]
pub struct ComposedMiddleware {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl fmt::Debug for ComposedMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedMiddleware")
            .field("middlewares_count", &self.middlewares.len())
            .finish()
    }
}

impl ComposedMiddleware {
    /// Create a new composed middleware
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the composition
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Builder-style [`add`](Self::add)
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.add(middleware);
        self
    }

    /// Number of composed middleware
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether nothing is composed
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl Middleware for ComposedMiddleware {
    fn before_dispatch(
        &self,
        batch: Batch,
        next: &Record,
        options: &DispatchOptions,
    ) -> BeforeDispatch {
        let mut merged: Option<Record> = None;

        for middleware in &self.middlewares {
            let seen = match &merged {
                Some(extra) => {
                    let mut combined = next.clone();
                    merge_into(&mut combined, extra.clone());
                    middleware.before_dispatch(batch, &combined, options)
                }
                None => middleware.before_dispatch(batch, next, options),
            };
            match seen {
                BeforeDispatch::Continue => {}
                BeforeDispatch::Cancel => return BeforeDispatch::Cancel,
                BeforeDispatch::Merge(extra) => {
                    merge_into(merged.get_or_insert_with(Record::new), extra);
                }
            }
        }

        merged.map_or(BeforeDispatch::Continue, BeforeDispatch::Merge)
    }

    fn after_dispatch(&self, batch: Batch, changed: &Record) {
        // Call in reverse order for proper nesting
        for middleware in self.middlewares.iter().rev() {
            middleware.after_dispatch(batch, changed);
        }
    }
}

/// Adapter turning a closure into a pre-dispatch hook
///
/// ```
/// use keyed_store_core::{BeforeDispatch, BeforeDispatchFn, DispatchOptions, Record, StoreBuilder};
/// use serde_json::json;
///
/// let store = StoreBuilder::new(json!({"locked": true}))
///     .middleware(BeforeDispatchFn(|_batch, next: &Record, _options: &DispatchOptions| {
///         if next.contains_key("locked") {
///             BeforeDispatch::Cancel
///         } else {
///             BeforeDispatch::Continue
///         }
///     }))
///     .build();
///
/// let outcome = store.dispatch(json!({"locked": false}), DispatchOptions::new());
/// assert!(outcome.is_cancelled());
/// ```
pub struct BeforeDispatchFn<F>(pub F);

impl<F> Middleware for BeforeDispatchFn<F>
where
    F: Fn(Batch, &Record, &DispatchOptions) -> BeforeDispatch + Send + Sync,
{
    fn before_dispatch(
        &self,
        batch: Batch,
        next: &Record,
        options: &DispatchOptions,
    ) -> BeforeDispatch {
        (self.0)(batch, next, options)
    }
}

/// Adapter turning a closure into a post-dispatch hook
pub struct AfterDispatchFn<F>(pub F);

impl<F> Middleware for AfterDispatchFn<F>
where
    F: Fn(Batch, &Record) + Send + Sync,
{
    fn after_dispatch(&self, batch: Batch, changed: &Record) {
        (self.0)(batch, changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IntoRecord;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn empty() -> Record {
        Record::new()
    }

    #[test]
    fn test_noop_continues() {
        let verdict = NoopMiddleware.before_dispatch(Batch(1), &empty(), &DispatchOptions::new());
        assert_eq!(verdict, BeforeDispatch::Continue);
    }

    #[test]
    fn test_composed_first_cancel_wins() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c1 = calls.clone();
        let c2 = calls.clone();

        let composed = ComposedMiddleware::new()
            .with(BeforeDispatchFn(move |_, _: &Record, _: &DispatchOptions| {
                c1.lock().unwrap().push("first");
                BeforeDispatch::Cancel
            }))
            .with(BeforeDispatchFn(move |_, _: &Record, _: &DispatchOptions| {
                c2.lock().unwrap().push("second");
                BeforeDispatch::Continue
            }));

        let verdict = composed.before_dispatch(Batch(1), &empty(), &DispatchOptions::new());
        assert_eq!(verdict, BeforeDispatch::Cancel);
        assert_eq!(*calls.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_composed_merges_accumulate() {
        let composed = ComposedMiddleware::new()
            .with(BeforeDispatchFn(|_, _: &Record, _: &DispatchOptions| {
                BeforeDispatch::Merge(json!({"a": 1}).into_record())
            }))
            .with(BeforeDispatchFn(|_, next: &Record, _: &DispatchOptions| {
                // Sees the field merged by the previous middleware
                assert_eq!(next.get("a"), Some(&json!(1)));
                BeforeDispatch::Merge(json!({"b": 2}).into_record())
            }));

        let verdict = composed.before_dispatch(Batch(1), &empty(), &DispatchOptions::new());
        assert_eq!(
            verdict,
            BeforeDispatch::Merge(json!({"a": 1, "b": 2}).into_record())
        );
    }

    #[test]
    fn test_composed_after_runs_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();

        let composed = ComposedMiddleware::new()
            .with(AfterDispatchFn(move |_, _: &Record| o1.lock().unwrap().push(1)))
            .with(AfterDispatchFn(move |_, _: &Record| o2.lock().unwrap().push(2)));

        composed.after_dispatch(Batch(1), &empty());
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
        assert_eq!(composed.len(), 2);
    }

    #[test]
    fn test_logging_middleware_passes_through() {
        let verdict = LoggingMiddleware::verbose().before_dispatch(
            Batch(1),
            &json!({"a": 1}).into_record(),
            &DispatchOptions::new(),
        );
        assert_eq!(verdict, BeforeDispatch::Continue);
    }
}
