//! Dispatch logging with field filtering and in-memory storage
//!
//! # Example
//!
//! ```
//! use keyed_store_core::debug::{DispatchLogConfig, DispatchLoggerMiddleware, FieldFilter};
//! use keyed_store_core::{DispatchOptions, StoreBuilder};
//! use serde_json::json;
//!
//! let logger = DispatchLoggerMiddleware::new(DispatchLogConfig::new(
//!     10,
//!     FieldFilter::new(None, Some("tick")),
//! ));
//! let log = logger.handle();
//!
//! let store = StoreBuilder::new(json!({"tick": 0, "count": 0}))
//!     .middleware(logger)
//!     .build();
//! store.dispatch(json!({"tick": 1}), DispatchOptions::new());
//! store.dispatch(json!({"count": 1}), DispatchOptions::new());
//!
//! let entries = log.entries();
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].fields, vec!["count".to_string()]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::filter::FieldFilter;
use crate::dispatch::Batch;
use crate::middleware::{BeforeDispatch, Middleware};
use crate::options::DispatchOptions;
use crate::record::Record;

/// An entry in the dispatch log
#[derive(Debug, Clone, Serialize)]
pub struct DispatchLogEntry {
    /// Batch of the dispatch
    pub batch: Batch,
    /// Fields named by the update, after middleware merges ahead of the logger
    pub fields: Vec<String>,
    /// Fields that were notified; `None` while deferred, or if cancelled
    pub notified: Option<Vec<String>>,
    /// Sequence number for ordering
    pub sequence: u64,
    /// When the dispatch was logged
    #[serde(skip)]
    pub timestamp: Instant,
    /// When its notification pass ran
    #[serde(skip)]
    pub notified_at: Option<Instant>,
}

impl DispatchLogEntry {
    fn new(batch: Batch, fields: Vec<String>, sequence: u64) -> Self {
        Self {
            batch,
            fields,
            notified: None,
            sequence,
            timestamp: Instant::now(),
            notified_at: None,
        }
    }

    /// Time between the dispatch and its notification pass.
    ///
    /// Near zero for direct dispatches; in hand-off mode this is how long
    /// the owner took to deliver.
    pub fn notify_delay(&self) -> Option<Duration> {
        self.notified_at
            .map(|at| at.saturating_duration_since(self.timestamp))
    }

    /// One-line description, e.g. `#3 [count] -> [count, label] in 12ms`
    pub fn summary(&self) -> String {
        let fields = self.fields.join(", ");
        match (&self.notified, self.notify_delay()) {
            (Some(notified), Some(delay)) => format!(
                "{} [{}] -> [{}] in {}ms",
                self.batch,
                fields,
                notified.join(", "),
                delay.as_millis()
            ),
            _ => format!("{} [{}] pending", self.batch, fields),
        }
    }
}

/// Configuration for the dispatch log ring buffer
#[derive(Debug, Clone)]
pub struct DispatchLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    pub filter: FieldFilter,
}

impl Default for DispatchLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: FieldFilter::default(),
        }
    }
}

impl DispatchLogConfig {
    /// Create with custom capacity and filter
    pub fn new(capacity: usize, filter: FieldFilter) -> Self {
        Self { capacity, filter }
    }

    /// Create with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }
}

/// In-memory ring buffer of recent dispatches
///
/// Older entries are discarded once capacity is reached.
#[derive(Debug, Clone)]
pub struct DispatchLog {
    entries: VecDeque<DispatchLogEntry>,
    config: DispatchLogConfig,
    next_sequence: u64,
}

impl Default for DispatchLog {
    fn default() -> Self {
        Self::new(DispatchLogConfig::default())
    }
}

impl DispatchLog {
    pub fn new(config: DispatchLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Log a dispatch (if it passes the filter)
    ///
    /// Returns the entry if it was logged, None if filtered out.
    pub fn log(&mut self, batch: Batch, next: &Record) -> Option<&DispatchLogEntry> {
        if !self.config.filter.should_log(next.keys().map(String::as_str)) {
            return None;
        }
        if self.config.capacity == 0 {
            return None;
        }

        let entry = DispatchLogEntry::new(batch, next.keys().cloned().collect(), self.next_sequence);
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(entry);
        self.entries.back()
    }

    /// Record the notified fields of a logged batch.
    ///
    /// Returns `false` if the batch was filtered out or already evicted.
    pub fn mark_notified(&mut self, batch: Batch, changed: &Record) -> bool {
        match self.entries.iter_mut().rev().find(|e| e.batch == batch) {
            Some(entry) => {
                entry.notified = Some(changed.keys().cloned().collect());
                entry.notified_at = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Get all entries (oldest first)
    pub fn entries(&self) -> impl Iterator<Item = &DispatchLogEntry> {
        self.entries.iter()
    }

    /// Get the most recent N entries (newest first)
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &DispatchLogEntry> {
        self.entries.iter().rev().take(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &DispatchLogConfig {
        &self.config
    }
}

/// Shared handle to a [`DispatchLog`]
///
/// Clones refer to the same log; the middleware writes, the owner reads.
#[derive(Debug, Clone, Default)]
pub struct DispatchLogHandle {
    log: Arc<Mutex<DispatchLog>>,
}

impl DispatchLogHandle {
    pub fn new(config: DispatchLogConfig) -> Self {
        Self {
            log: Arc::new(Mutex::new(DispatchLog::new(config))),
        }
    }

    /// Run `f` with the log locked
    pub fn with<R>(&self, f: impl FnOnce(&mut DispatchLog) -> R) -> R {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }

    /// Copy of all entries (oldest first)
    pub fn entries(&self) -> Vec<DispatchLogEntry> {
        self.with(|log| log.entries().cloned().collect())
    }

    /// Copy of the most recent N entries (newest first)
    pub fn recent(&self, count: usize) -> Vec<DispatchLogEntry> {
        self.with(|log| log.recent(count).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.with(|log| log.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|log| log.is_empty())
    }

    pub fn clear(&self) {
        self.with(DispatchLog::clear)
    }

    /// Dump all entries as JSON (oldest first)
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.entries()).unwrap_or(serde_json::Value::Null)
    }
}

/// Middleware that logs dispatches with field filtering.
///
/// Every dispatch passing the filter is logged via `tracing::debug!()` and
/// stored in a shared [`DispatchLog`]. The notified fields are filled in when
/// the batch is notified, which in hand-off mode may be much later.
#[derive(Debug, Clone)]
pub struct DispatchLoggerMiddleware {
    filter: FieldFilter,
    log: DispatchLogHandle,
    /// When false, all hooks are no-ops
    active: bool,
}

impl DispatchLoggerMiddleware {
    pub fn new(config: DispatchLogConfig) -> Self {
        Self {
            filter: config.filter.clone(),
            log: DispatchLogHandle::new(config),
            active: true,
        }
    }

    /// Log every field, default capacity
    pub fn log_all() -> Self {
        Self::new(DispatchLogConfig::default())
    }

    /// Set whether the middleware is active.
    ///
    /// Useful for conditional logging based on CLI flags:
    ///
    /// ```ignore
    /// let logger = DispatchLoggerMiddleware::log_all().active(args.debug);
    /// ```
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Handle to the log this middleware writes to
    pub fn handle(&self) -> DispatchLogHandle {
        self.log.clone()
    }
}

impl Middleware for DispatchLoggerMiddleware {
    fn before_dispatch(
        &self,
        batch: Batch,
        next: &Record,
        _options: &DispatchOptions,
    ) -> BeforeDispatch {
        if !self.active {
            return BeforeDispatch::Continue;
        }

        if self.filter.should_log(next.keys().map(String::as_str)) {
            tracing::debug!(batch = batch.0, fields = ?next.keys().collect::<Vec<_>>(), "dispatch");
        }
        self.log.with(|log| {
            log.log(batch, next);
        });

        BeforeDispatch::Continue
    }

    fn after_dispatch(&self, batch: Batch, changed: &Record) {
        if !self.active {
            return;
        }
        self.log.with(|log| log.mark_notified(batch, changed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IntoRecord;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        value.into_record()
    }

    #[test]
    fn test_dispatch_log_basic() {
        let mut log = DispatchLog::default();
        assert!(log.is_empty());

        log.log(Batch(1), &rec(json!({"count": 1})));
        assert_eq!(log.len(), 1);

        let entry = log.entries().next().unwrap();
        assert_eq!(entry.batch, Batch(1));
        assert_eq!(entry.fields, vec!["count".to_string()]);
        assert_eq!(entry.sequence, 0);
        assert!(entry.notified.is_none());
    }

    #[test]
    fn test_dispatch_log_filtering() {
        let mut log = DispatchLog::new(DispatchLogConfig::new(
            10,
            FieldFilter::new(None, Some("tick")),
        ));

        log.log(Batch(1), &rec(json!({"tick": 1})));
        assert!(log.is_empty());

        log.log(Batch(2), &rec(json!({"count": 1})));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_dispatch_log_capacity() {
        let mut log = DispatchLog::new(DispatchLogConfig::with_capacity(3));
        for i in 1..=4 {
            log.log(Batch(i), &rec(json!({"count": i})));
        }
        assert_eq!(log.len(), 3);
        // Sequence 0 was evicted
        assert_eq!(log.entries().next().unwrap().sequence, 1);
    }

    #[test]
    fn test_zero_capacity_logs_nothing() {
        let mut log = DispatchLog::new(DispatchLogConfig::with_capacity(0));
        assert!(log.log(Batch(1), &rec(json!({"a": 1}))).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_dispatch_log_recent() {
        let mut log = DispatchLog::default();
        for i in 1..=5 {
            log.log(Batch(i), &rec(json!({"count": i})));
        }

        let recent: Vec<_> = log.recent(3).collect();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].batch, Batch(5));
        assert_eq!(recent[2].batch, Batch(3));
    }

    #[test]
    fn test_mark_notified_by_batch() {
        let mut log = DispatchLog::default();
        log.log(Batch(1), &rec(json!({"a": 1})));
        log.log(Batch(2), &rec(json!({"b": 1})));

        assert!(log.mark_notified(Batch(1), &rec(json!({"a": 1, "c": 2}))));
        assert!(!log.mark_notified(Batch(9), &Record::new()));

        let first = log.entries().next().unwrap();
        assert_eq!(
            first.notified,
            Some(vec!["a".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_inactive_middleware_logs_nothing() {
        let logger = DispatchLoggerMiddleware::log_all().active(false);
        let handle = logger.handle();

        logger.before_dispatch(Batch(1), &rec(json!({"a": 1})), &DispatchOptions::new());
        logger.after_dispatch(Batch(1), &rec(json!({"a": 1})));
        assert!(handle.is_empty());
    }

    #[test]
    fn test_handle_to_json_skips_timestamp() {
        let logger = DispatchLoggerMiddleware::log_all();
        let handle = logger.handle();
        logger.before_dispatch(Batch(4), &rec(json!({"a": 1})), &DispatchOptions::new());

        assert_eq!(
            handle.to_json(),
            json!([{"batch": 4, "fields": ["a"], "notified": null, "sequence": 0}])
        );
    }

    #[test]
    fn test_entry_summary_tracks_notification() {
        let mut log = DispatchLog::new(DispatchLogConfig::default());
        log.log(Batch(3), &rec(json!({"count": 1})));

        let entry = log.entries().next().unwrap();
        assert_eq!(entry.notify_delay(), None);
        assert_eq!(entry.summary(), "#3 [count] pending");

        log.mark_notified(Batch(3), &rec(json!({"count": 1, "label": "odd"})));
        let entry = log.entries().next().unwrap();
        assert!(entry.notify_delay().is_some());
        assert!(entry.summary().starts_with("#3 [count] -> [count, label] in "));
    }
}
