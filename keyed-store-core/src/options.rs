//! Dispatch options and the options-or-callback argument

use std::fmt;
use std::sync::Arc;

use crate::record::Record;

/// Callback run once a dispatch has been notified, with the state at that time
pub type OnChanged = Arc<dyn Fn(&Record) + Send + Sync>;

/// Per-dispatch configuration
///
/// Unset fields fall back to the store's default options, see
/// [`merged_over`](Self::merged_over).
#[derive(Clone, Default)]
pub struct DispatchOptions {
    /// Only treat a field as changed when its value differs from the current one.
    ///
    /// Ignored for fields with a registered transform.
    pub check: Option<bool>,
    /// Called after listeners have run for this dispatch
    pub on_changed: Option<OnChanged>,
}

impl DispatchOptions {
    /// Options with nothing set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `check` flag
    pub fn with_check(mut self, check: bool) -> Self {
        self.check = Some(check);
        self
    }

    /// Set the `on_changed` callback
    pub fn with_on_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        self.on_changed = Some(Arc::new(f));
        self
    }

    /// Effective `check` flag (`false` unless set)
    pub fn check(&self) -> bool {
        self.check.unwrap_or(false)
    }

    /// Fill unset fields from `defaults`; values set on `self` win.
    pub fn merged_over(self, defaults: &DispatchOptions) -> DispatchOptions {
        DispatchOptions {
            check: self.check.or(defaults.check),
            on_changed: self.on_changed.or_else(|| defaults.on_changed.clone()),
        }
    }
}

impl fmt::Debug for DispatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOptions")
            .field("check", &self.check)
            .field("on_changed", &self.on_changed.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Second argument of [`Store::dispatch`](crate::Store::dispatch)
///
/// Either a full options record or a bare `on_changed` callback. Both are
/// normalized into [`DispatchOptions`] on entry.
///
/// ```
/// use keyed_store_core::{DispatchArgs, DispatchOptions, Record};
///
/// let from_options: DispatchArgs = DispatchOptions::new().with_check(true).into();
/// let from_callback: DispatchArgs = (|_state: &Record| {}).into();
///
/// assert!(from_options.into_options().check());
/// assert!(from_callback.into_options().on_changed.is_some());
/// ```
#[derive(Clone)]
pub enum DispatchArgs {
    /// A configuration record
    Options(DispatchOptions),
    /// A callback used as `on_changed`
    Callback(OnChanged),
}

impl DispatchArgs {
    /// Normalize into an options record
    pub fn into_options(self) -> DispatchOptions {
        match self {
            DispatchArgs::Options(options) => options,
            DispatchArgs::Callback(callback) => DispatchOptions {
                check: None,
                on_changed: Some(callback),
            },
        }
    }
}

impl Default for DispatchArgs {
    fn default() -> Self {
        DispatchArgs::Options(DispatchOptions::default())
    }
}

impl From<DispatchOptions> for DispatchArgs {
    fn from(options: DispatchOptions) -> Self {
        DispatchArgs::Options(options)
    }
}

impl<F> From<F> for DispatchArgs
where
    F: Fn(&Record) + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        DispatchArgs::Callback(Arc::new(f))
    }
}
