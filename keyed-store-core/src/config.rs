//! Store configuration
//!
//! Everything here is optional; a missing key takes its default.
//!
//! ```
//! use keyed_store_core::StoreConfig;
//!
//! let config = StoreConfig::from_json(r#"{
//!     "hand_off": true,
//!     "log": { "capacity": 50, "exclude": "cursor*" }
//! }"#).unwrap();
//!
//! assert!(config.hand_off);
//! assert_eq!(config.check, None);
//! assert_eq!(config.log.unwrap().capacity, 50);
//! ```

use serde::{Deserialize, Serialize};

use crate::debug::{DispatchLogConfig, FieldFilter};
use crate::error::{Result, StoreError};
use crate::options::DispatchOptions;

/// Configuration applied by [`StoreBuilder::config`](crate::StoreBuilder::config)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Start in hand-off mode
    pub hand_off: bool,
    /// Default `check` flag for dispatches that don't set one.
    /// Left unset, the builder's own default stays in effect.
    pub check: Option<bool>,
    /// Install a dispatch logger with this configuration
    pub log: Option<LogSettings>,
}

/// Dispatch logger settings as they appear in configuration
///
/// Patterns are comma-separated globs over field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Ring buffer capacity
    pub capacity: usize,
    /// Only log dispatches touching these fields
    pub include: Option<String>,
    /// Skip dispatches whose fields all match these patterns
    pub exclude: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            capacity: DispatchLogConfig::default().capacity,
            include: None,
            exclude: None,
        }
    }
}

impl LogSettings {
    /// Turn into the logger's own config
    pub fn to_log_config(&self) -> DispatchLogConfig {
        DispatchLogConfig::new(
            self.capacity,
            FieldFilter::new(self.include.as_deref(), self.exclude.as_deref()),
        )
    }
}

impl StoreConfig {
    /// Parse configuration from JSON
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(StoreError::Config)
    }

    /// Default dispatch options implied by this configuration
    pub fn dispatch_defaults(&self) -> DispatchOptions {
        DispatchOptions {
            check: self.check,
            on_changed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.log.is_none());
    }

    #[test]
    fn test_invalid_config() {
        let err = StoreConfig::from_json(r#"{"hand_off": "yes"}"#).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert!(err.to_string().starts_with("invalid store configuration"));
    }

    #[test]
    fn test_missing_check_stays_unset() {
        let config = StoreConfig::from_json(r#"{"hand_off": true}"#).unwrap();
        assert_eq!(config.dispatch_defaults().check, None);

        let config = StoreConfig::from_json(r#"{"check": false}"#).unwrap();
        assert_eq!(config.dispatch_defaults().check, Some(false));
    }

    #[test]
    fn test_log_settings_to_config() {
        let config = StoreConfig::from_json(
            r#"{"check": true, "log": {"include": "count,name*"}}"#,
        )
        .unwrap();
        assert!(config.dispatch_defaults().check());

        let log = config.log.unwrap().to_log_config();
        assert_eq!(log.capacity, 100);
        assert!(log.filter.should_log_field("name_first"));
        assert!(!log.filter.should_log_field("cursor"));
    }
}
