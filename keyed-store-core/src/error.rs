//! Errors for the few fallible store operations
//!
//! Dispatching and notifying never fail; see [`Store::dispatch`](crate::Store::dispatch).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Initial state was not a JSON object
    #[error("initial state must be an object of fields, found {found}")]
    NotAnObject { found: &'static str },

    /// Requested field is not part of the state
    #[error("field `{0}` is not present in state")]
    MissingField(String),

    /// Field exists but does not decode into the requested type
    #[error("field `{field}` could not be decoded: {source}")]
    Decode {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// Store configuration could not be parsed
    #[error("invalid store configuration: {0}")]
    Config(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
