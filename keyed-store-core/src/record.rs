//! Field records: the shape of state, partial updates and changed-sets

use serde_json::{Map, Value};

/// An ordered record of field name to value.
///
/// The same type describes the whole state, a partial update handed to
/// [`Store::dispatch`](crate::Store::dispatch), and the changed-set produced by
/// a dispatch. Iteration follows insertion order.
pub type Record = Map<String, Value>;

/// Conversion into a [`Record`]
///
/// Implemented for [`Record`] itself and for [`Value`], so `json!({...})`
/// literals can be passed directly:
///
/// ```
/// use keyed_store_core::{IntoRecord, Record};
/// use serde_json::json;
///
/// let record: Record = json!({"count": 1, "name": "a"}).into_record();
/// assert_eq!(record.len(), 2);
/// ```
pub trait IntoRecord {
    /// Convert into a record.
    ///
    /// Values that are not JSON objects become an empty record.
    fn into_record(self) -> Record;
}

impl IntoRecord for Record {
    fn into_record(self) -> Record {
        self
    }
}

impl IntoRecord for Value {
    fn into_record(self) -> Record {
        match self {
            Value::Object(map) => map,
            other => {
                tracing::warn!(
                    found = value_kind(&other),
                    "expected an object of fields, treating as empty record"
                );
                Record::new()
            }
        }
    }
}

impl<K: Into<String>> IntoRecord for Vec<(K, Value)> {
    fn into_record(self) -> Record {
        self.into_iter().map(|(k, v)| (k.into(), v)).collect()
    }
}

/// Name of a JSON value's kind, for diagnostics
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Merge every key of `patch` into `target`, overwriting existing entries.
///
/// Existing keys keep their position, new keys are appended.
pub(crate) fn merge_into(target: &mut Record, patch: Record) {
    for (field, value) in patch {
        target.insert(field, value);
    }
}
