//! Wire codec: records to and from UTF-8 JSON text.
//!
//! Field names are normalized to lower-camel on both directions, so the
//! hub and every client agree on keys no matter which naming convention
//! the producing side uses natively. An absent record serializes to `{}`
//! and an empty record set to `[]`; both are valid payloads, not errors.

use heck::ToLowerCamelCase;
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::record::Record;

/// Encode a single record. `None` produces the `{}` sentinel.
pub fn encode_record(record: Option<&Record>) -> String {
    match record {
        Some(record) => Value::Object(normalize_map(record.fields().clone())).to_string(),
        None => "{}".to_string(),
    }
}

/// Encode a record set. An empty slice produces `[]`.
pub fn encode_records(records: &[Record]) -> String {
    let items: Vec<Value> = records
        .iter()
        .map(|r| Value::Object(normalize_map(r.fields().clone())))
        .collect();
    Value::Array(items).to_string()
}

/// Decode a single record payload.
///
/// Malformed text fails with [`SyncError::Decode`]; callers treat that
/// the same as a remote failure.
pub fn decode(text: &str) -> Result<Record, SyncError> {
    let value: Value = serde_json::from_str(text).map_err(SyncError::decode)?;
    match value {
        Value::Object(fields) => Ok(Record::from_fields(normalize_map(fields))),
        other => Err(SyncError::Decode(format!(
            "expected a record object, got {}",
            type_name(&other)
        ))),
    }
}

/// Decode a record-set payload.
pub fn decode_records(text: &str) -> Result<Vec<Record>, SyncError> {
    let value: Value = serde_json::from_str(text).map_err(SyncError::decode)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(fields) => Ok(Record::from_fields(normalize_map(fields))),
                other => Err(SyncError::Decode(format!(
                    "expected record objects, got {}",
                    type_name(&other)
                ))),
            })
            .collect(),
        other => Err(SyncError::Decode(format!(
            "expected a record array, got {}",
            type_name(&other)
        ))),
    }
}

fn normalize_map(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_lower_camel_case(), normalize_value(value)))
        .collect()
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(normalize_map(fields)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
