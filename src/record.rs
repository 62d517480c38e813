use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name that carries a record's identity.
pub const ID_FIELD: &str = "id";

/// A schema-free record: an opaque mapping of field names to JSON values
/// with one designated `id` field.
///
/// Identity is the `id` value; a record without an `id` is new and not
/// yet persisted. The protocol layer never validates field contents,
/// that is the store boundary's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The record's identity value, if assigned.
    ///
    /// A JSON `null` id counts as unassigned.
    pub fn id(&self) -> Option<&Value> {
        match self.fields.get(ID_FIELD) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    /// Canonical string form of the id, used as a membership key.
    ///
    /// `1` and `"1"` map to the same key so that clients and stores
    /// disagreeing on id representation still converge.
    pub fn id_key(&self) -> Option<String> {
        self.id().map(id_key_of)
    }

    pub fn set_id(&mut self, id: impl Into<Value>) {
        self.fields.insert(ID_FIELD.to_string(), id.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// True for the empty-object sentinel `{}` that stands in for
    /// "not found" on the wire.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Overlay `other`'s fields onto this record.
    ///
    /// Fields present in `other` win; fields absent from `other` are
    /// kept. Applying the same overlay twice is a no-op.
    pub fn merge_from(&mut self, other: &Record) {
        for (field, value) in &other.fields {
            self.fields.insert(field.clone(), value.clone());
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Canonical membership key for an id value.
pub(crate) fn id_key_of(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
