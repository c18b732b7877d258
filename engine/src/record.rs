//! Record types for storing data.
//!
//! A record is a schema-less JSON object. Besides its business fields it
//! carries the soup entry id assigned by the local store and the local-state
//! flags that drive synchronization.

use crate::{error::Result, Error, SoupEntryId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the entry id assigned by the local store.
pub const SOUP_ENTRY_ID: &str = "_soupEntryId";
/// Composite flag: true when the record has any unsynced local change.
pub const LOCAL: &str = "__local__";
pub const LOCALLY_CREATED: &str = "__locally_created__";
pub const LOCALLY_UPDATED: &str = "__locally_updated__";
pub const LOCALLY_DELETED: &str = "__locally_deleted__";

/// Prefix of ids given to records created offline.
pub const LOCAL_ID_PREFIX: &str = "local_";

const SYNC_FIELDS: [&str; 5] = [
    SOUP_ENTRY_ID,
    LOCAL,
    LOCALLY_CREATED,
    LOCALLY_UPDATED,
    LOCALLY_DELETED,
];

/// Generate a fresh id for a record created offline.
pub fn generate_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4().simple())
}

/// Check whether an id was generated locally and never confirmed by the server.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Text form of a scalar JSON value, used for ids, foreign keys and index keys.
///
/// Strings are returned as is, numbers and booleans as their JSON text.
/// Null, arrays and objects have no key.
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Snapshot of a record's local-state flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyState {
    pub locally_created: bool,
    pub locally_updated: bool,
    pub locally_deleted: bool,
    pub locally_dirty: bool,
}

/// A data record in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Create a record from its fields.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Create a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Create a record that was just created offline, with a fresh local id.
    pub fn new_locally_created(id_field: &str) -> Self {
        let mut record = Self::new();
        record.set(id_field, generate_local_id());
        record.mark_locally_created();
        record
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Identity held in `field`, in text form. `None` when absent or null.
    pub fn id(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(value_key)
    }

    /// Entry id assigned by the local store, if the record has been stored.
    pub fn soup_entry_id(&self) -> Option<SoupEntryId> {
        self.fields.get(SOUP_ENTRY_ID).and_then(Value::as_u64)
    }

    pub fn set_soup_entry_id(&mut self, entry_id: SoupEntryId) {
        self.set(SOUP_ENTRY_ID, entry_id);
    }

    pub fn clear_soup_entry_id(&mut self) {
        self.fields.remove(SOUP_ENTRY_ID);
    }

    fn flag(&self, field: &str) -> bool {
        matches!(self.fields.get(field), Some(Value::Bool(true)))
    }

    pub fn is_locally_created(&self) -> bool {
        self.flag(LOCALLY_CREATED)
    }

    pub fn is_locally_updated(&self) -> bool {
        self.flag(LOCALLY_UPDATED)
    }

    pub fn is_locally_deleted(&self) -> bool {
        self.flag(LOCALLY_DELETED)
    }

    /// Whether the record has any unsynced local change.
    pub fn is_locally_dirty(&self) -> bool {
        self.flag(LOCAL)
            || self.is_locally_created()
            || self.is_locally_updated()
            || self.is_locally_deleted()
    }

    pub fn dirty_state(&self) -> DirtyState {
        DirtyState {
            locally_created: self.is_locally_created(),
            locally_updated: self.is_locally_updated(),
            locally_deleted: self.is_locally_deleted(),
            locally_dirty: self.is_locally_dirty(),
        }
    }

    /// Clear every local-state flag: the record now mirrors the server.
    pub fn mark_clean(&mut self) {
        self.set(LOCAL, false);
        self.set(LOCALLY_CREATED, false);
        self.set(LOCALLY_UPDATED, false);
        self.set(LOCALLY_DELETED, false);
    }

    pub fn mark_locally_created(&mut self) {
        self.set(LOCALLY_CREATED, true);
        self.normalize_flags();
    }

    pub fn mark_locally_updated(&mut self) {
        self.set(LOCALLY_UPDATED, true);
        self.normalize_flags();
    }

    pub fn mark_locally_deleted(&mut self) {
        self.set(LOCALLY_DELETED, true);
        self.normalize_flags();
    }

    /// Write all four flags as booleans, keeping their current meaning.
    ///
    /// A record whose composite flag was set without any specific flag stays dirty.
    pub fn normalize_flags(&mut self) {
        let state = self.dirty_state();
        self.set(LOCALLY_CREATED, state.locally_created);
        self.set(LOCALLY_UPDATED, state.locally_updated);
        self.set(LOCALLY_DELETED, state.locally_deleted);
        self.set(LOCAL, state.locally_dirty);
    }

    /// Fields to send to the server: everything except sync bookkeeping,
    /// the record id and the nested fields listed in `exclude`.
    pub fn server_fields(&self, id_field: &str, exclude: &[&str]) -> Record {
        let fields = self
            .fields
            .iter()
            .filter(|(k, _)| {
                k.as_str() != id_field
                    && !SYNC_FIELDS.contains(&k.as_str())
                    && !exclude.contains(&k.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Record { fields }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_fields(fields)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
