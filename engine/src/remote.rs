//! Remote data service: the server side of a sync.
//!
//! The engine never talks to the network itself. The sync manager drives a
//! [`RemoteDataService`] and hands the resolved record trees to the helper.
//! [`MemoryRemote`] is an in-memory server used by tests, benchmarks and
//! demos.

use crate::{error::Result, info::DEFAULT_ID_FIELD, Error, ObjectType, Record};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Contract of the server the records are synced with.
///
/// All failures are reported as [`Error::Remote`].
pub trait RemoteDataService {
    /// Records of `object_type` with the given ids, restricted to `fields`.
    /// An empty field list returns every field. Unknown ids are skipped.
    fn fetch(&self, object_type: &str, fields: &[String], ids: &[String]) -> Result<Vec<Record>>;

    /// Records of `object_type` whose `parent_field` holds one of `parent_ids`.
    fn fetch_children(
        &self,
        object_type: &str,
        fields: &[String],
        parent_field: &str,
        parent_ids: &[String],
    ) -> Result<Vec<Record>>;

    /// Ids of every record of `object_type`.
    fn fetch_ids(&self, object_type: &str) -> Result<BTreeSet<String>>;

    /// Create a record and return the id the server assigned.
    fn create(&mut self, object_type: &str, fields: Record) -> Result<String>;

    /// Overwrite the given fields of an existing record.
    fn update(&mut self, object_type: &str, id: &str, fields: Record) -> Result<()>;

    /// Delete records. Ids the server does not know are ignored.
    fn delete(&mut self, object_type: &str, ids: &[String]) -> Result<()>;
}

/// In-memory server with server-assigned ids and injectable failures.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    id_field: String,
    tables: BTreeMap<ObjectType, BTreeMap<String, Record>>,
    next_id: u64,
    failing_types: BTreeSet<ObjectType>,
    failing_ids: BTreeSet<String>,
    write_count: usize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Create an empty server whose records are identified by `Id`.
    pub fn new() -> Self {
        Self::with_id_field(DEFAULT_ID_FIELD)
    }

    pub fn with_id_field(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            tables: BTreeMap::new(),
            next_id: 1,
            failing_types: BTreeSet::new(),
            failing_ids: BTreeSet::new(),
            write_count: 0,
        }
    }

    fn assign_id(&mut self) -> String {
        let id = format!("srv{:06}", self.next_id);
        self.next_id += 1;
        id
    }

    /// Seed a server record. A record without an id gets one assigned.
    pub fn insert(&mut self, object_type: impl Into<ObjectType>, mut record: Record) -> String {
        let id = match record.id(&self.id_field) {
            Some(id) => id,
            None => {
                let id = self.assign_id();
                record.set(self.id_field.clone(), id.clone());
                id
            }
        };
        self.tables
            .entry(object_type.into())
            .or_default()
            .insert(id.clone(), record);
        id
    }

    /// Remove a record behind the client's back.
    pub fn remove(&mut self, object_type: &str, id: &str) -> Option<Record> {
        self.tables.get_mut(object_type)?.remove(id)
    }

    pub fn get(&self, object_type: &str, id: &str) -> Option<&Record> {
        self.tables.get(object_type)?.get(id)
    }

    /// Every record of `object_type`, ordered by id.
    pub fn records(&self, object_type: &str) -> Vec<&Record> {
        self.tables
            .get(object_type)
            .map(|table| table.values().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, object_type: &str) -> usize {
        self.tables.get(object_type).map_or(0, BTreeMap::len)
    }

    /// Number of successful create, update and delete calls.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Make every call on `object_type` fail.
    pub fn fail_object_type(&mut self, object_type: impl Into<ObjectType>) {
        self.failing_types.insert(object_type.into());
    }

    /// Make updates and deletes of the record `id` fail, as well as creates
    /// whose fields reference it.
    pub fn fail_record(&mut self, id: impl Into<String>) {
        self.failing_ids.insert(id.into());
    }

    pub fn clear_failures(&mut self) {
        self.failing_types.clear();
        self.failing_ids.clear();
    }

    fn check_type(&self, object_type: &str) -> Result<()> {
        if self.failing_types.contains(object_type) {
            return Err(Error::remote(object_type, "service unavailable"));
        }
        Ok(())
    }

    fn check_id(&self, object_type: &str, id: &str) -> Result<()> {
        if self.failing_ids.contains(id) {
            return Err(Error::remote(object_type, format!("record {} is locked", id)));
        }
        Ok(())
    }

    fn project(&self, record: &Record, fields: &[String]) -> Record {
        if fields.is_empty() {
            return record.clone();
        }
        let mut projected = Record::new();
        for field in fields.iter().chain(std::iter::once(&self.id_field)) {
            if let Some(value) = record.get(field) {
                projected.set(field.clone(), value.clone());
            }
        }
        projected
    }
}

impl RemoteDataService for MemoryRemote {
    fn fetch(&self, object_type: &str, fields: &[String], ids: &[String]) -> Result<Vec<Record>> {
        self.check_type(object_type)?;
        let Some(table) = self.tables.get(object_type) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| table.get(id))
            .map(|record| self.project(record, fields))
            .collect())
    }

    fn fetch_children(
        &self,
        object_type: &str,
        fields: &[String],
        parent_field: &str,
        parent_ids: &[String],
    ) -> Result<Vec<Record>> {
        self.check_type(object_type)?;
        let Some(table) = self.tables.get(object_type) else {
            return Ok(Vec::new());
        };
        Ok(table
            .values()
            .filter(|record| {
                record
                    .id(parent_field)
                    .is_some_and(|parent_id| parent_ids.contains(&parent_id))
            })
            .map(|record| self.project(record, fields))
            .collect())
    }

    fn fetch_ids(&self, object_type: &str) -> Result<BTreeSet<String>> {
        self.check_type(object_type)?;
        Ok(self
            .tables
            .get(object_type)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn create(&mut self, object_type: &str, mut fields: Record) -> Result<String> {
        self.check_type(object_type)?;
        for value in fields.fields().values() {
            if let Value::String(referenced) = value {
                self.check_id(object_type, referenced)?;
            }
        }

        let id = self.assign_id();
        fields.set(self.id_field.clone(), id.clone());
        self.tables
            .entry(object_type.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.write_count += 1;
        Ok(id)
    }

    fn update(&mut self, object_type: &str, id: &str, fields: Record) -> Result<()> {
        self.check_type(object_type)?;
        self.check_id(object_type, id)?;
        let record = self
            .tables
            .get_mut(object_type)
            .and_then(|table| table.get_mut(id))
            .ok_or_else(|| Error::remote(object_type, format!("record {} not found", id)))?;
        for (field, value) in fields.fields() {
            record.set(field.clone(), value.clone());
        }
        self.write_count += 1;
        Ok(())
    }

    fn delete(&mut self, object_type: &str, ids: &[String]) -> Result<()> {
        self.check_type(object_type)?;
        for id in ids {
            self.check_id(object_type, id)?;
        }
        if let Some(table) = self.tables.get_mut(object_type) {
            for id in ids {
                table.remove(id);
            }
        }
        self.write_count += 1;
        Ok(())
    }
}
