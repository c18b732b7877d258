//! Record trees: a parent record with its child records.

use crate::{error::Result, record::json_type_name, ChildrenInfo, Error, ParentInfo, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which a nested relationship query result lists its records.
const NESTED_RECORDS: &str = "records";

/// A parent record plus the child records that point at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTree {
    pub parent: Record,
    #[serde(default)]
    pub children: Vec<Record>,
}

impl RecordTree {
    pub fn new(parent: Record, children: Vec<Record>) -> Self {
        Self { parent, children }
    }

    /// Split a fetched parent that nests its children under
    /// `children.sobject_type_plural`.
    ///
    /// The nested value may be an array of records, an object with a
    /// `records` array, or null/absent for a parent without children.
    pub fn from_nested(mut record: Record, children: &ChildrenInfo) -> Result<Self> {
        let nested = record.remove(&children.sobject_type_plural);
        let items = match nested {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(Value::Object(mut object)) => match object.remove(NESTED_RECORDS) {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(Error::InvalidRecord(format!(
                        "'{}.{}' must be an array, got {}",
                        children.sobject_type_plural,
                        NESTED_RECORDS,
                        json_type_name(&other)
                    )))
                }
            },
            Some(other) => {
                return Err(Error::InvalidRecord(format!(
                    "'{}' must hold child records, got {}",
                    children.sobject_type_plural,
                    json_type_name(&other)
                )))
            }
        };

        let children = items
            .into_iter()
            .map(Record::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(record, children))
    }

    /// Inverse of [`RecordTree::from_nested`], nesting children as an array.
    pub fn into_nested(self, children: &ChildrenInfo) -> Record {
        let mut parent = self.parent;
        let nested: Vec<Value> = self.children.into_iter().map(Record::into_value).collect();
        parent.set(children.sobject_type_plural.clone(), nested);
        parent
    }

    /// Identity of the parent record.
    pub fn parent_id(&self, parent: &ParentInfo) -> Option<String> {
        self.parent.id(&parent.id_field_name)
    }

    /// Whether the parent or any child has unsynced local changes.
    pub fn is_locally_dirty(&self) -> bool {
        self.parent.is_locally_dirty() || self.children.iter().any(Record::is_locally_dirty)
    }
}
