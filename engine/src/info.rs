//! Descriptors for the parent and children soups of a target.

use crate::{error::Result, Error, ObjectType, SoupName};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ID_FIELD: &str = "Id";
pub const DEFAULT_MODIFICATION_DATE_FIELD: &str = "LastModifiedDate";

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

fn default_modification_date_field() -> String {
    DEFAULT_MODIFICATION_DATE_FIELD.to_string()
}

/// Where parent records live and how they are identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentInfo {
    /// Server object type, e.g. `Account`
    pub sobject_type: ObjectType,
    /// Local soup holding the records
    pub soup_name: SoupName,
    #[serde(default = "default_id_field")]
    pub id_field_name: String,
    /// Stable external id, preferred over the primary id to find local copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id_field_name: Option<String>,
    #[serde(default = "default_modification_date_field")]
    pub modification_date_field_name: String,
}

impl ParentInfo {
    pub fn new(sobject_type: impl Into<ObjectType>, soup_name: impl Into<SoupName>) -> Self {
        Self {
            sobject_type: sobject_type.into(),
            soup_name: soup_name.into(),
            id_field_name: default_id_field(),
            external_id_field_name: None,
            modification_date_field_name: default_modification_date_field(),
        }
    }

    pub fn with_id_field_name(mut self, field: impl Into<String>) -> Self {
        self.id_field_name = field.into();
        self
    }

    pub fn with_external_id_field_name(mut self, field: impl Into<String>) -> Self {
        self.external_id_field_name = Some(field.into());
        self
    }

    pub fn with_modification_date_field_name(mut self, field: impl Into<String>) -> Self {
        self.modification_date_field_name = field.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_non_empty("parent.sobjectType", &self.sobject_type)?;
        require_non_empty("parent.soupName", &self.soup_name)?;
        require_non_empty("parent.idFieldName", &self.id_field_name)
    }
}

/// Where child records live and how they point at their parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenInfo {
    /// Server object type, e.g. `Contact`
    pub sobject_type: ObjectType,
    /// Field under which a fetched parent nests its children, e.g. `Contacts`
    pub sobject_type_plural: String,
    pub soup_name: SoupName,
    #[serde(default = "default_id_field")]
    pub id_field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id_field_name: Option<String>,
    #[serde(default = "default_modification_date_field")]
    pub modification_date_field_name: String,
    /// Foreign key holding the parent's id, e.g. `AccountId`
    pub parent_id_field_name: String,
}

impl ChildrenInfo {
    pub fn new(
        sobject_type: impl Into<ObjectType>,
        sobject_type_plural: impl Into<String>,
        soup_name: impl Into<SoupName>,
        parent_id_field_name: impl Into<String>,
    ) -> Self {
        Self {
            sobject_type: sobject_type.into(),
            sobject_type_plural: sobject_type_plural.into(),
            soup_name: soup_name.into(),
            id_field_name: default_id_field(),
            external_id_field_name: None,
            modification_date_field_name: default_modification_date_field(),
            parent_id_field_name: parent_id_field_name.into(),
        }
    }

    pub fn with_id_field_name(mut self, field: impl Into<String>) -> Self {
        self.id_field_name = field.into();
        self
    }

    pub fn with_external_id_field_name(mut self, field: impl Into<String>) -> Self {
        self.external_id_field_name = Some(field.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_non_empty("children.sobjectType", &self.sobject_type)?;
        require_non_empty("children.sobjectTypePlural", &self.sobject_type_plural)?;
        require_non_empty("children.soupName", &self.soup_name)?;
        require_non_empty("children.idFieldName", &self.id_field_name)?;
        require_non_empty("children.parentIdFieldName", &self.parent_id_field_name)
    }
}

fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidConfiguration(format!("{} must not be empty", name)));
    }
    Ok(())
}
