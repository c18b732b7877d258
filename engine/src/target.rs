//! Sync target: the typed configuration of one parent/children sync.
//!
//! Targets are usually described in JSON by the application. The raw form,
//! [`TargetConfig`], is validated once into a [`ParentChildrenTarget`], so the
//! rest of the engine never deals with unknown tokens or empty names.

use crate::{error::Result, ChildrenInfo, Error, ParentInfo, RelationshipType};
use serde::{Deserialize, Serialize};

/// What to do when fetched data meets locally modified records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeMode {
    /// Server data replaces local data, dirty or not (default)
    #[default]
    Overwrite,
    /// Trees with local changes are left alone until they are synced up
    LeaveIfChanged,
}

/// Raw target configuration, as found in application config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub parent: ParentInfo,
    pub children: ChildrenInfo,
    pub relationship_type: String,
    #[serde(default)]
    pub merge_mode: MergeMode,
    #[serde(default)]
    pub parent_fieldlist: Vec<String>,
    #[serde(default)]
    pub children_fieldlist: Vec<String>,
}

/// Validated parent/children sync target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TargetConfig", into = "TargetConfig")]
pub struct ParentChildrenTarget {
    parent: ParentInfo,
    children: ChildrenInfo,
    relationship_type: RelationshipType,
    merge_mode: MergeMode,
    parent_fields: Vec<String>,
    children_fields: Vec<String>,
}

impl ParentChildrenTarget {
    /// Create a target with default merge mode and field lists.
    pub fn new(
        parent: ParentInfo,
        children: ChildrenInfo,
        relationship_type: RelationshipType,
    ) -> Result<Self> {
        parent.validate()?;
        children.validate()?;
        if parent.soup_name == children.soup_name {
            return Err(Error::InvalidConfiguration(format!(
                "parent and children share soup '{}'",
                parent.soup_name
            )));
        }

        Ok(Self {
            parent,
            children,
            relationship_type,
            merge_mode: MergeMode::default(),
            parent_fields: Vec::new(),
            children_fields: Vec::new(),
        })
    }

    /// Parse and validate a JSON target description.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TargetConfig = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        Self::try_from(config)
    }

    pub fn with_merge_mode(mut self, merge_mode: MergeMode) -> Self {
        self.merge_mode = merge_mode;
        self
    }

    pub fn with_parent_fields(mut self, fields: Vec<String>) -> Self {
        self.parent_fields = fields;
        self
    }

    pub fn with_children_fields(mut self, fields: Vec<String>) -> Self {
        self.children_fields = fields;
        self
    }

    pub fn parent(&self) -> &ParentInfo {
        &self.parent
    }

    pub fn children(&self) -> &ChildrenInfo {
        &self.children
    }

    pub fn relationship_type(&self) -> RelationshipType {
        self.relationship_type
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.merge_mode
    }

    /// Parent fields to fetch, including the id and modification date.
    /// Empty when no field list is configured, which fetches every field.
    pub fn parent_fields(&self) -> Vec<String> {
        with_required_fields(
            &self.parent_fields,
            &self.parent.id_field_name,
            &self.parent.modification_date_field_name,
        )
    }

    /// Children fields to fetch, including the id, the modification date
    /// and the foreign key. Empty when no field list is configured.
    pub fn children_fields(&self) -> Vec<String> {
        let mut fields = with_required_fields(
            &self.children_fields,
            &self.children.id_field_name,
            &self.children.modification_date_field_name,
        );
        if !fields.is_empty() && !fields.contains(&self.children.parent_id_field_name) {
            fields.push(self.children.parent_id_field_name.clone());
        }
        fields
    }
}

fn with_required_fields(fields: &[String], id_field: &str, date_field: &str) -> Vec<String> {
    if fields.is_empty() {
        return Vec::new();
    }
    let mut result = Vec::with_capacity(fields.len() + 2);
    for required in [id_field, date_field] {
        if !fields.iter().any(|f| f == required) {
            result.push(required.to_string());
        }
    }
    result.extend(fields.iter().cloned());
    result
}

impl TryFrom<TargetConfig> for ParentChildrenTarget {
    type Error = Error;

    fn try_from(config: TargetConfig) -> Result<Self> {
        let relationship_type = config.relationship_type.parse()?;
        Ok(Self::new(config.parent, config.children, relationship_type)?
            .with_merge_mode(config.merge_mode)
            .with_parent_fields(config.parent_fieldlist)
            .with_children_fields(config.children_fieldlist))
    }
}

impl From<ParentChildrenTarget> for TargetConfig {
    fn from(target: ParentChildrenTarget) -> Self {
        Self {
            parent: target.parent,
            children: target.children,
            relationship_type: target.relationship_type.to_string(),
            merge_mode: target.merge_mode,
            parent_fieldlist: target.parent_fields,
            children_fieldlist: target.children_fields,
        }
    }
}
