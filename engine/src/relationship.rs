//! Relationship kinds between a parent object type and its children.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration token for [`RelationshipType::MasterDetail`].
pub const MASTER_DETAIL: &str = "master_detail";
/// Configuration token for [`RelationshipType::Lookup`].
pub const LOOKUP: &str = "lookup";

/// How children relate to their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Children cannot exist without the parent. The server owns set membership.
    MasterDetail,
    /// Children are independently owned and merely reference the parent.
    Lookup,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::MasterDetail => MASTER_DETAIL,
            RelationshipType::Lookup => LOOKUP,
        }
    }

    /// Whether children missing from a fetched tree are removed locally.
    pub fn deletes_absent_children(&self) -> bool {
        matches!(self, RelationshipType::MasterDetail)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            MASTER_DETAIL => Ok(RelationshipType::MasterDetail),
            LOOKUP => Ok(RelationshipType::Lookup),
            other => Err(Error::UnknownRelationshipType(other.to_string())),
        }
    }
}

/// Parse a relationship token. Case-sensitive.
pub fn relationship_type_from_string(name: &str) -> Result<RelationshipType> {
    name.parse()
}

/// Inverse of [`relationship_type_from_string`].
pub fn relationship_type_to_string(relationship_type: RelationshipType) -> &'static str {
    relationship_type.as_str()
}
