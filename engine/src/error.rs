//! Error types for the SmartSync engine.

use crate::{SoupEntryId, SoupName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors from the SmartSync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    #[error("unknown relationship type: {0}")]
    UnknownRelationshipType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Store errors
    #[error("soup not found: {0}")]
    SoupNotFound(SoupName),

    #[error("path '{path}' is not indexed in soup '{soup}'")]
    PathNotIndexed { soup: SoupName, path: String },

    #[error("entry {entry_id} not found in soup '{soup}'")]
    EntryNotFound {
        soup: SoupName,
        entry_id: SoupEntryId,
    },

    #[error("constraint violation in soup '{soup}': {message}")]
    ConstraintViolation { soup: SoupName, message: String },

    #[error("store failure: {0}")]
    StoreFailure(String),

    // Record errors
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("record is missing field '{0}'")]
    MissingField(String),

    // Integrity errors
    #[error("child {child_id} references parent {parent_id} which is not present")]
    Integrity { child_id: String, parent_id: String },

    // Remote errors
    #[error("remote error for {object_type}: {message}")]
    Remote {
        object_type: String,
        message: String,
    },

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Coarse classification of an [`Error`], used by callers to decide
/// whether to retry, skip or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Bad configuration; fatal to the call, never retried
    Configuration,
    /// Local store read/write failure; aborts the current tree only
    Store,
    /// Relationship integrity problem; reported, never deletes data
    Integrity,
    /// Remote service failure
    Remote,
    /// Malformed records or snapshots
    InvalidInput,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownRelationshipType(_) | Error::InvalidConfiguration(_) => {
                ErrorKind::Configuration
            }
            Error::SoupNotFound(_)
            | Error::PathNotIndexed { .. }
            | Error::EntryNotFound { .. }
            | Error::ConstraintViolation { .. }
            | Error::StoreFailure(_) => ErrorKind::Store,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::InvalidRecord(_) | Error::MissingField(_) | Error::InvalidSnapshot(_) => {
                ErrorKind::InvalidInput
            }
        }
    }

    /// Whether the error should abort the whole call rather than a single tree.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub(crate) fn remote(object_type: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Remote {
            object_type: object_type.into(),
            message: message.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
