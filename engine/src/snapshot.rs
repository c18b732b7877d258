//! Snapshot types for persisting and restoring store state.
//!
//! Snapshots are the bridge between the in-memory store and persistent storage.
//! They are designed for deterministic serialization to ensure consistency.

use crate::{error::Result, Error, Record, SoupEntryId, SoupName, SoupSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Contents of one soup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoupSnapshot {
    pub spec: SoupSpec,
    /// Entry id the next inserted record will get
    pub next_entry_id: SoupEntryId,
    /// Records by entry id
    pub entries: BTreeMap<SoupEntryId, Record>,
}

/// A point-in-time snapshot of the store state.
///
/// Uses BTreeMap instead of HashMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// All soups by name
    pub soups: BTreeMap<SoupName, SoupSnapshot>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSnapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            soups: BTreeMap::new(),
        }
    }

    /// Get a record from the snapshot.
    pub fn get_record(&self, soup: &str, entry_id: SoupEntryId) -> Option<&Record> {
        self.soups.get(soup)?.entries.get(&entry_id)
    }

    /// Count total records across all soups.
    pub fn record_count(&self) -> usize {
        self.soups.values().map(|s| s.entries.len()).sum()
    }

    /// Count records with unsynced local changes.
    pub fn dirty_record_count(&self) -> usize {
        self.soups
            .values()
            .flat_map(|s| s.entries.values())
            .filter(|r| r.is_locally_dirty())
            .count()
    }

    /// Check internal consistency before the snapshot is imported.
    pub fn validate(&self) -> Result<()> {
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        for (name, soup) in &self.soups {
            if &soup.spec.name != name {
                return Err(Error::InvalidSnapshot(format!(
                    "soup '{}' is stored under name '{}'",
                    soup.spec.name, name
                )));
            }

            for (entry_id, record) in &soup.entries {
                if record.soup_entry_id() != Some(*entry_id) {
                    return Err(Error::InvalidSnapshot(format!(
                        "entry {} of soup '{}' carries a different entry id",
                        entry_id, name
                    )));
                }
                if *entry_id >= soup.next_entry_id {
                    return Err(Error::InvalidSnapshot(format!(
                        "entry {} of soup '{}' is not below next entry id {}",
                        entry_id, name, soup.next_entry_id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        snapshot.validate()?;
        Ok(snapshot)
    }
}
