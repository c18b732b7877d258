//! # SmartSync Engine
//!
//! Offline sync of parent/children record trees between a local record
//! store and a server.
//!
//! This crate decides which local records are dirty, writes fetched record
//! trees into the local store without breaking the parent/child links, and
//! drives the sync runs that push local changes back to the server.
//!
//! ## Design Principles
//!
//! - **No IO in the core**: the helper only talks to a [`LocalStore`]; the
//!   network is behind the [`RemoteDataService`] trait
//! - **Atomic per tree**: a record tree is saved completely or not at all
//! - **Idempotent**: saving the same trees twice yields the same store
//! - **Portable**: runs anywhere Rust runs, with a C FFI for mobile hosts
//!
//! ## Core Concepts
//!
//! ### Soups and Records
//!
//! A soup is a named collection of schema-less JSON [`Record`]s with
//! declared indexes. Every record carries local-state flags
//! (`__locally_created__`, `__locally_updated__`, `__locally_deleted__` and
//! the composite `__local__`). A record with any flag set is *dirty*.
//!
//! ### Targets
//!
//! A [`ParentChildrenTarget`] names the parent soup ([`ParentInfo`]), the
//! children soup ([`ChildrenInfo`]), the [`RelationshipType`] between them
//! and the [`MergeMode`] used when fetched data meets local changes.
//!
//! ### Record Trees
//!
//! A [`RecordTree`] is a parent record plus its children. Trees are saved
//! with [`save_record_trees_to_local_store`], which reports one
//! [`TreeOutcome`] per tree.
//!
//! - [`RelationshipType::MasterDetail`] - children absent from a fetched tree
//!   are deleted locally, unless they were created offline
//! - [`RelationshipType::Lookup`] - children are never deleted by a save
//!
//! ### Dirty Ids
//!
//! [`dirty_record_ids`] and [`non_dirty_record_ids`] partition the parents
//! of a soup: a parent is dirty if it or any of its children is dirty.
//!
//! ## Quick Start
//!
//! ```rust
//! use smartsync_engine::{
//!     bootstrap, dirty_record_ids, save_record_trees_to_local_store, ChildrenInfo,
//!     MemoryStore, ParentChildrenTarget, ParentInfo, Record, RecordTree, RelationshipType,
//!     TreeSource,
//! };
//! use serde_json::json;
//!
//! // 1. Describe the target
//! let target = ParentChildrenTarget::new(
//!     ParentInfo::new("Account", "accounts"),
//!     ChildrenInfo::new("Contact", "Contacts", "contacts", "AccountId"),
//!     RelationshipType::MasterDetail,
//! )
//! .unwrap();
//!
//! // 2. Create the soups
//! let mut store = MemoryStore::new();
//! bootstrap::create_soups(&mut store, &target).unwrap();
//!
//! // 3. Save a fetched tree
//! let fetched = Record::from_value(json!({
//!     "Id": "001",
//!     "Name": "Acme",
//!     "Contacts": {"records": [{"Id": "003", "LastName": "Doe"}]}
//! }))
//! .unwrap();
//! let tree = RecordTree::from_nested(fetched, target.children()).unwrap();
//! let report =
//!     save_record_trees_to_local_store(&mut store, &target, vec![tree], TreeSource::Remote);
//! assert!(report.is_complete());
//!
//! // 4. Nothing is dirty yet
//! let dirty = dirty_record_ids(&store, target.parent(), target.children(), "Id").unwrap();
//! assert!(dirty.is_empty());
//! ```
//!
//! ## Sync Runs
//!
//! [`SyncManager`] owns a store and a remote service and runs sync down,
//! sync up and ghost cleanup, reporting progress to registered
//! [`SyncObserver`]s.
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for use from other languages
//! (Swift, Kotlin, Dart, etc.). All data is exchanged as JSON strings.
//!
//! ## Persistence
//!
//! Use [`MemoryStore::export_state`] and [`MemoryStore::import_state`] with
//! [`StoreSnapshot`] for persistence. Snapshots are serializable to JSON with
//! deterministic ordering.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ffi;
pub mod helper;
pub mod info;
pub mod manager;
pub mod observer;
pub mod query;
pub mod record;
pub mod relationship;
pub mod remote;
pub mod snapshot;
pub mod soup;
pub mod store;
pub mod target;
pub mod tree;

// Re-export main types at crate root
pub use config::{ConfigError, SyncManagerConfig};
pub use error::{Error, ErrorKind};
pub use helper::{
    clean_ghosts, find_orphaned_children, save_record_trees_to_local_store, GhostCleanup,
    IntegrityViolation, SaveReport, SavedTree, SkipReason, TreeOutcome, TreeSource,
};
pub use info::{ChildrenInfo, ParentInfo};
pub use manager::{SyncFailure, SyncManager, SyncSummary};
pub use observer::{
    ObserverHandle, ObserverRegistry, SyncEvent, SyncObserver, SyncStatus, SyncType,
};
pub use query::{
    dirty_record_ids, dirty_record_ids_sql, non_dirty_record_ids, non_dirty_record_ids_sql,
    DirtyScope, RecordIdsQuery,
};
pub use record::{DirtyState, Record};
pub use relationship::{
    relationship_type_from_string, relationship_type_to_string, RelationshipType,
};
pub use remote::{MemoryRemote, RemoteDataService};
pub use snapshot::{SoupSnapshot, StoreSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use soup::{IndexSpec, IndexType, Predicate, SoupSpec};
pub use store::{LocalStore, MemoryStore, Soup};
pub use target::{MergeMode, ParentChildrenTarget, TargetConfig};
pub use tree::RecordTree;

/// Type aliases for clarity
pub type SoupName = String;
pub type ObjectType = String;
pub type SoupEntryId = u64;
