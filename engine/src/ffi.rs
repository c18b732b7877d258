//! FFI layer for mobile hosts.
//!
//! This module provides C-compatible functions that can be called from Swift,
//! Kotlin or Dart. All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `smartsync_*` functions are allocated by Rust
//! - Caller must free them with `smartsync_string_free`
//! - Store pointers must be freed with `smartsync_store_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{
    bootstrap, helper, query, relationship_type_from_string, LocalStore, MemoryStore,
    ParentChildrenTarget, Predicate, Record, RecordTree, StoreSnapshot, TreeSource,
};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `smartsync_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        // String contained null bytes - return error JSON
        Err(_) => CString::new(r#"{"error":"string contained null bytes"}"#)
            .map(CString::into_raw)
            .unwrap_or(ptr::null_mut()),
    }
}

fn error_json(message: impl Into<String>) -> *mut c_char {
    to_c_string(FfiResult::<()>::err(message).to_json())
}

fn result_json<T: serde::Serialize>(result: crate::error::Result<T>) -> *mut c_char {
    match result {
        Ok(value) => to_c_string(FfiResult::ok(value).to_json()),
        Err(e) => error_json(e.to_string()),
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

unsafe fn parse_target(target_json: *const c_char) -> Result<ParentChildrenTarget, String> {
    let json = from_c_string(target_json).ok_or("invalid target JSON")?;
    ParentChildrenTarget::from_json(&json).map_err(|e| e.to_string())
}

// ============================================================================
// Store Lifecycle
// ============================================================================

/// Create a new, empty in-memory store.
///
/// # Returns
/// Pointer to the store. Free it with `smartsync_store_free`.
#[no_mangle]
pub extern "C" fn smartsync_store_new() -> *mut MemoryStore {
    Box::into_raw(Box::new(MemoryStore::new()))
}

/// Free a store.
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn smartsync_store_free(store: *mut MemoryStore) {
    if !store.is_null() {
        drop(Box::from_raw(store));
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `smartsync_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn smartsync_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Soup Setup
// ============================================================================

/// Create the parent and children soups of a target.
///
/// # Arguments
/// - `target_json`: JSON target configuration
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `target_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_setup_soups(
    store: *mut MemoryStore,
    target_json: *const c_char,
) -> *mut c_char {
    let store = match store.as_mut() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let target = match parse_target(target_json) {
        Ok(t) => t,
        Err(e) => return error_json(e),
    };

    result_json(bootstrap::create_soups(store, &target))
}

/// Drop the parent and children soups of a target with all their records.
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `target_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_drop_soups(
    store: *mut MemoryStore,
    target_json: *const c_char,
) -> *mut c_char {
    let store = match store.as_mut() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let target = match parse_target(target_json) {
        Ok(t) => t,
        Err(e) => return error_json(e),
    };

    result_json(bootstrap::drop_soups(store, &target))
}

// ============================================================================
// Record Trees
// ============================================================================

/// Save parent records with nested children into the local store.
///
/// # Arguments
/// - `records_json`: JSON array of parent records, each nesting its
///   children under the children's plural type name
/// - `source`: 0 for server-confirmed records (saved clean), 1 for locally
///   staged records (dirty flags kept)
///
/// # Returns
/// JSON string: `{"ok": SaveReport}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `target_json` and `records_json` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_save_record_trees(
    store: *mut MemoryStore,
    target_json: *const c_char,
    records_json: *const c_char,
    source: i32,
) -> *mut c_char {
    let store = match store.as_mut() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let target = match parse_target(target_json) {
        Ok(t) => t,
        Err(e) => return error_json(e),
    };

    let records_str = match from_c_string(records_json) {
        Some(s) => s,
        None => return error_json("invalid records JSON"),
    };

    let records: Vec<Record> = match serde_json::from_str(&records_str) {
        Ok(r) => r,
        Err(e) => return error_json(format!("parse error: {}", e)),
    };

    let trees = match records
        .into_iter()
        .map(|record| RecordTree::from_nested(record, target.children()))
        .collect::<crate::error::Result<Vec<_>>>()
    {
        Ok(t) => t,
        Err(e) => return error_json(e.to_string()),
    };

    let source = if source == 1 {
        TreeSource::LocalStaged
    } else {
        TreeSource::Remote
    };

    let report = helper::save_record_trees_to_local_store(store, &target, trees, source);
    to_c_string(FfiResult::ok(report).to_json())
}

/// Delete clean local trees whose parent id is not in `remote_ids_json`.
///
/// # Returns
/// JSON string: `{"ok": GhostCleanup}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `target_json` and `remote_ids_json` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_clean_ghosts(
    store: *mut MemoryStore,
    target_json: *const c_char,
    remote_ids_json: *const c_char,
) -> *mut c_char {
    let store = match store.as_mut() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let target = match parse_target(target_json) {
        Ok(t) => t,
        Err(e) => return error_json(e),
    };

    let ids_str = match from_c_string(remote_ids_json) {
        Some(s) => s,
        None => return error_json("invalid remote ids JSON"),
    };

    let remote_ids: BTreeSet<String> = match serde_json::from_str(&ids_str) {
        Ok(ids) => ids,
        Err(e) => return error_json(format!("parse error: {}", e)),
    };

    result_json(helper::clean_ghosts(store, &target, &remote_ids))
}

/// List master-detail children whose parent is missing.
///
/// # Returns
/// JSON string: `{"ok": [IntegrityViolation, ...]}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `target_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_check_integrity(
    store: *const MemoryStore,
    target_json: *const c_char,
) -> *mut c_char {
    let store = match store.as_ref() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let target = match parse_target(target_json) {
        Ok(t) => t,
        Err(e) => return error_json(e),
    };

    result_json(helper::find_orphaned_children(store, &target))
}

// ============================================================================
// Dirty Ids
// ============================================================================

/// Ids of dirty parents, or of clean parents when `dirty` is 0.
///
/// # Arguments
/// - `id_field`: field to return for each parent, e.g. `Id` or `_soupEntryId`
/// - `dirty`: non-zero for dirty trees, 0 for clean trees
///
/// # Returns
/// JSON string: `{"ok": ["id", ...]}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `target_json` and `id_field` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_record_ids(
    store: *const MemoryStore,
    target_json: *const c_char,
    id_field: *const c_char,
    dirty: i32,
) -> *mut c_char {
    let store = match store.as_ref() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let target = match parse_target(target_json) {
        Ok(t) => t,
        Err(e) => return error_json(e),
    };

    let id_field = match from_c_string(id_field) {
        Some(s) => s,
        None => return error_json("invalid id field"),
    };

    let ids = if dirty != 0 {
        query::dirty_record_ids(store, target.parent(), target.children(), &id_field)
    } else {
        query::non_dirty_record_ids(store, target.parent(), target.children(), &id_field)
    };
    result_json(ids)
}

/// Smart SQL selecting dirty parent ids, or clean ones when `dirty` is 0.
///
/// # Returns
/// JSON string: `{"ok": "SELECT ..."}` or `{"error": "message"}`
///
/// # Safety
/// - `target_json` and `id_field` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_record_ids_sql(
    target_json: *const c_char,
    id_field: *const c_char,
    dirty: i32,
) -> *mut c_char {
    let target = match parse_target(target_json) {
        Ok(t) => t,
        Err(e) => return error_json(e),
    };

    let id_field = match from_c_string(id_field) {
        Some(s) => s,
        None => return error_json("invalid id field"),
    };

    let sql = if dirty != 0 {
        query::dirty_record_ids_sql(target.parent(), target.children(), &id_field)
    } else {
        query::non_dirty_record_ids_sql(target.parent(), target.children(), &id_field)
    };
    to_c_string(FfiResult::ok(sql).to_json())
}

// ============================================================================
// Store Access
// ============================================================================

/// Query the records of a soup.
///
/// # Arguments
/// - `predicate_json`: JSON predicate, e.g. `{"op": "eq", "path": "Id", "value": "001"}`
///
/// # Returns
/// JSON string: `{"ok": [Record, ...]}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `soup` and `predicate_json` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_store_query(
    store: *const MemoryStore,
    soup: *const c_char,
    predicate_json: *const c_char,
) -> *mut c_char {
    let store = match store.as_ref() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let soup = match from_c_string(soup) {
        Some(s) => s,
        None => return error_json("invalid soup name"),
    };

    let predicate_str = match from_c_string(predicate_json) {
        Some(s) => s,
        None => return error_json("invalid predicate JSON"),
    };

    let predicate: Predicate = match serde_json::from_str(&predicate_str) {
        Ok(p) => p,
        Err(e) => return error_json(format!("parse error: {}", e)),
    };

    result_json(store.query(&soup, &predicate))
}

// ============================================================================
// Snapshots
// ============================================================================

/// Export store state as a snapshot.
///
/// # Returns
/// JSON string: `{"ok": StoreSnapshot}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_store_export(store: *const MemoryStore) -> *mut c_char {
    let store = match store.as_ref() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    to_c_string(FfiResult::ok(store.export_state()).to_json())
}

/// Replace the store state with a snapshot.
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `smartsync_store_new` or null
/// - `snapshot_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_store_import(
    store: *mut MemoryStore,
    snapshot_json: *const c_char,
) -> *mut c_char {
    let store = match store.as_mut() {
        Some(s) => s,
        None => return error_json("null store pointer"),
    };

    let snapshot_str = match from_c_string(snapshot_json) {
        Some(s) => s,
        None => return error_json("invalid snapshot JSON"),
    };

    let snapshot = match StoreSnapshot::from_json(&snapshot_str) {
        Ok(s) => s,
        Err(e) => return error_json(e.to_string()),
    };

    result_json(store.import_state(snapshot))
}

// ============================================================================
// Utility
// ============================================================================

/// Parse a relationship type name.
///
/// # Returns
/// JSON string: `{"ok": "master_detail"}` or `{"error": "message"}`
///
/// # Safety
/// - `value` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `smartsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn smartsync_relationship_type_from_string(
    value: *const c_char,
) -> *mut c_char {
    let value = match from_c_string(value) {
        Some(s) => s,
        None => return error_json("invalid relationship type"),
    };

    result_json(relationship_type_from_string(&value))
}

/// Name of a relationship type: 0 for master-detail, 1 for lookup.
///
/// # Returns
/// Static string pointer (do not free), or null for an unknown code
#[no_mangle]
pub extern "C" fn smartsync_relationship_type_to_string(code: i32) -> *const c_char {
    static MASTER_DETAIL: &[u8] = b"master_detail\0";
    static LOOKUP: &[u8] = b"lookup\0";

    match code {
        0 => MASTER_DETAIL.as_ptr() as *const c_char,
        1 => LOOKUP.as_ptr() as *const c_char,
        _ => ptr::null(),
    }
}

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn smartsync_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Get the snapshot format version.
#[no_mangle]
pub extern "C" fn smartsync_snapshot_format_version() -> u32 {
    crate::SNAPSHOT_FORMAT_VERSION
}
