//! Parent/children sync helper: reconciliation of record trees with the
//! local store.
//!
//! # Algorithm
//!
//! For each record tree, inside one atomic store section:
//!
//! 1. Find the parent's local copy (entry id, then external id, then id)
//! 2. Under `LeaveIfChanged`, skip fetched trees that have local changes
//! 3. Upsert the parent, cleaning or keeping its dirty flags
//! 4. Upsert each child with its foreign key stamped to the parent's id
//! 5. Master-detail, fetched trees only: delete local children the tree
//!    no longer lists
//! 6. Re-point children still referencing a replaced local parent id
//!
//! A failing tree is rolled back and reported. Trees before and after it
//! are unaffected. The helper never retries, and saving the same trees
//! twice leaves the store exactly as the first save did.

use crate::{
    error::Result,
    query::non_dirty_record_ids,
    record::{LOCAL, LOCALLY_CREATED, LOCALLY_DELETED, LOCALLY_UPDATED},
    Error, LocalStore, MergeMode, ParentChildrenTarget, Predicate, Record, RecordTree,
    RelationshipType, SoupEntryId,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Where a batch of record trees comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeSource {
    /// Confirmed by the server: saved records become clean
    Remote,
    /// Staged locally and not confirmed yet: dirty flags are kept
    LocalStaged,
}

/// A child pointing at a parent it should not point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityViolation {
    pub child_id: String,
    /// The parent the child references
    pub parent_id: String,
}

impl From<IntegrityViolation> for Error {
    fn from(violation: IntegrityViolation) -> Self {
        Error::Integrity {
            child_id: violation.child_id,
            parent_id: violation.parent_id,
        }
    }
}

/// Details of a committed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTree {
    /// Position of the tree in the input batch
    pub index: usize,
    pub parent_id: String,
    pub parent_entry_id: SoupEntryId,
    pub children_saved: usize,
    pub children_deleted: usize,
    pub children_repointed: usize,
    /// Children of a master-detail tree that referenced another parent
    pub integrity_violations: Vec<IntegrityViolation>,
}

/// Why a tree was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// The local copy has unsynced changes and the merge mode protects them
    LocallyModified,
}

/// What happened to one tree of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TreeOutcome {
    Saved(SavedTree),
    #[serde(rename_all = "camelCase")]
    Skipped {
        index: usize,
        parent_id: String,
        reason: SkipReason,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        index: usize,
        parent_id: Option<String>,
        #[serde(serialize_with = "serialize_error")]
        error: Error,
    },
}

pub(crate) fn serialize_error<S: serde::Serializer>(
    error: &Error,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

impl TreeOutcome {
    pub fn index(&self) -> usize {
        match self {
            TreeOutcome::Saved(saved) => saved.index,
            TreeOutcome::Skipped { index, .. } | TreeOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, TreeOutcome::Saved(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TreeOutcome::Failed { .. })
    }
}

/// Per-tree outcomes of a save, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub outcomes: Vec<TreeOutcome>,
}

impl SaveReport {
    pub fn saved(&self) -> impl Iterator<Item = &SavedTree> {
        self.outcomes.iter().filter_map(|o| match o {
            TreeOutcome::Saved(saved) => Some(saved),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &TreeOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// Input positions of the trees that failed, for a targeted retry.
    pub fn failed_indexes(&self) -> Vec<usize> {
        self.failed().map(TreeOutcome::index).collect()
    }

    pub fn saved_count(&self) -> usize {
        self.saved().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TreeOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// True when no tree failed.
    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn integrity_violations(&self) -> impl Iterator<Item = &IntegrityViolation> {
        self.saved().flat_map(|s| s.integrity_violations.iter())
    }
}

enum TreeSave {
    Saved(SavedTree),
    Skipped(String, SkipReason),
}

/// Save record trees into the parent and children soups of `target`.
///
/// Each tree is committed atomically. Store failures are reported per tree
/// and do not stop the batch.
pub fn save_record_trees_to_local_store<S: LocalStore>(
    store: &mut S,
    target: &ParentChildrenTarget,
    trees: Vec<RecordTree>,
    source: TreeSource,
) -> SaveReport {
    let mut report = SaveReport {
        outcomes: Vec::with_capacity(trees.len()),
    };

    for (index, tree) in trees.into_iter().enumerate() {
        let parent_id = tree.parent_id(target.parent());
        let outcome = match store.atomically(|s| save_tree(s, target, tree, source)) {
            Ok(TreeSave::Saved(mut saved)) => {
                saved.index = index;
                debug!(
                    parent_id = %saved.parent_id,
                    children_saved = saved.children_saved,
                    children_deleted = saved.children_deleted,
                    "saved record tree"
                );
                TreeOutcome::Saved(saved)
            }
            Ok(TreeSave::Skipped(parent_id, reason)) => {
                debug!(parent_id = %parent_id, ?reason, "skipped record tree");
                TreeOutcome::Skipped {
                    index,
                    parent_id,
                    reason,
                }
            }
            Err(error) => {
                warn!(index, parent_id = ?parent_id, %error, "failed to save record tree");
                TreeOutcome::Failed {
                    index,
                    parent_id,
                    error,
                }
            }
        };
        report.outcomes.push(outcome);
    }

    info!(
        parent_soup = %target.parent().soup_name,
        saved = report.saved_count(),
        skipped = report.skipped_count(),
        failed = report.failed_count(),
        "saved record trees"
    );
    report
}

fn save_tree<S: LocalStore>(
    store: &mut S,
    target: &ParentChildrenTarget,
    tree: RecordTree,
    source: TreeSource,
) -> Result<TreeSave> {
    let parent_info = target.parent();
    let children_info = target.children();
    let fk_field = &children_info.parent_id_field_name;
    let RecordTree {
        mut parent,
        children,
    } = tree;

    let parent_id = parent
        .id(&parent_info.id_field_name)
        .ok_or_else(|| Error::MissingField(parent_info.id_field_name.clone()))?;

    let existing_parent = find_existing(
        store,
        &parent_info.soup_name,
        &parent,
        &parent_info.id_field_name,
        parent_info.external_id_field_name.as_deref(),
    )?;
    let previous_parent_id = existing_parent
        .as_ref()
        .and_then(|p| p.id(&parent_info.id_field_name))
        .filter(|id| *id != parent_id);

    let mut parent_keys = vec![Value::from(parent_id.clone())];
    if let Some(previous) = &previous_parent_id {
        parent_keys.push(Value::from(previous.clone()));
    }
    let local_children = store.query(
        &children_info.soup_name,
        &Predicate::is_in(fk_field.clone(), parent_keys),
    )?;

    if source == TreeSource::Remote && target.merge_mode() == MergeMode::LeaveIfChanged {
        let parent_dirty = existing_parent
            .as_ref()
            .is_some_and(Record::is_locally_dirty);
        if parent_dirty || local_children.iter().any(Record::is_locally_dirty) {
            return Ok(TreeSave::Skipped(parent_id, SkipReason::LocallyModified));
        }
    }

    apply_flags(&mut parent, existing_parent.as_ref(), source);
    match existing_parent.as_ref().and_then(Record::soup_entry_id) {
        Some(entry_id) => parent.set_soup_entry_id(entry_id),
        None => parent.clear_soup_entry_id(),
    }
    let stored_parent = store.upsert(&parent_info.soup_name, parent, None)?;
    let parent_entry_id = stored_parent
        .soup_entry_id()
        .ok_or_else(|| Error::StoreFailure("stored parent has no entry id".into()))?;

    let mut integrity_violations = Vec::new();
    let mut kept = BTreeSet::new();
    for mut child in children {
        let child_id = child
            .id(&children_info.id_field_name)
            .ok_or_else(|| Error::MissingField(children_info.id_field_name.clone()))?;

        if let Some(referenced) = child.id(fk_field) {
            let known = referenced == parent_id
                || previous_parent_id.as_deref() == Some(referenced.as_str());
            if !known && target.relationship_type() == RelationshipType::MasterDetail {
                integrity_violations.push(IntegrityViolation {
                    child_id: child_id.clone(),
                    parent_id: referenced,
                });
            }
        }
        child.set(fk_field.clone(), parent_id.clone());

        let existing_child = find_existing(
            store,
            &children_info.soup_name,
            &child,
            &children_info.id_field_name,
            children_info.external_id_field_name.as_deref(),
        )?;
        apply_flags(&mut child, existing_child.as_ref(), source);
        match existing_child.as_ref().and_then(Record::soup_entry_id) {
            Some(entry_id) => child.set_soup_entry_id(entry_id),
            None => child.clear_soup_entry_id(),
        }

        let stored = store.upsert(&children_info.soup_name, child, None)?;
        if let Some(entry_id) = stored.soup_entry_id() {
            kept.insert(entry_id);
        }
    }

    let mut deleted = Vec::new();
    let mut children_repointed = 0;
    for mut local in local_children {
        let Some(entry_id) = local.soup_entry_id() else {
            continue;
        };
        if kept.contains(&entry_id) {
            continue;
        }

        // Only a server-confirmed tree lists every child, and a child created
        // offline was never seen by the server
        if source == TreeSource::Remote
            && target.relationship_type().deletes_absent_children()
            && !local.is_locally_created()
        {
            deleted.push(entry_id);
        } else if local.id(fk_field).as_deref() != Some(parent_id.as_str()) {
            local.set(fk_field.clone(), parent_id.clone());
            store.upsert(&children_info.soup_name, local, None)?;
            children_repointed += 1;
        }
    }
    if !deleted.is_empty() {
        store.delete(&children_info.soup_name, &deleted)?;
    }

    Ok(TreeSave::Saved(SavedTree {
        index: 0,
        parent_id,
        parent_entry_id,
        children_saved: kept.len(),
        children_deleted: deleted.len(),
        children_repointed,
        integrity_violations,
    }))
}

/// Clean records for confirmed trees. Staged trees keep their own flags and
/// any flag already set on the local copy, so they never turn clean here.
fn apply_flags(record: &mut Record, existing: Option<&Record>, source: TreeSource) {
    match source {
        TreeSource::Remote => record.mark_clean(),
        TreeSource::LocalStaged => {
            if let Some(existing) = existing {
                for flag in [LOCALLY_CREATED, LOCALLY_UPDATED, LOCALLY_DELETED, LOCAL] {
                    if matches!(existing.get(flag), Some(Value::Bool(true))) {
                        record.set(flag, true);
                    }
                }
            }
            record.normalize_flags();
        }
    }
}

/// Local copy of `record`: by entry id, then external id, then primary id.
fn find_existing<S: LocalStore>(
    store: &S,
    soup: &str,
    record: &Record,
    id_field: &str,
    external_id_field: Option<&str>,
) -> Result<Option<Record>> {
    if let Some(entry_id) = record.soup_entry_id() {
        if let Some(found) = store.retrieve(soup, &[entry_id])?.into_iter().next() {
            return Ok(Some(found));
        }
    }

    let fields = external_id_field.into_iter().chain(std::iter::once(id_field));
    for field in fields {
        if let Some(value) = record.get(field).filter(|v| !v.is_null()) {
            let found = store
                .query(soup, &Predicate::eq(field, value.clone()))?
                .into_iter()
                .next();
            if found.is_some() {
                return Ok(found);
            }
        }
    }

    Ok(None)
}

/// Counts of records removed by [`clean_ghosts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostCleanup {
    pub parents_deleted: usize,
    pub children_deleted: usize,
}

/// Delete clean local parents that no longer exist on the server.
///
/// `remote_ids` is the complete set of parent ids known to the server.
/// Dirty trees are never touched. Under master-detail the children of
/// deleted parents go with them.
pub fn clean_ghosts<S: LocalStore>(
    store: &mut S,
    target: &ParentChildrenTarget,
    remote_ids: &BTreeSet<String>,
) -> Result<GhostCleanup> {
    let parent_info = target.parent();
    let children_info = target.children();

    let cleanup = store.atomically(|s| {
        let non_dirty = non_dirty_record_ids(
            s,
            parent_info,
            children_info,
            &parent_info.id_field_name,
        )?;
        let ghosts: Vec<String> = non_dirty.difference(remote_ids).cloned().collect();
        if ghosts.is_empty() {
            return Ok(GhostCleanup::default());
        }

        let parent_entries: Vec<SoupEntryId> = s
            .query(
                &parent_info.soup_name,
                &Predicate::is_in(parent_info.id_field_name.clone(), ghosts.clone()),
            )?
            .iter()
            .filter(|p| !p.is_locally_dirty())
            .filter_map(Record::soup_entry_id)
            .collect();

        let children_entries: Vec<SoupEntryId> =
            if target.relationship_type().deletes_absent_children() {
                s.query(
                    &children_info.soup_name,
                    &Predicate::is_in(children_info.parent_id_field_name.clone(), ghosts),
                )?
                .iter()
                .filter(|c| !c.is_locally_dirty())
                .filter_map(Record::soup_entry_id)
                .collect()
            } else {
                Vec::new()
            };

        s.delete(&children_info.soup_name, &children_entries)?;
        s.delete(&parent_info.soup_name, &parent_entries)?;
        Ok(GhostCleanup {
            parents_deleted: parent_entries.len(),
            children_deleted: children_entries.len(),
        })
    })?;

    info!(
        parent_soup = %parent_info.soup_name,
        parents_deleted = cleanup.parents_deleted,
        children_deleted = cleanup.children_deleted,
        "cleaned ghost records"
    );
    Ok(cleanup)
}

/// Children whose foreign key references a parent missing from the parent soup.
///
/// Orphans are only an integrity problem under master-detail; lookup
/// children may reference parents that are not synced, so the result is
/// always empty for them. Orphans are reported, never deleted.
pub fn find_orphaned_children<S: LocalStore + ?Sized>(
    store: &S,
    target: &ParentChildrenTarget,
) -> Result<Vec<IntegrityViolation>> {
    if target.relationship_type() == RelationshipType::Lookup {
        return Ok(Vec::new());
    }

    let parent_info = target.parent();
    let children_info = target.children();
    let parent_ids: BTreeSet<String> = store
        .query(&parent_info.soup_name, &Predicate::All)?
        .iter()
        .filter_map(|p| p.id(&parent_info.id_field_name))
        .collect();

    let mut orphans = Vec::new();
    for child in store.query(&children_info.soup_name, &Predicate::All)? {
        let Some(referenced) = child.id(&children_info.parent_id_field_name) else {
            continue;
        };
        if !parent_ids.contains(&referenced) {
            let child_id = child
                .id(&children_info.id_field_name)
                .unwrap_or_default();
            warn!(child_id = %child_id, parent_id = %referenced, "orphaned master-detail child");
            orphans.push(IntegrityViolation {
                child_id,
                parent_id: referenced,
            });
        }
    }

    Ok(orphans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bootstrap, ChildrenInfo, MemoryStore, ParentInfo};
    use serde_json::json;

    fn test_target(relationship_type: RelationshipType) -> ParentChildrenTarget {
        ParentChildrenTarget::new(
            ParentInfo::new("Account", "accounts"),
            ChildrenInfo::new("Contact", "Contacts", "contacts", "AccountId"),
            relationship_type,
        )
        .unwrap()
    }

    fn setup(relationship_type: RelationshipType) -> (MemoryStore, ParentChildrenTarget) {
        let target = test_target(relationship_type);
        let mut store = MemoryStore::new();
        bootstrap::create_soups(&mut store, &target).unwrap();
        (store, target)
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn tree(parent_id: &str, child_ids: &[&str]) -> RecordTree {
        RecordTree::new(
            record(json!({"Id": parent_id, "Name": format!("Account {}", parent_id)})),
            child_ids
                .iter()
                .map(|id| record(json!({"Id": id, "LastName": format!("Contact {}", id)})))
                .collect(),
        )
    }

    fn contacts(store: &MemoryStore) -> Vec<Record> {
        store.query("contacts", &Predicate::All).unwrap()
    }

    #[test]
    fn saves_parent_and_stamps_children() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        let report = save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1", "c2"])],
            TreeSource::Remote,
        );

        assert!(report.is_complete());
        let saved: Vec<_> = report.saved().collect();
        assert_eq!(saved[0].children_saved, 2);

        let accounts = store.query("accounts", &Predicate::All).unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(!accounts[0].is_locally_dirty());
        assert_eq!(accounts[0].get(LOCAL), Some(&json!(false)));

        for contact in contacts(&store) {
            assert_eq!(contact.get_str("AccountId"), Some("001"));
            assert!(!contact.is_locally_dirty());
        }
    }

    #[test]
    fn missing_parent_id_fails_tree_only() {
        let (mut store, target) = setup(RelationshipType::Lookup);
        let bad = RecordTree::new(record(json!({"Name": "No id"})), Vec::new());
        let report = save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![bad, tree("002", &[])],
            TreeSource::Remote,
        );

        assert_eq!(report.failed_indexes(), vec![0]);
        assert_eq!(report.saved_count(), 1);
        assert!(matches!(
            &report.outcomes[0],
            TreeOutcome::Failed { error: Error::MissingField(f), parent_id: None, .. } if f == "Id"
        ));
    }

    #[test]
    fn missing_child_id_rolls_back_parent() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        let bad = RecordTree::new(
            record(json!({"Id": "001"})),
            vec![record(json!({"Id": "c1"})), record(json!({"LastName": "No id"}))],
        );
        let report =
            save_record_trees_to_local_store(&mut store, &target, vec![bad], TreeSource::Remote);

        assert_eq!(report.failed_count(), 1);
        assert!(store.query("accounts", &Predicate::All).unwrap().is_empty());
        assert!(contacts(&store).is_empty());
    }

    #[test]
    fn locally_created_children_survive_master_detail_fetch() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1"])],
            TreeSource::Remote,
        );

        let mut offline = Record::new_locally_created("Id").with("AccountId", "001");
        offline.set("LastName", "Offline");
        store.upsert("contacts", offline, None).unwrap();

        let report = save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1"])],
            TreeSource::Remote,
        );
        assert_eq!(report.saved().next().unwrap().children_deleted, 0);
        assert_eq!(contacts(&store).len(), 2);
    }

    #[test]
    fn staged_master_detail_tree_keeps_unlisted_children() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1", "c2"])],
            TreeSource::Remote,
        );

        // Only the edited child is staged
        let mut staged = tree("001", &["c1"]);
        staged.parent.mark_locally_updated();
        staged.children[0].mark_locally_updated();
        let report = save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![staged],
            TreeSource::LocalStaged,
        );

        assert_eq!(report.saved().next().unwrap().children_deleted, 0);
        let stored = contacts(&store);
        assert_eq!(stored.len(), 2);
        let c2 = stored.iter().find(|c| c.get_str("Id") == Some("c2")).unwrap();
        assert!(!c2.is_locally_dirty());
        assert_eq!(c2.get_str("AccountId"), Some("001"));
    }

    #[test]
    fn staged_tree_never_turns_clean() {
        let (mut store, target) = setup(RelationshipType::Lookup);
        let mut parent = record(json!({"Id": "001"}));
        parent.mark_locally_updated();
        store.upsert("accounts", parent, None).unwrap();

        // Incoming copy carries no flags at all
        save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &[])],
            TreeSource::LocalStaged,
        );

        let stored = store.query("accounts", &Predicate::All).unwrap();
        assert!(stored[0].is_locally_updated());
        assert!(stored[0].is_locally_dirty());
    }

    #[test]
    fn leave_if_changed_skips_dirty_trees() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        let target = target.with_merge_mode(MergeMode::LeaveIfChanged);
        save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1", "c2"]), tree("002", &["c3"])],
            TreeSource::Remote,
        );

        let mut c1 = store
            .query("contacts", &Predicate::eq("Id", "c1"))
            .unwrap()
            .remove(0);
        c1.set("LastName", "Edited offline");
        c1.mark_locally_updated();
        store.upsert("contacts", c1, None).unwrap();

        let report = save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1"]), tree("002", &[])],
            TreeSource::Remote,
        );

        assert!(matches!(
            &report.outcomes[0],
            TreeOutcome::Skipped { parent_id, reason: SkipReason::LocallyModified, .. } if parent_id == "001"
        ));
        assert!(report.outcomes[1].is_saved());

        let remaining: Vec<_> = contacts(&store)
            .into_iter()
            .filter_map(|c| c.id("Id"))
            .collect();
        // Tree 001 untouched, tree 002 lost c3
        assert_eq!(remaining, vec!["c1", "c2"]);
        let c1 = store.query("contacts", &Predicate::eq("Id", "c1")).unwrap();
        assert_eq!(c1[0].get_str("LastName"), Some("Edited offline"));
    }

    #[test]
    fn reparented_child_is_reported_for_master_detail() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        let mut incoming = tree("001", &[]);
        incoming
            .children
            .push(record(json!({"Id": "c9", "AccountId": "002"})));

        let report =
            save_record_trees_to_local_store(&mut store, &target, vec![incoming], TreeSource::Remote);

        let violations: Vec<_> = report.integrity_violations().cloned().collect();
        assert_eq!(
            violations,
            vec![IntegrityViolation {
                child_id: "c9".into(),
                parent_id: "002".into()
            }]
        );
        let error: Error = violations[0].clone().into();
        assert_eq!(error.kind(), crate::ErrorKind::Integrity);

        let stored = store.query("contacts", &Predicate::eq("Id", "c9")).unwrap();
        assert_eq!(stored[0].get_str("AccountId"), Some("001"));
    }

    #[test]
    fn reparented_child_is_fine_for_lookup() {
        let (mut store, target) = setup(RelationshipType::Lookup);
        let mut incoming = tree("001", &[]);
        incoming
            .children
            .push(record(json!({"Id": "c9", "AccountId": "002"})));

        let report =
            save_record_trees_to_local_store(&mut store, &target, vec![incoming], TreeSource::Remote);
        assert_eq!(report.integrity_violations().count(), 0);
    }

    #[test]
    fn external_id_resolves_parent() {
        let target = ParentChildrenTarget::new(
            ParentInfo::new("Account", "accounts").with_external_id_field_name("ExtId__c"),
            ChildrenInfo::new("Contact", "Contacts", "contacts", "AccountId"),
            RelationshipType::Lookup,
        )
        .unwrap();
        let mut store = MemoryStore::new();
        bootstrap::create_soups(&mut store, &target).unwrap();

        let mut local = Record::new_locally_created("Id").with("ExtId__c", "ext-1");
        local.set("Name", "Offline name");
        store.upsert("accounts", local, None).unwrap();

        let fetched = RecordTree::new(
            record(json!({"Id": "001", "ExtId__c": "ext-1", "Name": "Server name"})),
            Vec::new(),
        );
        save_record_trees_to_local_store(&mut store, &target, vec![fetched], TreeSource::Remote);

        let accounts = store.query("accounts", &Predicate::All).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id("Id"), Some("001".to_string()));
        assert_eq!(accounts[0].soup_entry_id(), Some(1));
    }

    #[test]
    fn replaced_parent_id_repoints_lookup_children() {
        let (mut store, target) = setup(RelationshipType::Lookup);
        let parent = store
            .upsert("accounts", Record::new_locally_created("Id"), None)
            .unwrap();
        let local_id = parent.id("Id").unwrap();
        let mut child = Record::new().with("Id", "c1").with("AccountId", local_id.as_str());
        child.mark_clean();
        store.upsert("contacts", child, None).unwrap();

        let mut confirmed = parent.clone();
        confirmed.set("Id", "001");
        let report = save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![RecordTree::new(confirmed, Vec::new())],
            TreeSource::Remote,
        );

        assert_eq!(report.saved().next().unwrap().children_repointed, 1);
        let stored = contacts(&store);
        assert_eq!(stored[0].get_str("AccountId"), Some("001"));
    }

    #[test]
    fn clean_ghosts_spares_dirty_trees() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1"]), tree("002", &["c2"]), tree("003", &["c3"])],
            TreeSource::Remote,
        );
        let mut c2 = store
            .query("contacts", &Predicate::eq("Id", "c2"))
            .unwrap()
            .remove(0);
        c2.mark_locally_updated();
        store.upsert("contacts", c2, None).unwrap();

        let remote_ids = BTreeSet::from(["001".to_string()]);
        let cleanup = clean_ghosts(&mut store, &target, &remote_ids).unwrap();

        assert_eq!(
            cleanup,
            GhostCleanup {
                parents_deleted: 1,
                children_deleted: 1
            }
        );
        let accounts: Vec<_> = store
            .query("accounts", &Predicate::All)
            .unwrap()
            .into_iter()
            .filter_map(|a| a.id("Id"))
            .collect();
        assert_eq!(accounts, vec!["001", "002"]);
    }

    #[test]
    fn clean_ghosts_keeps_lookup_children() {
        let (mut store, target) = setup(RelationshipType::Lookup);
        save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1"])],
            TreeSource::Remote,
        );

        let cleanup = clean_ghosts(&mut store, &target, &BTreeSet::new()).unwrap();
        assert_eq!(cleanup.parents_deleted, 1);
        assert_eq!(cleanup.children_deleted, 0);
        assert_eq!(contacts(&store).len(), 1);
        assert!(find_orphaned_children(&store, &target).unwrap().is_empty());
    }

    #[test]
    fn orphans_reported_for_master_detail() {
        let (mut store, target) = setup(RelationshipType::MasterDetail);
        save_record_trees_to_local_store(
            &mut store,
            &target,
            vec![tree("001", &["c1"])],
            TreeSource::Remote,
        );
        let mut stray = Record::new().with("Id", "c7").with("AccountId", "404");
        stray.mark_locally_created();
        store.upsert("contacts", stray, None).unwrap();
        store
            .upsert("contacts", Record::new().with("Id", "c8"), None)
            .unwrap();

        let orphans = find_orphaned_children(&store, &target).unwrap();
        assert_eq!(
            orphans,
            vec![IntegrityViolation {
                child_id: "c7".into(),
                parent_id: "404".into()
            }]
        );
        // Reported, not removed
        assert_eq!(contacts(&store).len(), 3);
    }

    #[test]
    fn report_serialization() {
        let report = SaveReport {
            outcomes: vec![TreeOutcome::Failed {
                index: 1,
                parent_id: Some("002".into()),
                error: Error::SoupNotFound("contacts".into()),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            json!({"outcomes": [{
                "status": "failed",
                "index": 1,
                "parentId": "002",
                "error": "soup not found: contacts"
            }]})
        );
    }
}
