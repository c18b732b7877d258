//! Sync manager: runs parent/children syncs between a local store and a
//! remote data service.
//!
//! The manager owns both ends and is created by the caller; there is no
//! global instance. Every run takes `&mut self`, so runs on one manager
//! never overlap.
//!
//! - **Sync down** fetches parents and their children, groups them into
//!   record trees and saves them as server-confirmed.
//! - **Sync up** pushes every dirty tree (deletes, creates, updates) and
//!   writes the confirmed tree back, replacing local ids with server ids.
//! - **Clean ghosts** removes clean local trees the server no longer has.

use crate::{
    config::SyncManagerConfig,
    error::Result,
    helper::{self, serialize_error, GhostCleanup, IntegrityViolation, SaveReport, TreeOutcome},
    observer::{ObserverHandle, ObserverRegistry, SyncEvent, SyncObserver, SyncStatus, SyncType},
    query::dirty_record_ids,
    remote::RemoteDataService,
    Error, LocalStore, MergeMode, ParentChildrenTarget, Predicate, Record, RecordTree,
    RelationshipType, TreeSource,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// A tree that could not be synced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub parent_id: Option<String>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Error,
}

/// Result of a sync run, counted in record trees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub sync_type: SyncType,
    pub total: usize,
    pub saved: usize,
    /// Trees left alone because of local changes
    pub skipped: usize,
    /// Trees removed after a confirmed delete
    pub deleted: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncSummary {
    fn new(sync_type: SyncType, total: usize) -> Self {
        Self {
            sync_type,
            total,
            saved: 0,
            skipped: 0,
            deleted: 0,
            failures: Vec::new(),
        }
    }

    fn record_report(&mut self, report: SaveReport) {
        self.saved += report.saved_count();
        self.skipped += report.skipped_count();
        for outcome in report.outcomes {
            if let TreeOutcome::Failed {
                parent_id, error, ..
            } = outcome
            {
                self.failures.push(SyncFailure { parent_id, error });
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Pushed {
    Saved,
    Deleted,
}

/// Drives syncs of parent/children targets.
#[derive(Debug)]
pub struct SyncManager<S, R> {
    store: S,
    remote: R,
    config: SyncManagerConfig,
    observers: ObserverRegistry,
}

impl<S: LocalStore, R: RemoteDataService> SyncManager<S, R> {
    pub fn new(store: S, remote: R) -> Self {
        Self::with_config(store, remote, SyncManagerConfig::default())
    }

    pub fn with_config(store: S, remote: R, config: SyncManagerConfig) -> Self {
        Self {
            store,
            remote,
            config,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn config(&self) -> &SyncManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    pub fn into_parts(self) -> (S, R) {
        (self.store, self.remote)
    }

    pub fn add_observer<O: SyncObserver + 'static>(&mut self, observer: O) -> ObserverHandle {
        self.observers.add(observer)
    }

    pub fn remove_observer(&mut self, handle: ObserverHandle) -> bool {
        self.observers.remove(handle)
    }

    /// Create the parent and children soups of `target`.
    pub fn setup_soups(&mut self, target: &ParentChildrenTarget) -> Result<()> {
        crate::bootstrap::create_soups(&mut self.store, target)
    }

    /// Drop the parent and children soups of `target` with all their records.
    pub fn drop_soups(&mut self, target: &ParentChildrenTarget) -> Result<()> {
        crate::bootstrap::drop_soups(&mut self.store, target)
    }

    pub fn save_record_trees(
        &mut self,
        target: &ParentChildrenTarget,
        trees: Vec<RecordTree>,
        source: TreeSource,
    ) -> SaveReport {
        helper::save_record_trees_to_local_store(&mut self.store, target, trees, source)
    }

    /// Ids of the parents whose tree has unsynced local changes.
    pub fn dirty_record_ids(&self, target: &ParentChildrenTarget) -> Result<BTreeSet<String>> {
        let parent = target.parent();
        dirty_record_ids(&self.store, parent, target.children(), &parent.id_field_name)
    }

    /// Fetch the given parents with their children and save them locally.
    ///
    /// A remote failure aborts the run before anything is written.
    pub fn sync_down(
        &mut self,
        target: &ParentChildrenTarget,
        parent_ids: &[String],
    ) -> Result<SyncSummary> {
        self.notify(target, SyncType::Down, SyncStatus::Running, 0, parent_ids.len());

        let trees = match self.fetch_trees(target, parent_ids) {
            Ok(trees) => trees,
            Err(error) => {
                warn!(object_type = %target.parent().sobject_type, %error, "sync down failed");
                self.notify(target, SyncType::Down, SyncStatus::Failed, 0, parent_ids.len());
                return Err(error);
            }
        };

        let total = trees.len();
        let batch_size = self.config.batch_size.max(1);
        let mut summary = SyncSummary::new(SyncType::Down, total);
        let mut trees = trees.into_iter();
        let mut progress = 0;
        loop {
            let batch: Vec<RecordTree> = trees.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            progress += batch.len();
            let report = helper::save_record_trees_to_local_store(
                &mut self.store,
                target,
                batch,
                TreeSource::Remote,
            );
            summary.record_report(report);
            self.notify(target, SyncType::Down, SyncStatus::Running, progress, total);
        }

        self.notify(target, SyncType::Down, SyncStatus::Done, total, total);
        info!(
            object_type = %target.parent().sobject_type,
            total,
            saved = summary.saved,
            skipped = summary.skipped,
            failed = summary.failed(),
            "sync down finished"
        );
        Ok(summary)
    }

    /// Sync down every parent the server has.
    pub fn sync_down_all(&mut self, target: &ParentChildrenTarget) -> Result<SyncSummary> {
        match self.remote.fetch_ids(&target.parent().sobject_type) {
            Ok(ids) => {
                let ids: Vec<String> = ids.into_iter().collect();
                self.sync_down(target, &ids)
            }
            Err(error) => {
                self.notify(target, SyncType::Down, SyncStatus::Failed, 0, 0);
                Err(error)
            }
        }
    }

    fn fetch_trees(
        &self,
        target: &ParentChildrenTarget,
        parent_ids: &[String],
    ) -> Result<Vec<RecordTree>> {
        let parent_info = target.parent();
        let children_info = target.children();

        let parents =
            self.remote
                .fetch(&parent_info.sobject_type, &target.parent_fields(), parent_ids)?;
        let fetched_ids: Vec<String> = parents
            .iter()
            .filter_map(|p| p.id(&parent_info.id_field_name))
            .collect();
        let children = self.remote.fetch_children(
            &children_info.sobject_type,
            &target.children_fields(),
            &children_info.parent_id_field_name,
            &fetched_ids,
        )?;
        debug!(
            parents = parents.len(),
            children = children.len(),
            "fetched record trees"
        );

        let mut by_parent: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for child in children {
            if let Some(parent_id) = child.id(&children_info.parent_id_field_name) {
                by_parent.entry(parent_id).or_default().push(child);
            }
        }

        Ok(parents
            .into_iter()
            .map(|parent| {
                let children = parent
                    .id(&parent_info.id_field_name)
                    .and_then(|id| by_parent.remove(&id))
                    .unwrap_or_default();
                RecordTree::new(parent, children)
            })
            .collect())
    }

    /// Push every dirty tree to the server and write the confirmed trees back.
    ///
    /// A tree whose push fails stays dirty and is reported; the other trees
    /// are still synced.
    pub fn sync_up(&mut self, target: &ParentChildrenTarget) -> Result<SyncSummary> {
        let dirty_ids: Vec<String> = match self.dirty_record_ids(target) {
            Ok(ids) => ids.into_iter().collect(),
            Err(error) => {
                self.notify(target, SyncType::Up, SyncStatus::Failed, 0, 0);
                return Err(error);
            }
        };

        let total = dirty_ids.len();
        let batch_size = self.config.batch_size.max(1);
        let mut summary = SyncSummary::new(SyncType::Up, total);
        self.notify(target, SyncType::Up, SyncStatus::Running, 0, total);

        for (i, parent_id) in dirty_ids.iter().enumerate() {
            match self.push_tree(target, parent_id) {
                Ok(Pushed::Saved) => summary.saved += 1,
                Ok(Pushed::Deleted) => summary.deleted += 1,
                Err(error) => {
                    warn!(parent_id = %parent_id, %error, "failed to sync up record tree");
                    summary.failures.push(SyncFailure {
                        parent_id: Some(parent_id.clone()),
                        error,
                    });
                }
            }

            let progress = i + 1;
            if progress % batch_size == 0 && progress < total {
                self.notify(target, SyncType::Up, SyncStatus::Running, progress, total);
            }
        }

        self.notify(target, SyncType::Up, SyncStatus::Done, total, total);
        info!(
            object_type = %target.parent().sobject_type,
            total,
            saved = summary.saved,
            deleted = summary.deleted,
            failed = summary.failed(),
            "sync up finished"
        );
        Ok(summary)
    }

    fn push_tree(&mut self, target: &ParentChildrenTarget, parent_id: &str) -> Result<Pushed> {
        let parent_info = target.parent();
        let children_info = target.children();
        let child_id_field = &children_info.id_field_name;
        let fk_field = &children_info.parent_id_field_name;

        let parent = self
            .store
            .query(
                &parent_info.soup_name,
                &Predicate::eq(parent_info.id_field_name.clone(), parent_id),
            )?
            .into_iter()
            .next()
            .ok_or_else(|| Error::StoreFailure(format!("parent {} disappeared", parent_id)))?;
        let mut children = self
            .store
            .query(&children_info.soup_name, &Predicate::eq(fk_field.clone(), parent_id))?;
        let children_soup = &children_info.soup_name;

        let parent_type = &parent_info.sobject_type;
        let child_type = &children_info.sobject_type;
        let parent_deleted = parent.is_locally_deleted();
        let mut server_parent_id = parent_id.to_string();

        if parent_deleted {
            if !parent.is_locally_created() {
                self.remote.delete(parent_type, &[parent_id.to_string()])?;
            }
        } else if parent.is_locally_created() || parent.is_locally_updated() {
            let fields = parent.server_fields(
                &parent_info.id_field_name,
                &[children_info.sobject_type_plural.as_str()],
            );
            if parent.is_locally_created() {
                server_parent_id = self.remote.create(parent_type, fields)?;
                self.commit_created_parent(target, &parent, &server_parent_id, &mut children)?;
            } else {
                self.remote.update(parent_type, parent_id, fields)?;
            }
        }

        // Server deletes of a master-detail parent cascade to its children
        let cascade = parent_deleted && target.relationship_type() == RelationshipType::MasterDetail;
        let mut removed = Vec::new();
        let mut kept = Vec::new();
        for mut child in children {
            let Some(entry_id) = child.soup_entry_id() else {
                continue;
            };
            if cascade {
                removed.push(entry_id);
                continue;
            }

            let child_id = child.id(child_id_field);
            if child.is_locally_deleted() {
                if !child.is_locally_created() {
                    if let Some(id) = child_id {
                        self.remote.delete(child_type, &[id])?;
                    }
                }
                removed.push(entry_id);
                continue;
            }

            if child.is_locally_created() || child.is_locally_updated() {
                let mut fields = child.server_fields(child_id_field, &[]);
                fields.set(fk_field.clone(), server_parent_id.clone());
                if child.is_locally_created() {
                    let server_id = self.remote.create(child_type, fields)?;
                    // Commit right away so a later failure cannot lead to a second create
                    child.set(child_id_field.clone(), server_id);
                    child.mark_clean();
                    child = self.store.upsert(children_soup, child, None)?;
                } else if let Some(id) = &child_id {
                    self.remote.update(child_type, id, fields)?;
                }
            }
            kept.push(child);
        }

        if parent_deleted {
            let parent_entry = parent.soup_entry_id();
            self.store.atomically(|s| {
                s.delete(children_soup, &removed)?;
                for mut child in kept {
                    child.mark_clean();
                    s.upsert(children_soup, child, None)?;
                }
                if let Some(entry_id) = parent_entry {
                    s.delete(&parent_info.soup_name, &[entry_id])?;
                }
                Ok(())
            })?;
            debug!(parent_id = %parent_id, "synced up deleted record tree");
            return Ok(Pushed::Deleted);
        }

        let mut confirmed = parent;
        confirmed.set(parent_info.id_field_name.clone(), server_parent_id.clone());
        let write_back = target.clone().with_merge_mode(MergeMode::Overwrite);
        self.store.atomically(|s| {
            s.delete(children_soup, &removed)?;
            let report = helper::save_record_trees_to_local_store(
                s,
                &write_back,
                vec![RecordTree::new(confirmed, kept)],
                TreeSource::Remote,
            );
            match report.outcomes.into_iter().next() {
                Some(TreeOutcome::Failed { error, .. }) => Err(error),
                _ => Ok(()),
            }
        })?;

        debug!(parent_id = %parent_id, server_id = %server_parent_id, "synced up record tree");
        Ok(Pushed::Saved)
    }

    /// Store the server id of a freshly created parent.
    ///
    /// The parent becomes clean and its children point at the server id.
    /// Children are marked updated so their new foreign key is pushed even
    /// if this run fails before reaching them.
    fn commit_created_parent(
        &mut self,
        target: &ParentChildrenTarget,
        parent: &Record,
        server_id: &str,
        children: &mut [Record],
    ) -> Result<()> {
        let parent_info = target.parent();
        let children_info = target.children();

        let mut created = parent.clone();
        created.set(parent_info.id_field_name.clone(), server_id);
        created.mark_clean();
        for child in children.iter_mut() {
            child.set(children_info.parent_id_field_name.clone(), server_id);
            child.mark_locally_updated();
        }

        self.store.atomically(|s| {
            s.upsert(&parent_info.soup_name, created, None)?;
            for child in children.iter() {
                s.upsert(&children_info.soup_name, child.clone(), None)?;
            }
            Ok(())
        })?;
        debug!(server_id = %server_id, "committed created parent");
        Ok(())
    }

    /// Delete clean local trees whose parent no longer exists on the server.
    pub fn clean_ghosts(&mut self, target: &ParentChildrenTarget) -> Result<GhostCleanup> {
        self.notify(target, SyncType::CleanGhosts, SyncStatus::Running, 0, 1);
        let result = self
            .remote
            .fetch_ids(&target.parent().sobject_type)
            .and_then(|remote_ids| helper::clean_ghosts(&mut self.store, target, &remote_ids));

        match result {
            Ok(cleanup) => {
                self.notify(target, SyncType::CleanGhosts, SyncStatus::Done, 1, 1);
                Ok(cleanup)
            }
            Err(error) => {
                warn!(object_type = %target.parent().sobject_type, %error, "ghost cleanup failed");
                self.notify(target, SyncType::CleanGhosts, SyncStatus::Failed, 0, 1);
                Err(error)
            }
        }
    }

    /// Master-detail children whose parent is missing locally.
    pub fn check_integrity(
        &self,
        target: &ParentChildrenTarget,
    ) -> Result<Vec<IntegrityViolation>> {
        helper::find_orphaned_children(&self.store, target)
    }

    fn notify(
        &mut self,
        target: &ParentChildrenTarget,
        sync_type: SyncType,
        status: SyncStatus,
        progress: usize,
        total: usize,
    ) {
        let event = SyncEvent {
            sync_type,
            status,
            object_type: target.parent().sobject_type.clone(),
            progress,
            total,
        };
        debug!(?sync_type, ?status, progress, total, "sync progress");
        self.observers.notify(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{remote::MemoryRemote, ChildrenInfo, MemoryStore, ParentInfo};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_target(relationship_type: RelationshipType) -> ParentChildrenTarget {
        ParentChildrenTarget::new(
            ParentInfo::new("Account", "accounts"),
            ChildrenInfo::new("Contact", "Contacts", "contacts", "AccountId"),
            relationship_type,
        )
        .unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn seeded_remote() -> MemoryRemote {
        let mut remote = MemoryRemote::new();
        for (account, contacts) in [("001", vec!["c1", "c2"]), ("002", vec!["c3"]), ("003", vec![])] {
            remote.insert("Account", record(json!({"Id": account, "Name": account})));
            for contact in contacts {
                remote.insert(
                    "Contact",
                    record(json!({"Id": contact, "AccountId": account, "LastName": contact})),
                );
            }
        }
        remote
    }

    fn manager(
        relationship_type: RelationshipType,
    ) -> (SyncManager<MemoryStore, MemoryRemote>, ParentChildrenTarget) {
        let target = test_target(relationship_type);
        let mut manager = SyncManager::new(MemoryStore::new(), seeded_remote());
        manager.setup_soups(&target).unwrap();
        (manager, target)
    }

    fn local(manager: &SyncManager<MemoryStore, MemoryRemote>, soup: &str) -> Vec<Record> {
        manager.store().query(soup, &Predicate::All).unwrap()
    }

    #[test]
    fn sync_down_saves_trees() {
        let (mut manager, target) = manager(RelationshipType::MasterDetail);
        let summary = manager
            .sync_down(&target, &["001".into(), "002".into(), "404".into()])
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.saved, 2);
        assert!(summary.is_success());
        assert_eq!(local(&manager, "accounts").len(), 2);
        assert_eq!(local(&manager, "contacts").len(), 3);
        assert!(manager.dirty_record_ids(&target).unwrap().is_empty());
    }

    #[test]
    fn sync_down_remote_failure_writes_nothing() {
        let (mut manager, target) = manager(RelationshipType::MasterDetail);
        manager.remote_mut().fail_object_type("Contact");

        let err = manager.sync_down(&target, &["001".into()]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Remote);
        assert!(local(&manager, "accounts").is_empty());
    }

    #[test]
    fn sync_down_reports_progress_per_batch() {
        let target = test_target(RelationshipType::Lookup);
        let config = SyncManagerConfig::default().with_batch_size(2);
        let mut manager = SyncManager::with_config(MemoryStore::new(), seeded_remote(), config);
        manager.setup_soups(&target).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        manager.add_observer(move |e: &SyncEvent| sink.borrow_mut().push((e.status, e.progress)));

        manager.sync_down_all(&target).unwrap();
        assert_eq!(
            *events.borrow(),
            vec![
                (SyncStatus::Running, 0),
                (SyncStatus::Running, 2),
                (SyncStatus::Running, 3),
                (SyncStatus::Done, 3),
            ]
        );
    }

    #[test]
    fn sync_up_replaces_local_ids() {
        let (mut manager, target) = manager(RelationshipType::MasterDetail);

        let parent = Record::new_locally_created("Id").with("Name", "Offline Inc");
        let local_parent_id = parent.id("Id").unwrap();
        let child = Record::new_locally_created("Id").with("LastName", "Doe");
        let report = manager.save_record_trees(
            &target,
            vec![RecordTree::new(parent, vec![child])],
            TreeSource::LocalStaged,
        );
        assert!(report.is_complete());
        assert_eq!(
            manager.dirty_record_ids(&target).unwrap(),
            BTreeSet::from([local_parent_id.clone()])
        );

        let summary = manager.sync_up(&target).unwrap();
        assert_eq!(summary.saved, 1);

        let accounts = local(&manager, "accounts");
        let server_id = accounts[0].id("Id").unwrap();
        assert_ne!(server_id, local_parent_id);
        assert!(!accounts[0].is_locally_dirty());
        assert!(manager.remote().get("Account", &server_id).is_some());

        let contacts = local(&manager, "contacts");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].get_str("AccountId"), Some(server_id.as_str()));
        assert!(!contacts[0].is_locally_dirty());
        let contact_id = contacts[0].id("Id").unwrap();
        assert_eq!(
            manager.remote().get("Contact", &contact_id).unwrap().get_str("AccountId"),
            Some(server_id.as_str())
        );
        assert!(manager.dirty_record_ids(&target).unwrap().is_empty());
    }

    #[test]
    fn sync_up_retry_after_child_failure_creates_parent_once() {
        let (mut manager, target) = manager(RelationshipType::MasterDetail);
        let accounts_before = manager.remote().len("Account");
        let contacts_before = manager.remote().len("Contact");

        let parent = Record::new_locally_created("Id").with("Name", "Offline Inc");
        let child = Record::new_locally_created("Id").with("LastName", "Doe");
        manager.save_record_trees(
            &target,
            vec![RecordTree::new(parent, vec![child])],
            TreeSource::LocalStaged,
        );

        manager.remote_mut().fail_object_type("Contact");
        let summary = manager.sync_up(&target).unwrap();
        assert_eq!(summary.failed(), 1);
        assert_eq!(manager.remote().len("Account"), accounts_before + 1);

        // The parent already carries its server id; the child is still pending
        let accounts = local(&manager, "accounts");
        let created: Vec<_> = accounts
            .iter()
            .filter(|a| a.get_str("Name") == Some("Offline Inc"))
            .collect();
        assert_eq!(created.len(), 1);
        let server_id = created[0].id("Id").unwrap();
        assert!(manager.remote().get("Account", &server_id).is_some());
        assert!(!created[0].is_locally_created());
        assert_eq!(
            manager.dirty_record_ids(&target).unwrap(),
            BTreeSet::from([server_id.clone()])
        );

        manager.remote_mut().clear_failures();
        let summary = manager.sync_up(&target).unwrap();
        assert_eq!(summary.saved, 1);
        assert!(summary.is_success());

        assert_eq!(manager.remote().len("Account"), accounts_before + 1);
        assert_eq!(manager.remote().len("Contact"), contacts_before + 1);
        let contact = local(&manager, "contacts")
            .into_iter()
            .find(|c| c.get_str("LastName") == Some("Doe"))
            .unwrap();
        assert_eq!(contact.get_str("AccountId"), Some(server_id.as_str()));
        assert!(!contact.is_locally_dirty());
        assert!(manager.dirty_record_ids(&target).unwrap().is_empty());
    }

    #[test]
    fn sync_up_pushes_updates_and_deletes() {
        let (mut manager, target) = manager(RelationshipType::MasterDetail);
        manager.sync_down_all(&target).unwrap();

        let store = manager.store_mut();
        let mut c1 = store
            .query("contacts", &Predicate::eq("Id", "c1"))
            .unwrap()
            .remove(0);
        c1.set("LastName", "Renamed");
        c1.mark_locally_updated();
        store.upsert("contacts", c1, None).unwrap();
        let mut c2 = store
            .query("contacts", &Predicate::eq("Id", "c2"))
            .unwrap()
            .remove(0);
        c2.mark_locally_deleted();
        store.upsert("contacts", c2, None).unwrap();
        let mut a2 = store
            .query("accounts", &Predicate::eq("Id", "002"))
            .unwrap()
            .remove(0);
        a2.mark_locally_deleted();
        store.upsert("accounts", a2, None).unwrap();

        let summary = manager.sync_up(&target).unwrap();
        assert_eq!((summary.saved, summary.deleted), (1, 1));

        let remote = manager.remote();
        assert_eq!(remote.get("Contact", "c1").unwrap().get_str("LastName"), Some("Renamed"));
        assert!(remote.get("Contact", "c2").is_none());
        assert!(remote.get("Account", "002").is_none());

        let contact_ids: Vec<_> = local(&manager, "contacts")
            .iter()
            .filter_map(|c| c.id("Id"))
            .collect();
        assert_eq!(contact_ids, vec!["c1"]);
        assert!(manager.dirty_record_ids(&target).unwrap().is_empty());
    }

    #[test]
    fn sync_up_failure_leaves_tree_dirty() {
        let (mut manager, target) = manager(RelationshipType::Lookup);
        manager.sync_down_all(&target).unwrap();

        for id in ["001", "002"] {
            let mut account = manager
                .store()
                .query("accounts", &Predicate::eq("Id", id))
                .unwrap()
                .remove(0);
            account.mark_locally_updated();
            manager.store_mut().upsert("accounts", account, None).unwrap();
        }
        manager.remote_mut().fail_record("001");

        let summary = manager.sync_up(&target).unwrap();
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].parent_id.as_deref(), Some("001"));
        assert_eq!(
            manager.dirty_record_ids(&target).unwrap(),
            BTreeSet::from(["001".to_string()])
        );
    }

    #[test]
    fn created_then_deleted_offline_never_reaches_server() {
        let (mut manager, target) = manager(RelationshipType::MasterDetail);
        let mut parent = Record::new_locally_created("Id");
        parent.mark_locally_deleted();
        manager.save_record_trees(
            &target,
            vec![RecordTree::new(parent, Vec::new())],
            TreeSource::LocalStaged,
        );
        let writes = manager.remote().write_count();

        let summary = manager.sync_up(&target).unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(manager.remote().write_count(), writes);
        assert!(local(&manager, "accounts").is_empty());
    }

    #[test]
    fn clean_ghosts_and_integrity() {
        let (mut manager, target) = manager(RelationshipType::MasterDetail);
        manager.sync_down_all(&target).unwrap();
        manager.remote_mut().remove("Account", "002");

        let cleanup = manager.clean_ghosts(&target).unwrap();
        assert_eq!(cleanup.parents_deleted, 1);
        assert_eq!(cleanup.children_deleted, 1);
        assert!(manager.check_integrity(&target).unwrap().is_empty());
    }

    #[test]
    fn removed_observer_gets_nothing() {
        let (mut manager, target) = manager(RelationshipType::Lookup);
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        let handle = manager.add_observer(move |_: &SyncEvent| *counter.borrow_mut() += 1);
        assert!(manager.remove_observer(handle));

        manager.sync_down_all(&target).unwrap();
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn summary_serialization() {
        let mut summary = SyncSummary::new(SyncType::Up, 1);
        summary.failures.push(SyncFailure {
            parent_id: Some("001".into()),
            error: Error::remote("Account", "record 001 is locked"),
        });
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["syncType"], "up");
        assert_eq!(
            json["failures"][0]["error"],
            "remote error for Account: record 001 is locked"
        );
    }
}
