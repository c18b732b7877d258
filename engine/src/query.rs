//! Dirty and non-dirty parent id queries.
//!
//! A parent is dirty when it has unsynced local changes itself or when at
//! least one of its children does. The two queries partition the parents of
//! a soup: every parent id is returned by exactly one of them.
//!
//! Each query has two forms. [`RecordIdsQuery::to_smart_sql`] renders the
//! Smart SQL an on-device store would run, and [`RecordIdsQuery::execute`]
//! evaluates the same selection against any [`LocalStore`] through its
//! indexed query primitives.

use crate::{
    error::Result,
    record::{value_key, LOCAL},
    ChildrenInfo, LocalStore, ParentInfo, Predicate,
};
use std::collections::BTreeSet;

/// Which side of the partition a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyScope {
    Dirty,
    NonDirty,
}

/// Selection of parent ids by dirtiness of the parent/children tree.
#[derive(Debug, Clone, Copy)]
pub struct RecordIdsQuery<'a> {
    parent: &'a ParentInfo,
    children: &'a ChildrenInfo,
    id_field: &'a str,
    scope: DirtyScope,
}

impl<'a> RecordIdsQuery<'a> {
    pub fn new(
        parent: &'a ParentInfo,
        children: &'a ChildrenInfo,
        id_field: &'a str,
        scope: DirtyScope,
    ) -> Self {
        Self {
            parent,
            children,
            id_field,
            scope,
        }
    }

    /// Parents that are dirty or have a dirty child.
    pub fn dirty(parent: &'a ParentInfo, children: &'a ChildrenInfo, id_field: &'a str) -> Self {
        Self::new(parent, children, id_field, DirtyScope::Dirty)
    }

    /// Parents that are clean and have only clean children.
    pub fn non_dirty(
        parent: &'a ParentInfo,
        children: &'a ChildrenInfo,
        id_field: &'a str,
    ) -> Self {
        Self::new(parent, children, id_field, DirtyScope::NonDirty)
    }

    pub fn scope(&self) -> DirtyScope {
        self.scope
    }

    /// Render the query as Smart SQL.
    pub fn to_smart_sql(&self) -> String {
        let parent_soup = &self.parent.soup_name;
        let children_soup = &self.children.soup_name;

        let dirty_child = format!(
            "SELECT {{{c}:{cid}}} FROM {{{c}}} WHERE {{{c}:{fk}}} = {{{p}:{pid}}} AND {{{c}:{local}}} = 'true'",
            c = children_soup,
            cid = self.children.id_field_name,
            fk = self.children.parent_id_field_name,
            p = parent_soup,
            pid = self.parent.id_field_name,
            local = LOCAL,
        );

        let dirty = format!(
            "{{{p}:{local}}} = 'true' OR EXISTS ({sub})",
            p = parent_soup,
            local = LOCAL,
            sub = dirty_child
        );
        // Exact complement, so parents without a flag still land on one side
        let condition = match self.scope {
            DirtyScope::Dirty => dirty,
            DirtyScope::NonDirty => format!("NOT ({})", dirty),
        };

        format!(
            "SELECT DISTINCT {{{p}:{id}}} FROM {{{p}}} WHERE {cond}",
            p = parent_soup,
            id = self.id_field,
            cond = condition
        )
    }

    /// Evaluate the query against a store.
    ///
    /// Parents without a value in `id_field` are not returned by either scope.
    pub fn execute<S: LocalStore + ?Sized>(&self, store: &S) -> Result<BTreeSet<String>> {
        // Any one flag makes a child dirty, with or without `__local__`
        let children = store.query(&self.children.soup_name, &Predicate::All)?;
        let parents_with_dirty_children: BTreeSet<String> = children
            .iter()
            .filter(|c| c.is_locally_dirty())
            .filter_map(|c| c.get(&self.children.parent_id_field_name))
            .filter_map(value_key)
            .collect();

        let parents = store.query(&self.parent.soup_name, &Predicate::All)?;
        let mut dirty = BTreeSet::new();
        let mut all = BTreeSet::new();
        for parent in &parents {
            let Some(id) = parent.id(self.id_field) else {
                continue;
            };
            let has_dirty_child = parent
                .id(&self.parent.id_field_name)
                .is_some_and(|key| parents_with_dirty_children.contains(&key));
            if parent.is_locally_dirty() || has_dirty_child {
                dirty.insert(id.clone());
            }
            all.insert(id);
        }

        Ok(match self.scope {
            DirtyScope::Dirty => dirty,
            DirtyScope::NonDirty => all.difference(&dirty).cloned().collect(),
        })
    }
}

/// Smart SQL selecting the ids of dirty parent/children trees.
pub fn dirty_record_ids_sql(parent: &ParentInfo, children: &ChildrenInfo, id_field: &str) -> String {
    RecordIdsQuery::dirty(parent, children, id_field).to_smart_sql()
}

/// Smart SQL selecting the ids of clean parent/children trees.
pub fn non_dirty_record_ids_sql(
    parent: &ParentInfo,
    children: &ChildrenInfo,
    id_field: &str,
) -> String {
    RecordIdsQuery::non_dirty(parent, children, id_field).to_smart_sql()
}

/// Ids of parents that are dirty or have a dirty child.
pub fn dirty_record_ids<S: LocalStore + ?Sized>(
    store: &S,
    parent: &ParentInfo,
    children: &ChildrenInfo,
    id_field: &str,
) -> Result<BTreeSet<String>> {
    RecordIdsQuery::dirty(parent, children, id_field).execute(store)
}

/// Ids of parents that are clean and have only clean children.
pub fn non_dirty_record_ids<S: LocalStore + ?Sized>(
    store: &S,
    parent: &ParentInfo,
    children: &ChildrenInfo,
    id_field: &str,
) -> Result<BTreeSet<String>> {
    RecordIdsQuery::non_dirty(parent, children, id_field).execute(store)
}
