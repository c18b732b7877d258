//! Soup schema bootstrap for a parent/children target.
//!
//! Creates the two soups with every index the dirty-id queries and the
//! record tree save need. Dropping is destructive and meant for tests and
//! resets.

use crate::{
    error::Result,
    record::{LOCAL, LOCALLY_CREATED, LOCALLY_DELETED, LOCALLY_UPDATED},
    soup::{IndexSpec, SoupSpec},
    ChildrenInfo, LocalStore, ParentChildrenTarget, ParentInfo,
};
use tracing::info;

fn flag_indexes() -> [IndexSpec; 4] {
    [
        IndexSpec::string(LOCAL),
        IndexSpec::string(LOCALLY_CREATED),
        IndexSpec::string(LOCALLY_UPDATED),
        IndexSpec::string(LOCALLY_DELETED),
    ]
}

/// Soup definition for the parent records.
pub fn parent_soup_spec(parent: &ParentInfo) -> SoupSpec {
    let mut spec = SoupSpec::new(parent.soup_name.clone(), Vec::new());
    spec.add_index(IndexSpec::string(&parent.id_field_name));
    if let Some(external_id) = &parent.external_id_field_name {
        spec.add_index(IndexSpec::string(external_id));
    }
    spec.add_index(IndexSpec::string(&parent.modification_date_field_name));
    for index in flag_indexes() {
        spec.add_index(index);
    }
    spec
}

/// Soup definition for the child records, including the foreign key index.
pub fn children_soup_spec(children: &ChildrenInfo) -> SoupSpec {
    let mut spec = SoupSpec::new(children.soup_name.clone(), Vec::new());
    spec.add_index(IndexSpec::string(&children.id_field_name));
    if let Some(external_id) = &children.external_id_field_name {
        spec.add_index(IndexSpec::string(external_id));
    }
    spec.add_index(IndexSpec::string(&children.parent_id_field_name));
    spec.add_index(IndexSpec::string(&children.modification_date_field_name));
    for index in flag_indexes() {
        spec.add_index(index);
    }
    spec
}

/// Register the parent and children soups of `target`.
pub fn create_soups<S: LocalStore + ?Sized>(
    store: &mut S,
    target: &ParentChildrenTarget,
) -> Result<()> {
    store.create_soup(parent_soup_spec(target.parent()))?;
    store.create_soup(children_soup_spec(target.children()))?;
    info!(
        parent_soup = %target.parent().soup_name,
        children_soup = %target.children().soup_name,
        "created parent/children soups"
    );
    Ok(())
}

/// Drop the parent and children soups of `target`, with all their records.
pub fn drop_soups<S: LocalStore + ?Sized>(
    store: &mut S,
    target: &ParentChildrenTarget,
) -> Result<()> {
    store.drop_soup(&target.children().soup_name)?;
    store.drop_soup(&target.parent().soup_name)?;
    info!(
        parent_soup = %target.parent().soup_name,
        children_soup = %target.children().soup_name,
        "dropped parent/children soups"
    );
    Ok(())
}
