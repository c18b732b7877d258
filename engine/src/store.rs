//! Store - the local record store.
//!
//! [`LocalStore`] is the contract the sync helper relies on: soups of
//! schema-less records, indexed lookups, upserts and deletes, and an atomic
//! section spanning several writes. [`MemoryStore`] is the in-memory
//! implementation used by tests, benchmarks and the FFI layer.

use crate::{
    error::Result,
    record::value_key,
    snapshot::{SoupSnapshot, StoreSnapshot},
    Error, Predicate, Record, SoupEntryId, SoupName, SoupSpec,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Contract of a local record store.
pub trait LocalStore {
    /// Register a soup. Registering an existing soup is a no-op.
    fn create_soup(&mut self, spec: SoupSpec) -> Result<()>;

    /// Remove a soup and all its records. Missing soups are ignored.
    fn drop_soup(&mut self, name: &str) -> Result<()>;

    fn has_soup(&self, name: &str) -> bool;

    /// Insert or update a record and return it as stored.
    ///
    /// The target entry is the record's `_soupEntryId` when present, otherwise
    /// the entry whose `external_id_path` matches, otherwise a new entry.
    fn upsert(
        &mut self,
        soup: &str,
        record: Record,
        external_id_path: Option<&str>,
    ) -> Result<Record>;

    /// Records matching `predicate`, ordered by entry id.
    fn query(&self, soup: &str, predicate: &Predicate) -> Result<Vec<Record>>;

    /// Records with the given entry ids. Unknown ids are skipped.
    fn retrieve(&self, soup: &str, entry_ids: &[SoupEntryId]) -> Result<Vec<Record>>;

    /// Delete records by entry id. Unknown ids are ignored.
    fn delete(&mut self, soup: &str, entry_ids: &[SoupEntryId]) -> Result<()>;

    /// Run `f` so that either all of its writes are kept or, if it returns an
    /// error, none of them are.
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>;
}

type IndexMap = BTreeMap<String, BTreeSet<SoupEntryId>>;

/// A soup: records by entry id plus the declared indexes.
#[derive(Debug, Clone)]
pub struct Soup {
    spec: SoupSpec,
    entries: BTreeMap<SoupEntryId, Record>,
    indexes: HashMap<String, IndexMap>,
    next_entry_id: SoupEntryId,
}

impl Soup {
    fn new(spec: SoupSpec) -> Self {
        let indexes = spec
            .indexes
            .iter()
            .map(|i| (i.path.clone(), IndexMap::new()))
            .collect();
        Self {
            spec,
            entries: BTreeMap::new(),
            indexes,
            next_entry_id: 1,
        }
    }

    pub fn spec(&self) -> &SoupSpec {
        &self.spec
    }

    /// Get a record by entry id.
    pub fn get(&self, entry_id: SoupEntryId) -> Option<&Record> {
        self.entries.get(&entry_id)
    }

    /// All records, ordered by entry id.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_insert(&mut self, entry_id: SoupEntryId, record: &Record) {
        for (path, index) in self.indexes.iter_mut() {
            if let Some(key) = record.get(path).and_then(value_key) {
                index.entry(key).or_default().insert(entry_id);
            }
        }
    }

    fn index_remove(&mut self, entry_id: SoupEntryId, record: &Record) {
        for (path, index) in self.indexes.iter_mut() {
            if let Some(key) = record.get(path).and_then(value_key) {
                if let Some(ids) = index.get_mut(&key) {
                    ids.remove(&entry_id);
                    if ids.is_empty() {
                        index.remove(&key);
                    }
                }
            }
        }
    }

    fn insert(&mut self, mut record: Record) -> Record {
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        record.set_soup_entry_id(entry_id);
        self.put(entry_id, record)
    }

    fn put(&mut self, entry_id: SoupEntryId, mut record: Record) -> Record {
        record.set_soup_entry_id(entry_id);
        if let Some(previous) = self.entries.remove(&entry_id) {
            self.index_remove(entry_id, &previous);
        }
        self.index_insert(entry_id, &record);
        self.entries.insert(entry_id, record.clone());
        record
    }

    fn remove(&mut self, entry_id: SoupEntryId) -> Option<Record> {
        let record = self.entries.remove(&entry_id)?;
        self.index_remove(entry_id, &record);
        Some(record)
    }

    fn check_indexed(&self, path: &str) -> Result<()> {
        if self.spec.has_index(path) {
            Ok(())
        } else {
            Err(Error::PathNotIndexed {
                soup: self.spec.name.clone(),
                path: path.to_string(),
            })
        }
    }

    fn lookup(&self, path: &str, value: &serde_json::Value) -> BTreeSet<SoupEntryId> {
        match (self.indexes.get(path), value_key(value)) {
            (Some(index), Some(key)) => index.get(&key).cloned().unwrap_or_default(),
            _ => BTreeSet::new(),
        }
    }

    /// Entry ids that may match, narrowed with the indexes.
    fn candidates(&self, predicate: &Predicate) -> BTreeSet<SoupEntryId> {
        match predicate {
            Predicate::All => self.entries.keys().copied().collect(),
            Predicate::Eq { path, value } => self.lookup(path, value),
            Predicate::In { path, values } => values
                .iter()
                .flat_map(|v| self.lookup(path, v))
                .collect(),
            Predicate::And { predicates } => match predicates.first() {
                Some(first) => self.candidates(first),
                None => self.entries.keys().copied().collect(),
            },
        }
    }

    fn query(&self, predicate: &Predicate) -> Result<Vec<Record>> {
        for path in predicate.paths() {
            self.check_indexed(path)?;
        }

        Ok(self
            .candidates(predicate)
            .into_iter()
            .filter_map(|id| self.entries.get(&id))
            .filter(|record| predicate.matches(record))
            .cloned()
            .collect())
    }
}

/// In-memory [`LocalStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    soups: BTreeMap<SoupName, Soup>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a soup by name.
    pub fn soup(&self, name: &str) -> Option<&Soup> {
        self.soups.get(name)
    }

    /// Names of all registered soups, sorted.
    pub fn soup_names(&self) -> impl Iterator<Item = &SoupName> {
        self.soups.keys()
    }

    fn soup_ref(&self, name: &str) -> Result<&Soup> {
        self.soups
            .get(name)
            .ok_or_else(|| Error::SoupNotFound(name.to_string()))
    }

    fn soup_mut(&mut self, name: &str) -> Result<&mut Soup> {
        self.soups
            .get_mut(name)
            .ok_or_else(|| Error::SoupNotFound(name.to_string()))
    }

    /// Export the current store state as a snapshot.
    pub fn export_state(&self) -> StoreSnapshot {
        let mut snapshot = StoreSnapshot::new();
        for (name, soup) in &self.soups {
            snapshot.soups.insert(
                name.clone(),
                SoupSnapshot {
                    spec: soup.spec.clone(),
                    next_entry_id: soup.next_entry_id,
                    entries: soup.entries.clone(),
                },
            );
        }
        snapshot
    }

    /// Import state from a snapshot, replacing everything in the store.
    pub fn import_state(&mut self, snapshot: StoreSnapshot) -> Result<()> {
        snapshot.validate()?;

        let mut soups = BTreeMap::new();
        for (name, soup_snapshot) in snapshot.soups {
            let mut soup = Soup::new(soup_snapshot.spec);
            for (entry_id, record) in soup_snapshot.entries {
                soup.put(entry_id, record);
            }
            soup.next_entry_id = soup_snapshot.next_entry_id;
            soups.insert(name, soup);
        }

        self.soups = soups;
        Ok(())
    }
}

impl LocalStore for MemoryStore {
    fn create_soup(&mut self, spec: SoupSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "soup name must not be empty".into(),
            ));
        }
        self.soups
            .entry(spec.name.clone())
            .or_insert_with(|| Soup::new(spec));
        Ok(())
    }

    fn drop_soup(&mut self, name: &str) -> Result<()> {
        self.soups.remove(name);
        Ok(())
    }

    fn has_soup(&self, name: &str) -> bool {
        self.soups.contains_key(name)
    }

    fn upsert(
        &mut self,
        soup_name: &str,
        record: Record,
        external_id_path: Option<&str>,
    ) -> Result<Record> {
        let soup = self.soup_mut(soup_name)?;

        if let Some(entry_id) = record.soup_entry_id() {
            if !soup.entries.contains_key(&entry_id) {
                return Err(Error::EntryNotFound {
                    soup: soup_name.to_string(),
                    entry_id,
                });
            }
            return Ok(soup.put(entry_id, record));
        }

        let Some(path) = external_id_path else {
            return Ok(soup.insert(record));
        };
        soup.check_indexed(path)?;

        let matches = match record.get(path) {
            Some(value) => soup.lookup(path, value),
            None => BTreeSet::new(),
        };
        if matches.len() > 1 {
            return Err(Error::ConstraintViolation {
                soup: soup_name.to_string(),
                message: format!("{} entries share external id path '{}'", matches.len(), path),
            });
        }
        match matches.first() {
            Some(&entry_id) => Ok(soup.put(entry_id, record)),
            None => Ok(soup.insert(record)),
        }
    }

    fn query(&self, soup: &str, predicate: &Predicate) -> Result<Vec<Record>> {
        self.soup_ref(soup)?.query(predicate)
    }

    fn retrieve(&self, soup: &str, entry_ids: &[SoupEntryId]) -> Result<Vec<Record>> {
        let soup = self.soup_ref(soup)?;
        Ok(entry_ids
            .iter()
            .filter_map(|id| soup.get(*id))
            .cloned()
            .collect())
    }

    fn delete(&mut self, soup: &str, entry_ids: &[SoupEntryId]) -> Result<()> {
        let soup = self.soup_mut(soup)?;
        for entry_id in entry_ids {
            soup.remove(*entry_id);
        }
        Ok(())
    }

    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved = self.soups.clone();
        let result = f(self);
        if result.is_err() {
            self.soups = saved;
        }
        result
    }
}
