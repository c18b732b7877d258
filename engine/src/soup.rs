//! Soup definitions and query predicates.

use crate::{record::value_key, Record, SoupName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of an index. Lookups compare the text form of values, so the type
/// only documents intent and is kept for parity with on-device stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    String,
    Integer,
    Floating,
    Json1,
}

/// An index on a top-level field of the records of a soup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub path: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
}

impl IndexSpec {
    pub fn new(path: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            path: path.into(),
            index_type,
        }
    }

    pub fn string(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::String)
    }
}

/// Definition of a soup: its name and indexed paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoupSpec {
    pub name: SoupName,
    pub indexes: Vec<IndexSpec>,
}

impl SoupSpec {
    pub fn new(name: impl Into<SoupName>, indexes: Vec<IndexSpec>) -> Self {
        Self {
            name: name.into(),
            indexes,
        }
    }

    /// Add an index unless the path is already indexed.
    pub fn add_index(&mut self, index: IndexSpec) -> &mut Self {
        if !self.has_index(&index.path) {
            self.indexes.push(index);
        }
        self
    }

    pub fn has_index(&self, path: &str) -> bool {
        self.indexes.iter().any(|i| i.path == path)
    }
}

/// Filter over the records of a soup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    /// Every record
    All,
    /// Records whose `path` equals `value`
    Eq { path: String, value: Value },
    /// Records whose `path` equals one of `values`
    In { path: String, values: Vec<Value> },
    /// Records matching every inner predicate
    And { predicates: Vec<Predicate> },
}

impl Predicate {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And { predicates }
    }

    /// Paths the predicate reads. All of them must be indexed.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Predicate::All => Vec::new(),
            Predicate::Eq { path, .. } | Predicate::In { path, .. } => vec![path.as_str()],
            Predicate::And { predicates } => predicates.iter().flat_map(|p| p.paths()).collect(),
        }
    }

    /// Evaluate the predicate against a record.
    ///
    /// Values are compared by their text form, so `true` matches `"true"`
    /// and `1` matches `"1"`. Null never matches.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq { path, value } => match (record.id(path), value_key(value)) {
                (Some(actual), Some(expected)) => actual == expected,
                _ => false,
            },
            Predicate::In { path, values } => match record.id(path) {
                Some(actual) => values
                    .iter()
                    .filter_map(value_key)
                    .any(|expected| expected == actual),
                None => false,
            },
            Predicate::And { predicates } => predicates.iter().all(|p| p.matches(record)),
        }
    }
}
