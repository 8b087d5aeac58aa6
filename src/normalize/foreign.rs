//! Foreign-key lookups

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::rows::EntityRef;

/// Why a reference could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedRef {
    /// The natural key names no row of the referenced table
    UnknownName { column: &'static str, name: String },
    /// The integer key is not a primary key of the referenced table
    UnknownKey { column: &'static str, key: i64 },
    /// A required reference is empty
    Missing { column: &'static str },
}

impl fmt::Display for UnresolvedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownName { column, name } => {
                write!(f, "{}: no match for '{}'", column, name)
            }
            Self::UnknownKey { column, key } => write!(f, "{}: unknown key {}", column, key),
            Self::Missing { column } => write!(f, "{}: empty reference", column),
        }
    }
}

/// Natural key -> primary key mapping of one table
#[derive(Debug, Default)]
pub struct Lookup {
    by_name: HashMap<String, i64>,
    keys: HashSet<i64>,
}

impl Lookup {
    /// Builds a lookup from (natural key, primary key) pairs in row order
    ///
    /// When a natural key appears twice the later row wins.
    pub fn build<I>(table: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let mut lookup = Self::default();
        for (name, key) in entries {
            lookup.keys.insert(key);
            if name.is_empty() {
                continue;
            }
            if let Some(previous) = lookup.by_name.insert(name.clone(), key) {
                if previous != key {
                    tracing::warn!(
                        "{}: '{}' maps to keys {} and {}, using {}",
                        table,
                        name,
                        previous,
                        key,
                        key
                    );
                }
            }
        }
        lookup
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.keys.contains(&key)
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    /// Resolves a reference that may be empty
    pub fn resolve_optional(
        &self,
        column: &'static str,
        reference: &EntityRef,
    ) -> Result<Option<i64>, UnresolvedRef> {
        match reference {
            EntityRef::Empty => Ok(None),
            EntityRef::Key(key) if self.contains_key(*key) => Ok(Some(*key)),
            EntityRef::Key(key) => Err(UnresolvedRef::UnknownKey { column, key: *key }),
            EntityRef::Name(name) => {
                self.get(name)
                    .map(Some)
                    .ok_or_else(|| UnresolvedRef::UnknownName {
                        column,
                        name: name.clone(),
                    })
            }
        }
    }

    /// Resolves a reference that must point at a row
    pub fn resolve(&self, column: &'static str, reference: &EntityRef) -> Result<i64, UnresolvedRef> {
        self.resolve_optional(column, reference)?
            .ok_or(UnresolvedRef::Missing { column })
    }
}
