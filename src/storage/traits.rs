//! Storage traits and error types
//!
//! This module defines the trait interface for key registry backends and
//! the error type shared by every persistence operation.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Column '{column}' not found in {}", path.display())]
    MissingColumn { path: PathBuf, column: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Remembers which surrogate key was handed to which natural key
///
/// The normalizer loads one table's mapping before assigning primary keys
/// and saves the final mapping afterwards, so a row keeps its key even when
/// the raw table it comes from is regenerated in a different order.
pub trait KeyRegistry {
    /// Loads the natural key -> surrogate key mapping of a table
    fn load_table(&self, table: &str) -> StorageResult<HashMap<String, i64>>;

    /// Inserts or overwrites mappings for a table
    fn save_table(&mut self, table: &str, keys: &[(String, i64)]) -> StorageResult<()>;
}

/// Registry kept only for the lifetime of the process
///
/// Used when no registry file is configured; key stability then rests on
/// rows keeping their already-assigned keys in the normalized tables.
#[derive(Debug, Default)]
pub struct MemoryKeyRegistry {
    tables: HashMap<String, HashMap<String, i64>>,
}

impl MemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyRegistry for MemoryKeyRegistry {
    fn load_table(&self, table: &str) -> StorageResult<HashMap<String, i64>> {
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }

    fn save_table(&mut self, table: &str, keys: &[(String, i64)]) -> StorageResult<()> {
        let entry = self.tables.entry(table.to_string()).or_default();
        for (natural, key) in keys {
            entry.insert(natural.clone(), *key);
        }
        Ok(())
    }
}
