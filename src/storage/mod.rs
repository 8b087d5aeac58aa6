//! Storage module for persisting discovery and normalization output
//!
//! This module handles:
//! - URL lists and data tables as delimited-record files
//! - Staged (write-then-rename) file replacement
//! - The SQLite key registry that keeps surrogate keys stable

pub mod csv_store;
mod schema;
mod sqlite;
mod traits;

pub use csv_store::{
    read_column, read_table, read_url_list, rejected_path, stage_table, stage_url_list, write_url_list,
    StagedFile,
};
pub use sqlite::SqliteKeyRegistry;
pub use traits::{KeyRegistry, MemoryKeyRegistry, StorageError, StorageResult};

use std::path::Path;

/// Opens the configured key registry, or an in-memory one when no file is
/// configured
pub fn open_key_registry(path: Option<&Path>) -> StorageResult<Box<dyn KeyRegistry>> {
    match path {
        Some(path) => {
            tracing::debug!("Opening key registry at {}", path.display());
            Ok(Box::new(SqliteKeyRegistry::new(path)?))
        }
        None => Ok(Box::new(MemoryKeyRegistry::new())),
    }
}
