//! SQLite key registry implementation
//!
//! This module provides a SQLite-based implementation of the KeyRegistry trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{KeyRegistry, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;

/// SQLite key registry backend
pub struct SqliteKeyRegistry {
    conn: Connection,
}

impl SqliteKeyRegistry {
    /// Opens (creating if needed) the registry at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory registry (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Counts the mappings recorded for a table
    pub fn count(&self, table: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM surrogate_keys WHERE table_name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl KeyRegistry for SqliteKeyRegistry {
    fn load_table(&self, table: &str) -> StorageResult<HashMap<String, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT natural_key, surrogate_key FROM surrogate_keys WHERE table_name = ?1")?;

        let rows = stmt.query_map(params![table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut keys = HashMap::new();
        for row in rows {
            let (natural, key) = row?;
            keys.insert(natural, key);
        }

        Ok(keys)
    }

    fn save_table(&mut self, table: &str, keys: &[(String, i64)]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO surrogate_keys (table_name, natural_key, surrogate_key, assigned_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(table_name, natural_key)
                 DO UPDATE SET surrogate_key = excluded.surrogate_key
                 WHERE surrogate_key != excluded.surrogate_key",
            )?;

            for (natural, key) in keys {
                stmt.execute(params![table, natural, key, now])?;
            }
        }

        tx.commit()?;
        tracing::debug!("Recorded {} {} keys in registry", keys.len(), table);
        Ok(())
    }
}
