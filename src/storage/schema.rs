//! Database schema definitions for the key registry

use rusqlite::Connection;

/// SQL schema for the key registry database
pub const SCHEMA_SQL: &str = r#"
-- One row per natural key that has received a surrogate key
CREATE TABLE IF NOT EXISTS surrogate_keys (
    table_name TEXT NOT NULL,
    natural_key TEXT NOT NULL,
    surrogate_key INTEGER NOT NULL,
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (table_name, natural_key)
);

CREATE INDEX IF NOT EXISTS idx_surrogate_keys_key ON surrogate_keys(table_name, surrogate_key);
"#;

/// Creates the registry tables if they do not exist yet
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
