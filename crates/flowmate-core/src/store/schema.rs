//! SQLite schema for the local document store
//!
//! Each user is a partition. Notes and schedules are keyed by
//! `(owner_id, id)`, so the same id may appear under two owners.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Partitions
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT,
            created_at INTEGER NOT NULL
        );

        -- Notes, one row per (owner, id)
        CREATE TABLE IF NOT EXISTS notes (
            owner_id TEXT NOT NULL,
            id TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            note_type TEXT NOT NULL DEFAULT 'normal',
            subjective TEXT,
            objective TEXT,
            assessment TEXT,
            plan TEXT,
            display_date TEXT NOT NULL,
            shared INTEGER NOT NULL DEFAULT 0,
            share_token TEXT,
            shared_at INTEGER,
            copied_from TEXT,
            original_share_token TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (owner_id, id),
            FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
        );

        -- Tags, ordered per note
        CREATE TABLE IF NOT EXISTS note_tags (
            owner_id TEXT NOT NULL,
            note_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (owner_id, note_id, position),
            FOREIGN KEY (owner_id, note_id) REFERENCES notes(owner_id, id) ON DELETE CASCADE
        );

        -- Images as data URLs, ordered per note
        CREATE TABLE IF NOT EXISTS note_images (
            owner_id TEXT NOT NULL,
            note_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            data_url TEXT NOT NULL,
            PRIMARY KEY (owner_id, note_id, position),
            FOREIGN KEY (owner_id, note_id) REFERENCES notes(owner_id, id) ON DELETE CASCADE
        );

        -- Shifts
        CREATE TABLE IF NOT EXISTS schedules (
            owner_id TEXT NOT NULL,
            id TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            location TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            shift_type TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (owner_id, id),
            FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
        );

        -- Share lookups within a partition
        CREATE INDEX IF NOT EXISTS idx_notes_share_token ON notes(owner_id, share_token);

        -- Newest-first listing
        CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(owner_id, created_at);

        -- Calendar views
        CREATE INDEX IF NOT EXISTS idx_schedules_date ON schedules(owner_id, date);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = names(&conn, "table");
        for table in ["users", "notes", "note_tags", "note_images", "schedules"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_indexes_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let indexes = names(&conn, "index");
        assert!(indexes.contains(&"idx_notes_share_token".to_string()));
        assert!(indexes.contains(&"idx_schedules_date".to_string()));
    }
}
