//! Database schema and versioning.
//!
//! The v1 layout uses `CREATE ... IF NOT EXISTS` throughout, so a database
//! created by an earlier unversioned deployment is adopted in place. Such
//! deployments predate device deactivation; the legacy step adds the missing
//! `active` column with every device active.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        adopt_legacy(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Registered devices
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            provider TEXT NOT NULL,
            config TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        -- Normalized readings, timestamps as UTC 'YYYY-MM-DD HH:MM:SS'
        CREATE TABLE IF NOT EXISTS measurements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            pm1 REAL,
            pm2 REAL,
            pm10 REAL,
            co2 INTEGER,
            temperature REAL,
            humidity REAL,
            nox INTEGER,
            tvoc INTEGER,
            FOREIGN KEY (device_id) REFERENCES devices (id)
        );
        CREATE INDEX IF NOT EXISTS idx_timestamp
            ON measurements(timestamp);
        CREATE INDEX IF NOT EXISTS idx_device_timestamp
            ON measurements(device_id, timestamp);
        "#,
    )?;

    Ok(())
}

/// Bring a pre-versioning `devices` table up to the v1 columns.
fn adopt_legacy(conn: &Connection) -> Result<()> {
    let has_active: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('devices') WHERE name = 'active'",
        [],
        |row| row.get(0),
    )?;
    if !has_active {
        tracing::info!("Adding 'active' column to legacy devices table");
        conn.execute_batch("ALTER TABLE devices ADD COLUMN active INTEGER NOT NULL DEFAULT 1;")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ? ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables = names(&conn, "table");
        assert!(tables.contains(&"devices".to_string()));
        assert!(tables.contains(&"measurements".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));

        let indexes = names(&conn, "index");
        assert!(indexes.contains(&"idx_timestamp".to_string()));
        assert!(indexes.contains(&"idx_device_timestamp".to_string()));
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // Re-running is a no-op.
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_adopts_unversioned_database() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE devices (id INTEGER PRIMARY KEY, name TEXT NOT NULL,
                 provider TEXT NOT NULL, config JSON, active BOOLEAN DEFAULT 1,
                 created_at DATETIME DEFAULT CURRENT_TIMESTAMP);
             INSERT INTO devices (id, name, provider, config) VALUES (1, 'Old', 'airgradient', '{}');",
        )
        .unwrap();

        initialize(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_adopts_database_without_active_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE devices (id INTEGER PRIMARY KEY, name TEXT NOT NULL,
                 provider TEXT NOT NULL, config JSON,
                 created_at DATETIME DEFAULT CURRENT_TIMESTAMP);
             INSERT INTO devices (id, name, provider, config) VALUES (1, 'Old', 'airgradient', '{}');",
        )
        .unwrap();

        initialize(&conn).unwrap();

        let active: bool = conn
            .query_row("SELECT active FROM devices WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert!(active);
    }

    #[test]
    fn test_required_columns_reject_null() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO devices (id, name, provider, config) VALUES (1, 'A', 'airgradient', '{}')",
            [],
        )
        .unwrap();

        assert!(
            conn.execute("UPDATE devices SET active = NULL WHERE id = 1", [])
                .is_err()
        );
        assert!(
            conn.execute("INSERT INTO measurements (device_id, co2) VALUES (1, 500)", [])
                .is_err()
        );
        assert!(
            conn.execute(
                "INSERT INTO measurements (device_id, timestamp) VALUES (1, '2024-01-01 00:00:00')",
                [],
            )
            .is_ok()
        );
    }
}
