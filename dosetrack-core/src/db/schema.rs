//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS medications (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        hour             INTEGER NOT NULL,
        minute           INTEGER NOT NULL,
        days             JSON NOT NULL,      -- array of weekday ints, 0=Sunday..6=Saturday
        icon             TEXT NOT NULL,
        created_at       DATETIME NOT NULL
    );

    -- At most one dose event per (medication, calendar day): the composite
    -- primary key turns a second same-day confirmation into an overwrite.
    CREATE TABLE IF NOT EXISTS dose_events (
        medication_id    TEXT NOT NULL,
        date             TEXT NOT NULL,      -- ISO calendar day, yyyy-mm-dd
        taken_at         DATETIME NOT NULL,
        ts               INTEGER NOT NULL,   -- milliseconds since epoch, for sorting

        PRIMARY KEY (medication_id, date)
    );

    CREATE TABLE IF NOT EXISTS settings (
        key              TEXT PRIMARY KEY,
        value            JSON NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_dose_events_date ON dose_events(date);
    CREATE INDEX IF NOT EXISTS idx_dose_events_ts ON dose_events(ts);
    CREATE INDEX IF NOT EXISTS idx_medications_created ON medications(created_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = ["medications", "dose_events", "settings"];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_dose_events_keyed_per_day() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = r#"
            INSERT INTO dose_events (medication_id, date, taken_at, ts)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(medication_id, date) DO UPDATE SET
                taken_at = excluded.taken_at,
                ts = excluded.ts
        "#;
        conn.execute(insert, ("m1", "2024-03-05", "2024-03-05T08:00:00Z", 1i64))
            .unwrap();
        conn.execute(insert, ("m1", "2024-03-05", "2024-03-05T09:00:00Z", 2i64))
            .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM dose_events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
