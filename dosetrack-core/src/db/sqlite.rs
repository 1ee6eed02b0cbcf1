//! SQLite backend for the event store
//!
//! This is the primary, indexed backend. Records are mapped to rows the same
//! way throughout: RFC 3339 strings for instants, ISO calendar days for
//! dates, JSON for the weekday set and setting values.

use crate::db::{DoseFilter, EventStore};
use crate::error::{Error, Result};
use crate::types::{DoseEvent, Medication, Setting, Snapshot, SNAPSHOT_VERSION};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed event store (single connection)
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    fn row_to_medication(row: &Row) -> rusqlite::Result<Medication> {
        let days_str: String = row.get("days")?;
        let created_at_str: String = row.get("created_at")?;
        let hour: u8 = row.get("hour")?;
        let minute: u8 = row.get("minute")?;

        Ok(Medication {
            id: row.get("id")?,
            name: row.get("name")?,
            time: crate::types::DoseTime { hour, minute },
            days: serde_json::from_str::<BTreeSet<u8>>(&days_str).unwrap_or_default(),
            icon: row.get("icon")?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_dose_event(row: &Row) -> rusqlite::Result<DoseEvent> {
        let date_str: String = row.get("date")?;
        let taken_at_str: String = row.get("taken_at")?;

        Ok(DoseEvent {
            medication_id: row.get("medication_id")?,
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .unwrap_or_else(|_| Utc::now().date_naive()),
            taken_at: DateTime::parse_from_rfc3339(&taken_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            timestamp: row.get("ts")?,
        })
    }

    fn row_to_setting(row: &Row) -> rusqlite::Result<Setting> {
        let value_str: String = row.get("value")?;
        let updated_at_str: String = row.get("updated_at")?;

        Ok(Setting {
            key: row.get("key")?,
            value: serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn insert_dose_event(conn: &Connection, event: &DoseEvent) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO dose_events (medication_id, date, taken_at, ts)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(medication_id, date) DO UPDATE SET
                taken_at = excluded.taken_at,
                ts = excluded.ts
            "#,
            params![
                event.medication_id,
                event.date.format("%Y-%m-%d").to_string(),
                event.taken_at.to_rfc3339(),
                event.timestamp,
            ],
        )?;
        Ok(())
    }

    fn insert_medication(conn: &Connection, med: &Medication) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO medications (id, name, hour, minute, days, icon, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                hour = excluded.hour,
                minute = excluded.minute,
                days = excluded.days,
                icon = excluded.icon,
                created_at = excluded.created_at
            "#,
            params![
                med.id,
                med.name,
                med.time.hour,
                med.time.minute,
                serde_json::to_string(&med.days)?,
                med.icon,
                med.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_setting(conn: &Connection, setting: &Setting) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![
                setting.key,
                setting.value.to_string(),
                setting.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl EventStore for SqliteStore {
    fn upsert_medication(&self, med: &Medication) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_medication(&conn, med)
    }

    fn delete_medication(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let events = tx.execute("DELETE FROM dose_events WHERE medication_id = ?", [id])?;
        let meds = tx.execute("DELETE FROM medications WHERE id = ?", [id])?;
        tx.commit()?;
        tracing::debug!(id, meds, events, "Deleted medication with cascade");
        Ok(())
    }

    fn list_medications(&self) -> Result<Vec<Medication>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM medications")?;
        let meds = stmt
            .query_map([], Self::row_to_medication)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(meds)
    }

    fn record_dose_taken(&self, medication_id: &str, at: DateTime<Utc>) -> Result<DoseEvent> {
        let event = DoseEvent::at(medication_id, at);
        let conn = self.conn.lock().unwrap();
        Self::insert_dose_event(&conn, &event)?;
        Ok(event)
    }

    fn list_dose_events(&self, filter: &DoseFilter) -> Result<Vec<DoseEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT * FROM dose_events WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(id) = &filter.medication_id {
            sql.push_str(" AND medication_id = ?");
            params.push(Box::new(id.clone()));
        }
        if let Some(since) = &filter.since {
            sql.push_str(" AND ts >= ?");
            params.push(Box::new(since.timestamp_millis()));
        }
        if let Some(until) = &filter.until {
            sql.push_str(" AND ts <= ?");
            params.push(Box::new(until.timestamp_millis()));
        }
        sql.push_str(" ORDER BY ts");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_refs.as_slice(), Self::row_to_dose_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM settings WHERE key = ?",
            [key],
            Self::row_to_setting,
        )
        .optional()
        .map_err(Error::from)
    }

    fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_setting(&conn, &Setting::new(key, value))
    }

    fn clear_all(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM dose_events", [])?;
        tx.execute("DELETE FROM medications", [])?;
        tx.execute("DELETE FROM settings", [])?;
        tx.commit()?;
        tracing::info!("Cleared all records");
        Ok(())
    }

    fn export_snapshot(&self) -> Result<Snapshot> {
        let medications = self.list_medications()?;
        let dose_events = self.list_dose_events(&DoseFilter::default())?;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM settings")?;
        let settings = stmt
            .query_map([], Self::row_to_setting)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Snapshot {
            medications,
            dose_events,
            settings,
            exported_at: Utc::now(),
            format_version: SNAPSHOT_VERSION,
        })
    }

    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.check_version()?;
        self.clear_all()?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for med in &snapshot.medications {
            Self::insert_medication(&tx, med)?;
        }
        for event in &snapshot.dose_events {
            Self::insert_dose_event(&tx, event)?;
        }
        for setting in &snapshot.settings {
            Self::insert_setting(&tx, setting)?;
        }
        tx.commit()?;

        tracing::info!(
            medications = snapshot.medications.len(),
            dose_events = snapshot.dose_events.len(),
            settings = snapshot.settings.len(),
            "Imported snapshot"
        );
        Ok(())
    }
}
