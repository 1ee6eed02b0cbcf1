//! Storage layer
//!
//! One [`EventStore`] contract, two backends: the indexed SQLite store
//! ([`SqliteStore`]) and the flat key-value fallback ([`KvStore`]). The
//! [`StorageAdapter`] picks a backend once at startup and is the only place
//! that knows which one is active; it also runs the one-time migration of
//! legacy key-value data into the SQLite store.

pub mod kv;
pub mod schema;
pub mod sqlite;

pub use kv::KvStore;
pub use sqlite::SqliteStore;

use crate::error::{Error, Result};
use crate::types::{
    DoseEvent, Medication, Setting, Snapshot, SETTING_ASSISTANT_SESSION, SETTING_PREMIUM,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;

/// Filter for dose-event queries. All fields optional; instant range is inclusive.
#[derive(Debug, Clone, Default)]
pub struct DoseFilter {
    /// Only events for this medication
    pub medication_id: Option<String>,
    /// Only events confirmed at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only events confirmed at or before this instant
    pub until: Option<DateTime<Utc>>,
}

/// Durable append/query store for medications, dose events and settings.
///
/// Every write is atomic at single-record granularity; a failed operation
/// did not take effect. Validation of record contents is the caller's
/// responsibility (the [`Medication`] constructor enforces it).
pub trait EventStore: Send + Sync {
    /// Insert or replace a medication by id.
    fn upsert_medication(&self, med: &Medication) -> Result<()>;

    /// Remove a medication and all dose events referencing it.
    /// Deleting a non-existent id is a no-op.
    fn delete_medication(&self, id: &str) -> Result<()>;

    /// All medications, order unspecified.
    fn list_medications(&self) -> Result<Vec<Medication>>;

    /// Record a confirmed intake. The calendar day is derived from the
    /// instant; a second confirmation on the same day overwrites.
    fn record_dose_taken(&self, medication_id: &str, at: DateTime<Utc>) -> Result<DoseEvent>;

    /// Dose events matching the filter, sorted by confirmation time.
    fn list_dose_events(&self, filter: &DoseFilter) -> Result<Vec<DoseEvent>>;

    /// Read a setting, `None` when unset.
    fn get_setting(&self, key: &str) -> Result<Option<Setting>>;

    /// Create or overwrite a setting.
    fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Destroy all medications, dose events and settings.
    fn clear_all(&self) -> Result<()>;

    /// Produce a complete serializable copy of all records.
    fn export_snapshot(&self) -> Result<Snapshot>;

    /// Replace all state with the snapshot's contents.
    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Which backend the adapter selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Indexed SQLite store (primary)
    Sqlite,
    /// Flat key-value store (fallback)
    KeyValue,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::KeyValue => "key_value",
        }
    }
}

/// Record counts plus backend kind, for diagnostics views.
#[derive(Debug, Clone)]
pub struct StorageInfo {
    /// Active backend
    pub backend: BackendKind,
    /// Whether the legacy migration ran during this startup
    pub migrated: bool,
    /// Number of stored medications
    pub medications: usize,
    /// Number of stored dose events
    pub dose_events: usize,
    /// Number of stored settings
    pub settings: usize,
}

/// Backend-selecting facade over the two [`EventStore`] implementations.
///
/// Callers never branch on backend kind; the adapter presents one interface
/// regardless of which store is active.
pub struct StorageAdapter {
    store: Box<dyn EventStore>,
    backend: BackendKind,
    migrated: bool,
}

impl StorageAdapter {
    /// Open the storage layer rooted at `data_dir`.
    ///
    /// Tries the SQLite backend first; on success, migrates any legacy
    /// key-value data into it. If SQLite cannot be opened, falls back to the
    /// key-value store and skips migration.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("data.db");
        let kv_path = data_dir.join("store.json");

        match SqliteStore::open(&db_path) {
            Ok(store) => {
                let migrated = match migrate_legacy(&kv_path, &store) {
                    Ok(migrated) => migrated,
                    Err(e) => {
                        // Legacy keys were left intact, so the next startup retries.
                        tracing::warn!(error = %e, "Legacy migration failed; will retry on next startup");
                        false
                    }
                };
                Ok(Self {
                    store: Box::new(store),
                    backend: BackendKind::Sqlite,
                    migrated,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Indexed store unavailable, using key-value fallback");
                let store = KvStore::open(&kv_path)?;
                Ok(Self {
                    store: Box::new(store),
                    backend: BackendKind::KeyValue,
                    migrated: false,
                })
            }
        }
    }

    /// In-memory adapter for tests.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Box::new(SqliteStore::open_in_memory()?),
            backend: BackendKind::Sqlite,
            migrated: false,
        })
    }

    /// Active backend kind.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Whether the legacy migration ran during this startup.
    pub fn migration_completed(&self) -> bool {
        self.migrated
    }

    /// All medications, order unspecified.
    pub fn medications(&self) -> Result<Vec<Medication>> {
        self.store.list_medications()
    }

    /// Insert or replace a medication.
    pub fn add_medication(&self, med: &Medication) -> Result<()> {
        tracing::debug!(id = med.id, name = med.name, "Saving medication");
        self.store.upsert_medication(med)
    }

    /// Delete a medication, cascading to its dose events.
    pub fn delete_medication(&self, id: &str) -> Result<()> {
        self.store.delete_medication(id)
    }

    /// Confirm a dose at the given instant.
    pub fn mark_taken(&self, medication_id: &str, at: DateTime<Utc>) -> Result<DoseEvent> {
        tracing::debug!(medication_id, at = %at, "Recording dose taken");
        self.store.record_dose_taken(medication_id, at)
    }

    /// Ids of medications with a dose event on `now`'s calendar day.
    pub fn taken_today(&self, now: DateTime<Utc>) -> Result<HashSet<String>> {
        let today = now.date_naive();
        let events = self.store.list_dose_events(&DoseFilter {
            since: today.and_hms_opt(0, 0, 0).map(|t| t.and_utc()),
            ..Default::default()
        })?;
        Ok(events
            .into_iter()
            .filter(|e| e.date == today)
            .map(|e| e.medication_id)
            .collect())
    }

    /// Dose events matching the filter.
    pub fn dose_events(&self, filter: &DoseFilter) -> Result<Vec<DoseEvent>> {
        self.store.list_dose_events(filter)
    }

    /// Read a setting, falling back to the given value when unset.
    pub fn get_setting(&self, key: &str, fallback: serde_json::Value) -> Result<serde_json::Value> {
        Ok(self
            .store
            .get_setting(key)?
            .map(|s| s.value)
            .unwrap_or(fallback))
    }

    /// Create or overwrite a setting.
    pub fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.store.set_setting(key, value)
    }

    /// Premium flag, defaulting to false.
    pub fn premium_status(&self) -> Result<bool> {
        Ok(self
            .get_setting(SETTING_PREMIUM, serde_json::json!(false))?
            .as_bool()
            .unwrap_or(false))
    }

    /// Set the premium flag.
    pub fn set_premium_status(&self, premium: bool) -> Result<()> {
        self.set_setting(SETTING_PREMIUM, serde_json::json!(premium))
    }

    /// Assistant session id, `None` when unset.
    pub fn assistant_session_id(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get_setting(SETTING_ASSISTANT_SESSION)?
            .and_then(|s| s.value.as_str().map(str::to_string)))
    }

    /// Set the assistant session id.
    pub fn set_assistant_session_id(&self, session_id: &str) -> Result<()> {
        self.set_setting(SETTING_ASSISTANT_SESSION, serde_json::json!(session_id))
    }

    /// Destroy all stored records. Only for explicit user-initiated reset.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear_all()
    }

    /// Export a complete snapshot of all records.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        self.store.export_snapshot()
    }

    /// Replace all state with the snapshot's contents.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.store.import_snapshot(snapshot)
    }

    /// Record counts and backend kind for diagnostics.
    pub fn storage_info(&self) -> Result<StorageInfo> {
        let snapshot = self.store.export_snapshot()?;
        Ok(StorageInfo {
            backend: self.backend,
            migrated: self.migrated,
            medications: snapshot.medications.len(),
            dose_events: snapshot.dose_events.len(),
            settings: snapshot.settings.len(),
        })
    }
}

/// Migrate legacy key-value data into the SQLite store.
///
/// Runs only when the key-value file exists and holds at least one legacy
/// key. Writes are upserts keyed by id or (medication, day), so a partial
/// earlier run is harmless. The legacy keys are deleted in a single final
/// step; any earlier failure leaves them intact for a retry on next startup.
///
/// Returns whether a migration was performed.
fn migrate_legacy(kv_path: &Path, store: &SqliteStore) -> Result<bool> {
    if !kv_path.exists() {
        return Ok(false);
    }

    let kv = KvStore::open(kv_path)?;
    if !kv.has_legacy_data() {
        tracing::debug!("No legacy key-value data to migrate");
        return Ok(false);
    }

    tracing::info!(path = %kv_path.display(), "Migrating legacy key-value data");

    let mut migrated_meds = 0usize;
    if let Some(value) = kv.raw_get(kv::KEY_MEDICATIONS) {
        let meds: Vec<Medication> = serde_json::from_value(value)
            .map_err(|e| Error::Migration(format!("invalid legacy medication list: {}", e)))?;
        for med in &meds {
            store.upsert_medication(med)?;
        }
        migrated_meds = meds.len();
    }

    let mut migrated_events = 0usize;
    if let Some(value) = kv.raw_get(kv::KEY_TAKEN) {
        if let Some(map) = value.as_object() {
            for (key, entry) in map {
                if let Some(event) = kv::decode_taken_entry(key, entry) {
                    store.record_dose_taken(&event.medication_id, event.taken_at)?;
                    migrated_events += 1;
                }
            }
        }
    }

    if let Some(value) = kv.raw_get(kv::KEY_PREMIUM) {
        store.set_setting(SETTING_PREMIUM, value)?;
    }
    if let Some(value) = kv.raw_get(kv::KEY_ASSISTANT_SESSION) {
        store.set_setting(SETTING_ASSISTANT_SESSION, value)?;
    }

    // Settings written by a previous fallback run ride along
    let mut carried_settings = false;
    if let Some(value) = kv.raw_get(kv::KEY_SETTINGS) {
        let settings: std::collections::HashMap<String, Setting> = serde_json::from_value(value)
            .map_err(|e| Error::Migration(format!("invalid legacy settings map: {}", e)))?;
        for setting in settings.into_values() {
            store.set_setting(&setting.key, setting.value)?;
        }
        carried_settings = true;
    }

    // Last step: only reached when every write above succeeded
    let mut removed: Vec<&str> = kv::LEGACY_KEYS.to_vec();
    if carried_settings {
        removed.push(kv::KEY_SETTINGS);
    }
    kv.remove_keys(&removed)?;

    tracing::info!(
        medications = migrated_meds,
        dose_events = migrated_events,
        "Legacy migration complete"
    );
    Ok(true)
}
