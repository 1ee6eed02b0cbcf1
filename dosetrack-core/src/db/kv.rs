//! Flat key-value backend
//!
//! The fallback store when the indexed SQLite backend cannot be opened. It is
//! a single JSON document on disk holding a small set of well-known keys, and
//! doubles as the migration source for data written by older app versions.
//!
//! Layout of the document:
//! - `medications`: JSON array of [`Medication`]
//! - `taken`: map from `"<date>_<medicationId>"` to either the legacy boolean
//!   `true` or a full [`DoseEvent`] object (both are readable)
//! - `premium`: legacy boolean premium flag
//! - `assistant_session`: legacy assistant session id string
//! - `settings`: map from key to [`Setting`]

use crate::db::{DoseFilter, EventStore};
use crate::error::{Error, Result};
use crate::types::{DoseEvent, Medication, Setting, Snapshot, SNAPSHOT_VERSION};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key holding the medication list.
pub const KEY_MEDICATIONS: &str = "medications";
/// Key holding the taken-events map.
pub const KEY_TAKEN: &str = "taken";
/// Legacy key holding the boolean premium flag.
pub const KEY_PREMIUM: &str = "premium";
/// Legacy key holding the assistant session id.
pub const KEY_ASSISTANT_SESSION: &str = "assistant_session";
/// Key holding the settings map.
pub const KEY_SETTINGS: &str = "settings";

/// The keys a legacy installation may have written.
pub const LEGACY_KEYS: [&str; 4] = [KEY_MEDICATIONS, KEY_TAKEN, KEY_PREMIUM, KEY_ASSISTANT_SESSION];

/// Decode one entry of the taken-events map.
///
/// Legacy entries are `"<date>_<medicationId>": true`; the reconstructed
/// event is dated at midnight UTC of the parsed day. Modern entries carry the
/// full event object. Returns `None` for entries that decode as neither.
pub fn decode_taken_entry(key: &str, value: &Value) -> Option<DoseEvent> {
    if let Ok(event) = serde_json::from_value::<DoseEvent>(value.clone()) {
        return Some(event);
    }
    if value.as_bool() != Some(true) {
        return None;
    }
    let (date_str, medication_id) = key.split_once('_')?;
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
    let taken_at = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some(DoseEvent {
        medication_id: medication_id.to_string(),
        date,
        taken_at,
        timestamp: taken_at.timestamp_millis(),
    })
}

/// Key-value backed event store
pub struct KvStore {
    path: PathBuf,
    data: Mutex<HashMap<String, Value>>,
}

impl KvStore {
    /// Open or create a key-value store file at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("corrupt key-value store {:?}: {}", path, e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    /// Write the whole document atomically (temp file + rename).
    fn persist(&self, data: &HashMap<String, Value>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(data)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Whether any legacy key is present (used to decide if migration runs).
    pub fn has_legacy_data(&self) -> bool {
        let data = self.data.lock().unwrap();
        LEGACY_KEYS.iter().any(|k| data.contains_key(*k))
    }

    /// Raw read of a single key.
    pub fn raw_get(&self, key: &str) -> Option<Value> {
        self.data.lock().unwrap().get(key).cloned()
    }

    /// Remove the given keys and persist once. Used after a successful
    /// migration; leaving this as the final step keeps migration retryable.
    pub fn remove_keys(&self, keys: &[&str]) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        for key in keys {
            data.remove(*key);
        }
        self.persist(&data)
    }

    fn medications_from(data: &HashMap<String, Value>) -> Result<Vec<Medication>> {
        match data.get(KEY_MEDICATIONS) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Vec::new()),
        }
    }

    fn taken_from(data: &HashMap<String, Value>) -> HashMap<String, Value> {
        data.get(KEY_TAKEN)
            .and_then(|v| v.as_object().cloned())
            .map(|m| m.into_iter().collect())
            .unwrap_or_default()
    }

    fn settings_from(data: &HashMap<String, Value>) -> Result<HashMap<String, Setting>> {
        match data.get(KEY_SETTINGS) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(HashMap::new()),
        }
    }
}

impl EventStore for KvStore {
    fn upsert_medication(&self, med: &Medication) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let mut meds = Self::medications_from(&data)?;
        match meds.iter_mut().find(|m| m.id == med.id) {
            Some(existing) => *existing = med.clone(),
            None => meds.push(med.clone()),
        }
        data.insert(KEY_MEDICATIONS.to_string(), serde_json::to_value(&meds)?);
        self.persist(&data)
    }

    fn delete_medication(&self, id: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let mut meds = Self::medications_from(&data)?;
        meds.retain(|m| m.id != id);
        data.insert(KEY_MEDICATIONS.to_string(), serde_json::to_value(&meds)?);

        // Cascade: drop this medication's taken entries
        let suffix = format!("_{}", id);
        let mut taken = Self::taken_from(&data);
        taken.retain(|key, _| !key.ends_with(&suffix));
        data.insert(KEY_TAKEN.to_string(), serde_json::to_value(&taken)?);
        self.persist(&data)
    }

    fn list_medications(&self) -> Result<Vec<Medication>> {
        let data = self.data.lock().unwrap();
        Self::medications_from(&data)
    }

    fn record_dose_taken(&self, medication_id: &str, at: DateTime<Utc>) -> Result<DoseEvent> {
        let event = DoseEvent::at(medication_id, at);
        let mut data = self.data.lock().unwrap();
        let mut taken = Self::taken_from(&data);
        taken.insert(event.key(), serde_json::to_value(&event)?);
        data.insert(KEY_TAKEN.to_string(), serde_json::to_value(&taken)?);
        self.persist(&data)?;
        Ok(event)
    }

    fn list_dose_events(&self, filter: &DoseFilter) -> Result<Vec<DoseEvent>> {
        let data = self.data.lock().unwrap();
        let taken = Self::taken_from(&data);

        let mut events: Vec<DoseEvent> = taken
            .iter()
            .filter_map(|(key, value)| decode_taken_entry(key, value))
            .filter(|e| {
                filter
                    .medication_id
                    .as_ref()
                    .map_or(true, |id| &e.medication_id == id)
                    && filter.since.map_or(true, |since| e.taken_at >= since)
                    && filter.until.map_or(true, |until| e.taken_at <= until)
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let data = self.data.lock().unwrap();
        Ok(Self::settings_from(&data)?.remove(key))
    }

    fn set_setting(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let mut settings = Self::settings_from(&data)?;
        settings.insert(key.to_string(), Setting::new(key, value));
        data.insert(KEY_SETTINGS.to_string(), serde_json::to_value(&settings)?);
        self.persist(&data)
    }

    fn clear_all(&self) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.clear();
        tracing::info!("Cleared all records");
        self.persist(&data)
    }

    fn export_snapshot(&self) -> Result<Snapshot> {
        let medications = self.list_medications()?;
        let dose_events = self.list_dose_events(&DoseFilter::default())?;
        let settings = {
            let data = self.data.lock().unwrap();
            let mut settings: Vec<Setting> = Self::settings_from(&data)?.into_values().collect();
            settings.sort_by(|a, b| a.key.cmp(&b.key));
            settings
        };

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

        let mut data = self.data.lock().unwrap();
        data.insert(
            KEY_MEDICATIONS.to_string(),
            serde_json::to_value(&snapshot.medications)?,
        );

        let mut taken: HashMap<String, Value> = HashMap::new();
        for event in &snapshot.dose_events {
            taken.insert(event.key(), serde_json::to_value(event)?);
        }
        data.insert(KEY_TAKEN.to_string(), serde_json::to_value(&taken)?);

        let settings: HashMap<String, Setting> = snapshot
            .settings
            .iter()
            .map(|s| (s.key.clone(), s.clone()))
            .collect();
        data.insert(KEY_SETTINGS.to_string(), serde_json::to_value(&settings)?);
        self.persist(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DoseTime;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> KvStore {
        KvStore::open(&dir.path().join("store.json")).unwrap()
    }

    fn med(name: &str) -> Medication {
        Medication::new(
            name,
            DoseTime::new(9, 0).unwrap(),
            BTreeSet::from([1, 2, 3]),
            "pill",
        )
        .unwrap()
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let m = med("Aspirin");
        {
            let kv = store(&dir);
            kv.upsert_medication(&m).unwrap();
            kv.record_dose_taken(&m.id, "2024-03-05T09:10:00Z".parse().unwrap())
                .unwrap();
        }

        let kv = store(&dir);
        assert_eq!(kv.list_medications().unwrap().len(), 1);
        assert_eq!(kv.list_dose_events(&DoseFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_same_day_dose_overwrites() {
        let dir = TempDir::new().unwrap();
        let kv = store(&dir);
        let m = med("Aspirin");
        kv.upsert_medication(&m).unwrap();
        kv.record_dose_taken(&m.id, "2024-03-05T09:00:00Z".parse().unwrap())
            .unwrap();
        kv.record_dose_taken(&m.id, "2024-03-05T21:00:00Z".parse().unwrap())
            .unwrap();

        let events = kv.list_dose_events(&DoseFilter::default()).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_delete_cascades() {
        let dir = TempDir::new().unwrap();
        let kv = store(&dir);
        let m = med("Aspirin");
        let other = med("Vitamin D");
        kv.upsert_medication(&m).unwrap();
        kv.upsert_medication(&other).unwrap();
        kv.record_dose_taken(&m.id, "2024-03-05T09:00:00Z".parse().unwrap())
            .unwrap();
        kv.record_dose_taken(&other.id, "2024-03-05T09:00:00Z".parse().unwrap())
            .unwrap();

        kv.delete_medication(&m.id).unwrap();
        let events = kv.list_dose_events(&DoseFilter::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].medication_id, other.id);
    }

    #[test]
    fn test_decode_legacy_boolean_entry() {
        let event =
            decode_taken_entry("2024-03-05_med-1", &serde_json::json!(true)).expect("decodes");
        assert_eq!(event.medication_id, "med-1");
        assert_eq!(event.date.to_string(), "2024-03-05");
        assert_eq!(event.taken_at.to_rfc3339(), "2024-03-05T00:00:00+00:00");

        assert!(decode_taken_entry("2024-03-05_med-1", &serde_json::json!(false)).is_none());
        assert!(decode_taken_entry("garbage", &serde_json::json!(true)).is_none());
    }

    #[test]
    fn test_legacy_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            serde_json::json!({ "premium": true }).to_string(),
        )
        .unwrap();

        let kv = KvStore::open(&path).unwrap();
        assert!(kv.has_legacy_data());
        kv.remove_keys(&[KEY_PREMIUM]).unwrap();
        assert!(!kv.has_legacy_data());

        // Removal survives reopen
        let kv = KvStore::open(&path).unwrap();
        assert!(!kv.has_legacy_data());
    }
}
