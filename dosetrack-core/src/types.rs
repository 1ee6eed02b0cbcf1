//! Core domain types for dosetrack
//!
//! These types represent the canonical data model persisted by the storage
//! layer and consumed read-only by the analytics layer.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Medication** | A user-defined recurring intake with a time-of-day and weekday recurrence |
//! | **DoseEvent** | A record that a Medication was confirmed taken on a specific calendar day |
//! | **Setting** | A generic key/value pair (premium flag, assistant session id, ...) |
//! | **Snapshot** | A complete serializable copy of all persisted records |
//!
//! Calendar days are UTC calendar days (`NaiveDate`); instants are
//! `DateTime<Utc>`. Weekdays are encoded as integers 0=Sunday..6=Saturday.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Weekday display names, indexed 0=Sunday..6=Saturday.
pub const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Weekday index of a calendar day (0=Sunday..6=Saturday).
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

// ============================================
// Medication
// ============================================

/// Scheduled time-of-day for a medication (24h clock, no timezone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseTime {
    /// Hour, 0-23
    pub hour: u8,
    /// Minute, 0-59
    pub minute: u8,
}

impl DoseTime {
    /// Create a dose time, validating the 24h hour:minute pair.
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidMedication(format!(
                "invalid time of day: {:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Parse from an `"HH:MM"` string.
    pub fn parse(s: &str) -> Result<Self> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidMedication(format!("invalid time of day: {}", s)))?;
        let hour: u8 = h
            .parse()
            .map_err(|_| Error::InvalidMedication(format!("invalid hour: {}", h)))?;
        let minute: u8 = m
            .parse()
            .map_err(|_| Error::InvalidMedication(format!("invalid minute: {}", m)))?;
        Self::new(hour, minute)
    }
}

impl std::fmt::Display for DoseTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A user-defined recurring medication.
///
/// Never mutated in place: edits are delete + recreate. Deleting a medication
/// cascades deletion of all its dose events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Display name
    pub name: String,
    /// Scheduled time of day
    pub time: DoseTime,
    /// Weekdays on which this medication recurs (0=Sunday..6=Saturday, non-empty)
    pub days: BTreeSet<u8>,
    /// Display icon/glyph
    pub icon: String,
    /// When this medication was created (authoritative for lookback clipping)
    pub created_at: DateTime<Utc>,
}

impl Medication {
    /// Create a new medication with a fresh id and creation timestamp.
    ///
    /// Validates the recurrence set: non-empty, with values in 0..=6.
    pub fn new(
        name: impl Into<String>,
        time: DoseTime,
        days: BTreeSet<u8>,
        icon: impl Into<String>,
    ) -> Result<Self> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name, time, days, icon, Utc::now())
    }

    /// Create a medication with explicit id and creation instant.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        time: DoseTime,
        days: BTreeSet<u8>,
        icon: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if days.is_empty() {
            return Err(Error::InvalidMedication(
                "weekday recurrence set must not be empty".to_string(),
            ));
        }
        if let Some(day) = days.iter().find(|d| **d > 6) {
            return Err(Error::InvalidMedication(format!(
                "weekday out of range 0..=6: {}",
                day
            )));
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            time,
            days,
            icon: icon.into(),
            created_at,
        })
    }

    /// Whether this medication is due on the given calendar day.
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        self.days.contains(&weekday_index(date))
    }
}

// ============================================
// DoseEvent
// ============================================

/// One confirmed intake of a medication.
///
/// Keyed by `(medication_id, date)`: confirming twice on the same calendar
/// day overwrites rather than duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    /// Medication this event references
    pub medication_id: String,
    /// Calendar day derived from the confirmation instant
    pub date: NaiveDate,
    /// Exact confirmation instant
    pub taken_at: DateTime<Utc>,
    /// Derived numeric timestamp (milliseconds since epoch) for sorting
    pub timestamp: i64,
}

impl DoseEvent {
    /// Build a dose event from a confirmation instant.
    pub fn at(medication_id: impl Into<String>, instant: DateTime<Utc>) -> Self {
        Self {
            medication_id: medication_id.into(),
            date: instant.date_naive(),
            taken_at: instant,
            timestamp: instant.timestamp_millis(),
        }
    }

    /// Storage key in the `"<date>_<medicationId>"` format.
    pub fn key(&self) -> String {
        format!("{}_{}", self.date.format("%Y-%m-%d"), self.medication_id)
    }
}

// ============================================
// Setting
// ============================================

/// Generic key/value setting with a last-updated timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Setting key
    pub key: String,
    /// Arbitrary JSON value
    pub value: serde_json::Value,
    /// When this setting was last written
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    /// Create a setting stamped with the current instant.
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            updated_at: Utc::now(),
        }
    }
}

/// Setting key for the premium flag.
pub const SETTING_PREMIUM: &str = "premium_status";
/// Setting key for the assistant session id.
pub const SETTING_ASSISTANT_SESSION: &str = "assistant_session_id";

// ============================================
// Snapshot
// ============================================

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// A complete serializable copy of all persisted records.
///
/// Import fully replaces existing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// All medication definitions
    pub medications: Vec<Medication>,
    /// All dose-taken events
    pub dose_events: Vec<DoseEvent>,
    /// All settings
    pub settings: Vec<Setting>,
    /// When the snapshot was produced (RFC 3339)
    pub exported_at: DateTime<Utc>,
    /// Format version tag
    pub format_version: u32,
}

impl Snapshot {
    /// Reject snapshots written by a newer format.
    pub fn check_version(&self) -> Result<()> {
        if self.format_version > SNAPSHOT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported snapshot format version {} (max {})",
                self.format_version, SNAPSHOT_VERSION
            )));
        }
        Ok(())
    }
}
