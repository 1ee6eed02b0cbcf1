//! Reminder scheduling seam
//!
//! The delivery mechanism (notifications, alarms, whatever the host app
//! uses) lives behind the [`ReminderScheduler`] trait; this module only
//! computes when a medication is next due and keeps one pending reminder
//! per medication.

use crate::error::Result;
use crate::types::Medication;
use chrono::{DateTime, Days, Utc};

/// A request to alert the user at a specific instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderRequest {
    pub medication_id: String,
    pub medication_name: String,
    pub fire_at: DateTime<Utc>,
}

/// Delivery-side collaborator. Implementations are expected to replace an
/// existing reminder when `schedule` is called again for the same
/// medication.
pub trait ReminderScheduler {
    fn schedule(&mut self, request: ReminderRequest) -> Result<()>;
    fn cancel(&mut self, medication_id: &str) -> Result<()>;
}

/// Next instant this medication is due, strictly after `now`.
///
/// Today's dose counts if its scheduled time is still ahead; otherwise the
/// scan moves to the next recurring weekday. Returns `None` only if no due
/// day exists within a week, which a validated medication (non-empty
/// weekday set) cannot produce.
pub fn next_occurrence(med: &Medication, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    for offset in 0..=7u64 {
        let day = today.checked_add_days(Days::new(offset))?;
        if !med.is_due_on(day) {
            continue;
        }
        let fire_at = day
            .and_hms_opt(med.time.hour as u32, med.time.minute as u32, 0)?
            .and_utc();
        if fire_at > now {
            return Some(fire_at);
        }
    }
    None
}

/// Replace the pending reminder for every medication with one at its next
/// occurrence.
pub fn sync_reminders(
    scheduler: &mut dyn ReminderScheduler,
    meds: &[Medication],
    now: DateTime<Utc>,
) -> Result<()> {
    for med in meds {
        scheduler.cancel(&med.id)?;
        let Some(fire_at) = next_occurrence(med, now) else {
            continue;
        };
        tracing::debug!(medication = med.name, %fire_at, "Scheduling reminder");
        scheduler.schedule(ReminderRequest {
            medication_id: med.id.clone(),
            medication_name: med.name.clone(),
            fire_at,
        })?;
    }
    Ok(())
}
