//! Adherence statistics
//!
//! Pure, read-only computations over a snapshot of medications and dose
//! events. Every function takes the current instant explicitly so results
//! are deterministic and testable; nothing here touches storage or a clock.

use crate::types::{weekday_index, DoseEvent, DoseTime, Medication, WEEKDAY_NAMES};
use chrono::{DateTime, Days, Duration, NaiveDate, Timelike, Utc};
use std::collections::{HashMap, HashSet};

/// Adherence statistics for one medication over a lookback window.
#[derive(Debug, Clone)]
pub struct MedicationStats {
    /// Medication id
    pub medication_id: String,
    /// Display name, carried for message templating
    pub name: String,
    /// Dose events within the window
    pub taken: u32,
    /// Expected doses within the window, clipped to the creation day
    pub expected: u32,
    /// `min(100, taken / expected * 100)`, 100 when nothing was expected
    pub adherence_rate: u32,
    /// `max(0, expected - taken)`; forced to 0 for medications added
    /// today or yesterday
    pub missed_days: u32,
    /// Whole days since the medication was created, capped at the window
    pub days_since_added: u32,
    /// Most recent confirmation within the window
    pub last_taken: Option<DateTime<Utc>>,
    /// Raised when adherence < 80% outside the new-medication grace period
    pub concern: bool,
}

/// Aggregate adherence over a lookback window.
#[derive(Debug, Clone, Default)]
pub struct AdherenceReport {
    /// Window length in days
    pub window_days: u32,
    /// Number of medications
    pub total_medications: usize,
    /// All dose events within the window, across medications
    pub total_taken: u32,
    /// `round(total_taken / Σ expected * 100)`, 100 when nothing was expected
    pub adherence_rate: u32,
    /// Sum of per-medication missed days
    pub missed_doses: u32,
    /// Per-medication breakdown
    pub per_medication: Vec<MedicationStats>,
}

impl AdherenceReport {
    /// Medications whose concern flag is raised.
    pub fn concerns(&self) -> impl Iterator<Item = &MedicationStats> {
        self.per_medication.iter().filter(|s| s.concern)
    }
}

/// Expected dose count for a medication over the trailing `days` calendar
/// days (day 0 = `today`): the number of those days whose weekday is in the
/// recurrence set.
pub fn expected_doses(med: &Medication, days: u32, today: NaiveDate) -> u32 {
    (0..days)
        .filter_map(|i| today.checked_sub_days(Days::new(i as u64)))
        .filter(|day| med.is_due_on(*day))
        .count() as u32
}

/// Compute the adherence report over the trailing `window_days`.
///
/// Expected doses are clipped so a medication is never held to days before
/// it existed: the effective lookback per medication is
/// `max(1, min(window_days, days_since_added))`.
pub fn adherence_report(
    meds: &[Medication],
    events: &[DoseEvent],
    window_days: u32,
    now: DateTime<Utc>,
) -> AdherenceReport {
    let today = now.date_naive();
    let cutoff = now - Duration::days(window_days as i64);
    let recent: Vec<&DoseEvent> = events.iter().filter(|e| e.taken_at >= cutoff).collect();

    let mut per_medication = Vec::with_capacity(meds.len());
    let mut total_expected = 0u32;
    let mut total_missed = 0u32;

    for med in meds {
        let history: Vec<&&DoseEvent> = recent
            .iter()
            .filter(|e| e.medication_id == med.id)
            .collect();
        let taken = history.len() as u32;

        let days_since_added = (now - med.created_at)
            .num_days()
            .clamp(0, window_days as i64) as u32;
        let effective_days = days_since_added.max(1);

        let expected = expected_doses(med, effective_days, today);
        let adherence_rate = if expected > 0 {
            ((taken as f64 / expected as f64) * 100.0).round().min(100.0) as u32
        } else {
            100
        };

        // Grace period: a medication added today or yesterday is never "missed"
        let missed_days = if days_since_added > 1 {
            expected.saturating_sub(taken)
        } else {
            0
        };

        total_expected += expected;
        total_missed += missed_days;

        per_medication.push(MedicationStats {
            medication_id: med.id.clone(),
            name: med.name.clone(),
            taken,
            expected,
            adherence_rate,
            missed_days,
            days_since_added,
            last_taken: history.iter().map(|e| e.taken_at).max(),
            concern: adherence_rate < 80 && days_since_added > 1,
        });
    }

    let total_taken = recent.len() as u32;
    let adherence_rate = if total_expected > 0 {
        ((total_taken as f64 / total_expected as f64) * 100.0).round() as u32
    } else {
        100
    };

    AdherenceReport {
        window_days,
        total_medications: meds.len(),
        total_taken,
        adherence_rate,
        missed_doses: total_missed,
        per_medication,
    }
}

/// Consecutive qualifying days ending today, walking backward up to
/// `scan_days`.
///
/// A day qualifies only if at least one medication recurs on its weekday and
/// every such medication has a dose event dated that day. The scan stops at
/// the first failing day, so an incomplete today yields 0.
pub fn consecutive_day_streak(
    meds: &[Medication],
    events: &[DoseEvent],
    now: DateTime<Utc>,
    scan_days: u32,
) -> u32 {
    if meds.is_empty() {
        return 0;
    }

    let today = now.date_naive();
    let mut taken_by_day: HashMap<NaiveDate, HashSet<&str>> = HashMap::new();
    for event in events {
        taken_by_day
            .entry(event.date)
            .or_default()
            .insert(event.medication_id.as_str());
    }

    let mut streak = 0;
    for i in 0..scan_days {
        let Some(day) = today.checked_sub_days(Days::new(i as u64)) else {
            break;
        };
        let required: Vec<&Medication> = meds.iter().filter(|m| m.is_due_on(day)).collect();
        if required.is_empty() {
            break;
        }
        let taken = taken_by_day.get(&day);
        let all_taken = required
            .iter()
            .all(|m| taken.is_some_and(|set| set.contains(m.id.as_str())));
        if !all_taken {
            break;
        }
        streak += 1;
    }
    streak
}

// ============================================
// Behavioral patterns
// ============================================

/// Fixed time-of-day buckets for confirmation instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSlot {
    /// [06:00, 12:00)
    Morning,
    /// [12:00, 17:00)
    Afternoon,
    /// [17:00, 21:00)
    Evening,
    /// [21:00, 06:00)
    Night,
}

impl TimeSlot {
    /// Bucket for an hour of day (0-23).
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeSlot::Morning,
            12..=16 => TimeSlot::Afternoon,
            17..=20 => TimeSlot::Evening,
            _ => TimeSlot::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "Morning",
            TimeSlot::Afternoon => "Afternoon",
            TimeSlot::Evening => "Evening",
            TimeSlot::Night => "Night",
        }
    }
}

/// One recorded timing deviation (more than 30 minutes off schedule).
#[derive(Debug, Clone)]
pub struct TimingDelay {
    /// Medication name
    pub medication_name: String,
    /// Scheduled time of day
    pub scheduled: DoseTime,
    /// Actual confirmation instant
    pub actual: DateTime<Utc>,
    /// Signed minutes between confirmation and schedule
    pub delay_minutes: i64,
}

/// Behavioral patterns across all dose history.
#[derive(Debug, Clone, Default)]
pub struct DosePatterns {
    /// Confirmation counts per time-of-day bucket
    pub time_of_day: HashMap<TimeSlot, u32>,
    /// Confirmation counts per weekday name ("Sun".."Sat")
    pub day_of_week: HashMap<&'static str, u32>,
    /// Deviations exceeding 30 minutes off schedule
    pub delays: Vec<TimingDelay>,
    /// Share of all scheduled doses confirmed within 15 minutes, 0-100.
    /// Computed over the full delay distribution, not only the recorded
    /// `delays` entries, so an always-punctual user scores 100.
    pub time_consistency: u32,
}

impl DosePatterns {
    /// Bucket count, 0 when empty.
    pub fn slot_count(&self, slot: TimeSlot) -> u32 {
        self.time_of_day.get(&slot).copied().unwrap_or(0)
    }

    /// Weekday tally, 0 when empty.
    pub fn day_count(&self, day: &str) -> u32 {
        self.day_of_week.get(day).copied().unwrap_or(0)
    }

    /// Bucket with the most confirmations, Morning when there is no history.
    pub fn preferred_time_slot(&self) -> TimeSlot {
        self.time_of_day
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(slot, _)| *slot)
            .unwrap_or(TimeSlot::Morning)
    }

    /// Weekday with the most confirmations, "Mon" when there is no history.
    pub fn most_active_day(&self) -> &'static str {
        self.day_of_week
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(day, _)| *day)
            .unwrap_or("Mon")
    }
}

/// Compute behavioral patterns across all history.
///
/// Timing deltas compare each confirmation against the medication's
/// scheduled hour:minute on the event's calendar day. Events whose
/// medication no longer exists contribute to the bucket tallies but not to
/// timing statistics.
pub fn dose_patterns(meds: &[Medication], events: &[DoseEvent]) -> DosePatterns {
    let by_id: HashMap<&str, &Medication> = meds.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut patterns = DosePatterns::default();
    let mut on_time = 0u32;
    let mut measured = 0u32;

    for event in events {
        let slot = TimeSlot::from_hour(event.taken_at.hour());
        *patterns.time_of_day.entry(slot).or_insert(0) += 1;

        let day_name = WEEKDAY_NAMES[weekday_index(event.taken_at.date_naive()) as usize];
        *patterns.day_of_week.entry(day_name).or_insert(0) += 1;

        let Some(med) = by_id.get(event.medication_id.as_str()) else {
            continue;
        };
        let Some(scheduled) = event
            .date
            .and_hms_opt(med.time.hour as u32, med.time.minute as u32, 0)
        else {
            continue;
        };
        let delay_minutes = (event.taken_at - scheduled.and_utc()).num_minutes();

        measured += 1;
        if delay_minutes.abs() <= 15 {
            on_time += 1;
        }
        if delay_minutes.abs() > 30 {
            patterns.delays.push(TimingDelay {
                medication_name: med.name.clone(),
                scheduled: med.time,
                actual: event.taken_at,
                delay_minutes,
            });
        }
    }

    patterns.time_consistency = if measured > 0 {
        ((on_time as f64 / measured as f64) * 100.0).round() as u32
    } else {
        100
    };
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn daily_med(name: &str, hour: u8, created_at: DateTime<Utc>) -> Medication {
        Medication::with_id(
            format!("id-{}", name),
            name,
            DoseTime::new(hour, 0).unwrap(),
            BTreeSet::from([0, 1, 2, 3, 4, 5, 6]),
            "pill",
            created_at,
        )
        .unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_expected_doses_counts_recurrence_days() {
        // 2024-03-05 is a Tuesday
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let med = Medication::with_id(
            "m",
            "Aspirin",
            DoseTime::new(8, 0).unwrap(),
            BTreeSet::from([2]), // Tuesdays only
            "pill",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(expected_doses(&med, 1, today), 1);
        assert_eq!(expected_doses(&med, 7, today), 1);
        assert_eq!(expected_doses(&med, 14, today), 2);
    }

    #[test]
    fn test_expected_doses_monotone_in_window() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let med = daily_med("Aspirin", 8, Utc::now());
        let mut prev = 0;
        for days in 1..60 {
            let count = expected_doses(&med, days, today);
            assert!(count >= prev);
            prev = count;
        }
    }

    #[test]
    fn test_adherence_clipped_to_100() {
        let now = ts("2024-03-05T12:00:00Z");
        // Recurs only on Tuesdays, but taken every day of the past week
        let med = Medication::with_id(
            "m",
            "Aspirin",
            DoseTime::new(8, 0).unwrap(),
            BTreeSet::from([2]),
            "pill",
            now - Duration::days(7),
        )
        .unwrap();
        let events: Vec<DoseEvent> = (0..7)
            .map(|i| DoseEvent::at("m", now - Duration::days(i)))
            .collect();

        let report = adherence_report(&[med], &events, 30, now);
        assert_eq!(report.per_medication[0].adherence_rate, 100);
    }

    #[test]
    fn test_lookback_clipped_to_creation() {
        let now = ts("2024-03-05T12:00:00Z");
        let med = daily_med("Aspirin", 8, now - Duration::days(2));
        let events = vec![
            DoseEvent::at("id-Aspirin", now - Duration::days(1)),
            DoseEvent::at("id-Aspirin", now),
        ];

        let report = adherence_report(&[med], &events, 30, now);
        let stats = &report.per_medication[0];
        assert_eq!(stats.days_since_added, 2);
        assert_eq!(stats.expected, 2);
        assert_eq!(stats.adherence_rate, 100);
        assert!(!stats.concern);
    }

    #[test]
    fn test_new_medication_grace_period() {
        let now = ts("2024-03-05T12:00:00Z");
        // Added today, nothing taken yet
        let med = daily_med("Aspirin", 8, now);
        let report = adherence_report(&[med], &[], 30, now);
        let stats = &report.per_medication[0];

        assert_eq!(stats.adherence_rate, 0);
        assert_eq!(stats.missed_days, 0);
        assert!(!stats.concern, "new medications get a grace period");
    }

    #[test]
    fn test_concern_raised_after_grace_period() {
        let now = ts("2024-03-05T12:00:00Z");
        let med = daily_med("Aspirin", 8, now - Duration::days(10));
        let report = adherence_report(&[med], &[], 30, now);
        let stats = &report.per_medication[0];

        assert_eq!(stats.expected, 10);
        assert_eq!(stats.missed_days, 10);
        assert!(stats.concern);
    }

    #[test]
    fn test_overall_rate_defaults_to_100() {
        let now = ts("2024-03-05T12:00:00Z");
        let report = adherence_report(&[], &[], 30, now);
        assert_eq!(report.adherence_rate, 100);
        assert_eq!(report.total_taken, 0);
        assert_eq!(report.missed_doses, 0);
    }

    #[test]
    fn test_streak_counts_back_from_today() {
        let now = ts("2024-03-05T12:00:00Z");
        let med = daily_med("Vitamin D", 8, now - Duration::days(20));
        // Taken today, yesterday and the day before; missing 3 days ago
        let events = vec![
            DoseEvent::at("id-Vitamin D", now),
            DoseEvent::at("id-Vitamin D", now - Duration::days(1)),
            DoseEvent::at("id-Vitamin D", now - Duration::days(2)),
            DoseEvent::at("id-Vitamin D", now - Duration::days(4)),
        ];

        assert_eq!(consecutive_day_streak(&[med], &events, now, 30), 3);
    }

    #[test]
    fn test_streak_zero_when_today_incomplete() {
        let now = ts("2024-03-05T12:00:00Z");
        let med = daily_med("Vitamin D", 8, now - Duration::days(20));
        let events = vec![
            DoseEvent::at("id-Vitamin D", now - Duration::days(1)),
            DoseEvent::at("id-Vitamin D", now - Duration::days(2)),
        ];

        assert_eq!(consecutive_day_streak(&[med], &events, now, 30), 0);
    }

    #[test]
    fn test_streak_breaks_on_day_requiring_nothing() {
        let now = ts("2024-03-05T12:00:00Z"); // Tuesday
        let med = Medication::with_id(
            "m",
            "Aspirin",
            DoseTime::new(8, 0).unwrap(),
            BTreeSet::from([2]), // Tuesdays only
            "pill",
            now - Duration::days(20),
        )
        .unwrap();
        let events = vec![
            DoseEvent::at("m", now),
            DoseEvent::at("m", now - Duration::days(7)),
        ];

        // Monday requires nothing, so the streak cannot extend past Tuesday
        assert_eq!(consecutive_day_streak(&[med], &events, now, 30), 1);
    }

    #[test]
    fn test_streak_requires_every_due_medication() {
        let now = ts("2024-03-05T12:00:00Z");
        let a = daily_med("A", 8, now - Duration::days(20));
        let b = daily_med("B", 8, now - Duration::days(20));
        let events = vec![
            DoseEvent::at("id-A", now),
            DoseEvent::at("id-B", now),
            DoseEvent::at("id-A", now - Duration::days(1)),
            // B missing yesterday
        ];

        assert_eq!(consecutive_day_streak(&[a, b], &events, now, 30), 1);
    }

    #[test]
    fn test_time_slot_boundaries() {
        assert_eq!(TimeSlot::from_hour(6), TimeSlot::Morning);
        assert_eq!(TimeSlot::from_hour(11), TimeSlot::Morning);
        assert_eq!(TimeSlot::from_hour(12), TimeSlot::Afternoon);
        assert_eq!(TimeSlot::from_hour(16), TimeSlot::Afternoon);
        assert_eq!(TimeSlot::from_hour(17), TimeSlot::Evening);
        assert_eq!(TimeSlot::from_hour(20), TimeSlot::Evening);
        assert_eq!(TimeSlot::from_hour(21), TimeSlot::Night);
        assert_eq!(TimeSlot::from_hour(5), TimeSlot::Night);
        assert_eq!(TimeSlot::from_hour(0), TimeSlot::Night);
    }

    #[test]
    fn test_patterns_tally_and_delays() {
        let now = ts("2024-03-05T12:00:00Z");
        let med = daily_med("Aspirin", 8, now - Duration::days(10)); // scheduled 08:00
        let events = vec![
            DoseEvent::at("id-Aspirin", ts("2024-03-04T08:10:00Z")), // on time
            DoseEvent::at("id-Aspirin", ts("2024-03-05T09:00:00Z")), // 60 min late
        ];

        let patterns = dose_patterns(&[med], &events);
        assert_eq!(patterns.slot_count(TimeSlot::Morning), 2);
        assert_eq!(patterns.day_count("Mon"), 1);
        assert_eq!(patterns.day_count("Tue"), 1);
        assert_eq!(patterns.delays.len(), 1);
        assert_eq!(patterns.delays[0].delay_minutes, 60);
        // One of two doses within 15 minutes of schedule
        assert_eq!(patterns.time_consistency, 50);
    }

    #[test]
    fn test_consistency_full_when_no_history() {
        let patterns = dose_patterns(&[], &[]);
        assert_eq!(patterns.time_consistency, 100);
        assert!(patterns.delays.is_empty());
        assert_eq!(patterns.preferred_time_slot(), TimeSlot::Morning);
        assert_eq!(patterns.most_active_day(), "Mon");
    }
}
