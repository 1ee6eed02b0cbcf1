//! Analytics over medications and dose history
//!
//! Everything in this module is pure: functions take a snapshot of
//! medications and dose events plus an explicit `now`, and never touch
//! storage or the system clock. Callers load data through
//! [`crate::db::StorageAdapter`] and pass it in.

pub mod adherence;
pub mod insights;
pub mod messages;

pub use adherence::{
    adherence_report, consecutive_day_streak, dose_patterns, expected_doses, AdherenceReport,
    DosePatterns, MedicationStats, TimeSlot, TimingDelay,
};
pub use insights::{build_user_context, generate_insights, Insight, InsightKind, UserContext, Urgency};
pub use messages::{assistant_reply, AssistantReply};

use crate::config::AnalyticsConfig;
use crate::types::{DoseEvent, Medication};
use chrono::{DateTime, Utc};

/// Insights over the configured recent window.
///
/// Convenience wrapper combining the short-window report, all-history
/// patterns and the current streak.
pub fn recent_insights(
    meds: &[Medication],
    events: &[DoseEvent],
    config: &AnalyticsConfig,
    now: DateTime<Utc>,
) -> Vec<Insight> {
    let report = adherence_report(meds, events, config.insight_window_days, now);
    let patterns = dose_patterns(meds, events);
    let streak = consecutive_day_streak(meds, events, now, config.streak_scan_days);
    generate_insights(&report, &patterns, streak)
}
