//! Threshold-driven insights and user context
//!
//! Turns adherence statistics and behavioral patterns into tagged,
//! human-readable observations and a structured context for the
//! message-templating layer.

use crate::analytics::adherence::{
    adherence_report, consecutive_day_streak, dose_patterns, AdherenceReport, DosePatterns,
    MedicationStats, TimeSlot,
};
use crate::config::AnalyticsConfig;
use crate::types::{DoseEvent, Medication};
use chrono::{DateTime, Utc};

/// Category of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    Achievement,
    Concern,
    Suggestion,
    Motivation,
}

/// How pressing an insight is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// One tagged observation about recent behavior.
#[derive(Debug, Clone)]
pub struct Insight {
    pub kind: InsightKind,
    pub urgency: Urgency,
    pub message: String,
}

impl Insight {
    fn new(kind: InsightKind, urgency: Urgency, message: impl Into<String>) -> Self {
        Self {
            kind,
            urgency,
            message: message.into(),
        }
    }
}

/// Derive insights from a recent-window report, all-history patterns and the
/// current streak.
///
/// Every rule is a fixed threshold; the same inputs always produce the same
/// insights, in a fixed order (achievements, concerns, suggestions,
/// motivation).
pub fn generate_insights(
    report: &AdherenceReport,
    patterns: &DosePatterns,
    streak: u32,
) -> Vec<Insight> {
    let mut insights = Vec::new();
    let rate = report.adherence_rate;

    if rate >= 90 {
        insights.push(Insight::new(
            InsightKind::Achievement,
            Urgency::Low,
            format!("Excellent medication adherence: {}%!", rate),
        ));
    } else if rate >= 80 {
        insights.push(Insight::new(
            InsightKind::Achievement,
            Urgency::Low,
            format!("Good adherence rate: {}%", rate),
        ));
    }

    if patterns.delays.is_empty() {
        insights.push(Insight::new(
            InsightKind::Achievement,
            Urgency::Low,
            "Perfect timing on all medications!",
        ));
    }

    if rate < 70 {
        insights.push(Insight::new(
            InsightKind::Concern,
            Urgency::High,
            format!("Low adherence rate: {}%. Let's work on improving this.", rate),
        ));
    }

    if report.missed_doses > 5 {
        insights.push(Insight::new(
            InsightKind::Concern,
            Urgency::Medium,
            format!(
                "{} missed doses in the last {} days.",
                report.missed_doses, report.window_days
            ),
        ));
    }

    if patterns.delays.len() > 3 {
        insights.push(Insight::new(
            InsightKind::Concern,
            Urgency::Medium,
            "Frequent timing delays. Consider adjusting your schedule.",
        ));
    }

    if patterns.slot_count(TimeSlot::Morning) > patterns.slot_count(TimeSlot::Evening) {
        insights.push(Insight::new(
            InsightKind::Suggestion,
            Urgency::Low,
            "You seem to be more consistent with morning medications. \
             Consider moving other meds to morning if possible.",
        ));
    }

    if patterns.day_count("Mon") < patterns.day_count("Fri") {
        insights.push(Insight::new(
            InsightKind::Suggestion,
            Urgency::Low,
            "Weekends seem challenging for medication adherence. \
             Set extra reminders for Saturday and Sunday.",
        ));
    }

    if streak > 0 {
        insights.push(Insight::new(
            InsightKind::Motivation,
            Urgency::Low,
            format!("You're on a {}-day streak! Keep it up!", streak),
        ));
    }

    insights
}

// ============================================
// User context
// ============================================

/// Structured summary of a user's recent behavior, consumed by the
/// message-templating layer.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub total_medications: usize,
    /// Adherence over the configured lookback window, 0-100
    pub adherence_rate: u32,
    pub total_taken: u32,
    pub missed_doses: u32,
    pub streak_days: u32,
    pub preferred_time_slot: TimeSlot,
    pub most_active_day: &'static str,
    /// More than two recorded timing delays
    pub has_timing_issues: bool,
    /// Lookback adherence below 70%
    pub needs_encouragement: bool,
    /// Streak is broken
    pub needs_motivation: bool,
    /// Lookback adherence at least 90%, or a streak longer than a week
    pub celebrate_success: bool,
    /// Count of recorded timing delays
    pub frequent_delays: usize,
    /// Share of doses taken within 15 minutes of schedule, 0-100
    pub time_consistency: u32,
    pub per_medication: Vec<MedicationStats>,
    /// No medications configured yet
    pub is_new_user: bool,
    pub needs_guidance: bool,
}

impl UserContext {
    /// Default context for a user with no medications configured.
    fn new_user() -> Self {
        Self {
            total_medications: 0,
            adherence_rate: 100,
            total_taken: 0,
            missed_doses: 0,
            streak_days: 0,
            preferred_time_slot: TimeSlot::Morning,
            most_active_day: "Mon",
            has_timing_issues: false,
            needs_encouragement: false,
            needs_motivation: false,
            celebrate_success: false,
            frequent_delays: 0,
            time_consistency: 100,
            per_medication: Vec::new(),
            is_new_user: true,
            needs_guidance: true,
        }
    }
}

/// Build the user context from a snapshot of medications and dose history.
///
/// An empty medication list degrades to the new-user defaults rather than
/// erroring.
pub fn build_user_context(
    meds: &[Medication],
    events: &[DoseEvent],
    config: &AnalyticsConfig,
    now: DateTime<Utc>,
) -> UserContext {
    if meds.is_empty() {
        return UserContext::new_user();
    }

    let report = adherence_report(meds, events, config.lookback_days, now);
    let patterns = dose_patterns(meds, events);
    let streak = consecutive_day_streak(meds, events, now, config.streak_scan_days);

    UserContext {
        total_medications: meds.len(),
        adherence_rate: report.adherence_rate,
        total_taken: report.total_taken,
        missed_doses: report.missed_doses,
        streak_days: streak,
        preferred_time_slot: patterns.preferred_time_slot(),
        most_active_day: patterns.most_active_day(),
        has_timing_issues: patterns.delays.len() > 2,
        needs_encouragement: report.adherence_rate < 70,
        needs_motivation: streak == 0,
        celebrate_success: report.adherence_rate >= 90 || streak > 7,
        frequent_delays: patterns.delays.len(),
        time_consistency: patterns.time_consistency,
        per_medication: report.per_medication,
        is_new_user: false,
        needs_guidance: false,
    }
}
