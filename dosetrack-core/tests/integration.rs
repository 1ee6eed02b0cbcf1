//! Integration tests for dosetrack storage and analytics
//!
//! These tests run the full flow: store data through the adapter, pull it
//! back out, and feed it to the analytics layer, the way a host app would.

use chrono::{DateTime, Duration, Utc};
use dosetrack_core::analytics::{
    adherence_report, build_user_context, consecutive_day_streak, expected_doses,
};
use dosetrack_core::config::AnalyticsConfig;
use dosetrack_core::db::{kv, BackendKind, DoseFilter, KvStore, StorageAdapter};
use dosetrack_core::{DoseTime, Medication, SNAPSHOT_VERSION};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn daily_med(name: &str, created_at: DateTime<Utc>) -> Medication {
    Medication::with_id(
        format!("id-{}", name),
        name,
        DoseTime::new(8, 0).unwrap(),
        BTreeSet::from([0, 1, 2, 3, 4, 5, 6]),
        "pill",
        created_at,
    )
    .unwrap()
}

// ============================================
// Storage
// ============================================

#[test]
fn test_same_day_confirmation_overwrites() {
    let adapter = StorageAdapter::open_in_memory().unwrap();
    let med = daily_med("Aspirin", Utc::now());
    adapter.add_medication(&med).unwrap();

    adapter
        .mark_taken(&med.id, ts("2024-03-05T08:00:00Z"))
        .unwrap();
    adapter
        .mark_taken(&med.id, ts("2024-03-05T21:00:00Z"))
        .unwrap();

    let events = adapter.dose_events(&DoseFilter::default()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].taken_at, ts("2024-03-05T21:00:00Z"));
}

#[test]
fn test_delete_cascades_to_dose_events() {
    let adapter = StorageAdapter::open_in_memory().unwrap();
    let med = daily_med("Aspirin", Utc::now());
    let other = daily_med("Vitamin D", Utc::now());
    adapter.add_medication(&med).unwrap();
    adapter.add_medication(&other).unwrap();
    adapter
        .mark_taken(&med.id, ts("2024-03-05T08:00:00Z"))
        .unwrap();
    adapter
        .mark_taken(&other.id, ts("2024-03-05T08:00:00Z"))
        .unwrap();

    adapter.delete_medication(&med.id).unwrap();
    // Deleting again is a no-op
    adapter.delete_medication(&med.id).unwrap();

    assert_eq!(adapter.medications().unwrap().len(), 1);
    let events = adapter.dose_events(&DoseFilter::default()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].medication_id, other.id);
}

#[test]
fn test_snapshot_round_trip() {
    let adapter = StorageAdapter::open_in_memory().unwrap();
    let med = daily_med("Aspirin", ts("2024-02-01T08:00:00Z"));
    adapter.add_medication(&med).unwrap();
    adapter
        .mark_taken(&med.id, ts("2024-03-05T08:00:00Z"))
        .unwrap();
    adapter.set_premium_status(true).unwrap();
    adapter.set_assistant_session_id("session-9").unwrap();

    let snapshot = adapter.export_snapshot().unwrap();
    assert_eq!(snapshot.format_version, SNAPSHOT_VERSION);

    let restored = StorageAdapter::open_in_memory().unwrap();
    restored.import_snapshot(&snapshot).unwrap();

    assert_eq!(restored.medications().unwrap(), vec![med]);
    assert_eq!(
        restored.dose_events(&DoseFilter::default()).unwrap(),
        adapter.dose_events(&DoseFilter::default()).unwrap()
    );
    assert!(restored.premium_status().unwrap());
    assert_eq!(
        restored.assistant_session_id().unwrap().as_deref(),
        Some("session-9")
    );
}

#[test]
fn test_import_replaces_existing_state() {
    let adapter = StorageAdapter::open_in_memory().unwrap();
    let old = daily_med("Old", Utc::now());
    adapter.add_medication(&old).unwrap();

    let source = StorageAdapter::open_in_memory().unwrap();
    let new = daily_med("New", Utc::now());
    source.add_medication(&new).unwrap();

    adapter
        .import_snapshot(&source.export_snapshot().unwrap())
        .unwrap();

    let meds = adapter.medications().unwrap();
    assert_eq!(meds.len(), 1);
    assert_eq!(meds[0].name, "New");
}

// ============================================
// Legacy migration
// ============================================

#[test]
fn test_legacy_migration_runs_once() {
    let dir = TempDir::new().unwrap();
    let med = daily_med("Aspirin", ts("2024-02-01T08:00:00Z"));
    let doc = serde_json::json!({
        (kv::KEY_MEDICATIONS): [med.clone()],
        (kv::KEY_TAKEN): {
            (format!("2024-03-04_{}", med.id)): true,
            (format!("2024-03-05_{}", med.id)): true,
        },
        (kv::KEY_PREMIUM): true,
    });
    std::fs::write(dir.path().join("store.json"), doc.to_string()).unwrap();

    let adapter = StorageAdapter::open(dir.path()).unwrap();
    assert_eq!(adapter.backend(), BackendKind::Sqlite);
    assert!(adapter.migration_completed());
    assert_eq!(adapter.medications().unwrap().len(), 1);
    assert_eq!(adapter.dose_events(&DoseFilter::default()).unwrap().len(), 2);
    assert!(adapter.premium_status().unwrap());
    drop(adapter);

    // Second startup finds nothing left to migrate and duplicates nothing
    let adapter = StorageAdapter::open(dir.path()).unwrap();
    assert!(!adapter.migration_completed());
    assert_eq!(adapter.medications().unwrap().len(), 1);
    assert_eq!(adapter.dose_events(&DoseFilter::default()).unwrap().len(), 2);

    let leftover = KvStore::open(&dir.path().join("store.json")).unwrap();
    assert!(!leftover.has_legacy_data());
}

// ============================================
// Analytics over stored data
// ============================================

#[test]
fn test_expected_doses_never_decrease_with_window() {
    let med = daily_med("Aspirin", Utc::now());
    let today = ts("2024-03-05T12:00:00Z").date_naive();
    let mut prev = 0;
    for days in 1..=90 {
        let n = expected_doses(&med, days, today);
        assert!(n >= prev, "expected doses shrank at window {}", days);
        prev = n;
    }
}

#[test]
fn test_adherence_rate_never_exceeds_100() {
    let now = ts("2024-03-05T12:00:00Z");
    let adapter = StorageAdapter::open_in_memory().unwrap();
    // Tuesdays only, but confirmed every day
    let med = Medication::with_id(
        "m",
        "Aspirin",
        DoseTime::new(8, 0).unwrap(),
        BTreeSet::from([2]),
        "pill",
        now - Duration::days(14),
    )
    .unwrap();
    adapter.add_medication(&med).unwrap();
    for i in 0..14 {
        adapter.mark_taken(&med.id, now - Duration::days(i)).unwrap();
    }

    let meds = adapter.medications().unwrap();
    let events = adapter.dose_events(&DoseFilter::default()).unwrap();
    let report = adherence_report(&meds, &events, 30, now);
    assert!(report.per_medication[0].adherence_rate <= 100);
    assert!(report.adherence_rate <= 100);
}

#[test]
fn test_three_day_streak() {
    let now = ts("2024-03-05T12:00:00Z");
    let adapter = StorageAdapter::open_in_memory().unwrap();
    let med = daily_med("Vitamin D", now - Duration::days(30));
    adapter.add_medication(&med).unwrap();
    for i in 0..3 {
        adapter.mark_taken(&med.id, now - Duration::days(i)).unwrap();
    }
    // A gap before the current run
    adapter.mark_taken(&med.id, now - Duration::days(5)).unwrap();

    let meds = adapter.medications().unwrap();
    let events = adapter.dose_events(&DoseFilter::default()).unwrap();
    assert_eq!(consecutive_day_streak(&meds, &events, now, 30), 3);
}

#[test]
fn test_new_medication_never_flagged_as_concern() {
    let now = ts("2024-03-05T12:00:00Z");
    let adapter = StorageAdapter::open_in_memory().unwrap();
    adapter.add_medication(&daily_med("Fresh", now)).unwrap();

    let meds = adapter.medications().unwrap();
    let report = adherence_report(&meds, &[], 30, now);
    let stats = &report.per_medication[0];
    assert_eq!(stats.missed_days, 0);
    assert!(!stats.concern);
    assert_eq!(report.concerns().count(), 0);
}

#[test]
fn test_strong_adherence_celebrates_success() {
    let now = ts("2024-03-05T12:00:00Z");
    let adapter = StorageAdapter::open_in_memory().unwrap();
    let med = daily_med("Aspirin", now - Duration::days(30));
    adapter.add_medication(&med).unwrap();
    // Confirmed every day for ten days running
    for i in 0..10 {
        adapter.mark_taken(&med.id, now - Duration::days(i)).unwrap();
    }
    for i in 11..30 {
        adapter.mark_taken(&med.id, now - Duration::days(i)).unwrap();
    }

    let meds = adapter.medications().unwrap();
    let events = adapter.dose_events(&DoseFilter::default()).unwrap();
    let ctx = build_user_context(&meds, &events, &AnalyticsConfig::default(), now);
    assert!(ctx.adherence_rate >= 90);
    assert_eq!(ctx.streak_days, 10);
    assert!(ctx.celebrate_success);
}

#[test]
fn test_no_medications_yields_new_user_context() {
    let now = ts("2024-03-05T12:00:00Z");
    let adapter = StorageAdapter::open_in_memory().unwrap();

    let meds = adapter.medications().unwrap();
    let events = adapter.dose_events(&DoseFilter::default()).unwrap();
    let ctx = build_user_context(&meds, &events, &AnalyticsConfig::default(), now);
    assert!(ctx.is_new_user);
    assert!(ctx.needs_guidance);
    assert_eq!(ctx.adherence_rate, 100);
}
