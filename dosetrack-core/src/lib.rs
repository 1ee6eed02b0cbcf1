//! # dosetrack-core
//!
//! Core library for dosetrack - a medication reminder and adherence tracker.
//!
//! This library provides:
//! - Domain types for medications, dose events, and settings
//! - Storage layer with a SQLite backend and a key-value fallback
//! - Pure adherence analytics and insight generation
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through two layers:
//! - **Storage:** the [`db::StorageAdapter`] picks one [`db::EventStore`]
//!   backend at open time and lifts any legacy key-value data into SQLite.
//! - **Analytics:** pure functions over in-memory snapshots; they never
//!   touch storage or the clock, so callers pass data and `now` explicitly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dosetrack_core::{Config, StorageAdapter};
//!
//! let adapter = StorageAdapter::open(&Config::data_dir()).expect("failed to open storage");
//! let meds = adapter.medications().expect("failed to list medications");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{BackendKind, DoseFilter, EventStore, StorageAdapter, StorageInfo};
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod reminders;
pub mod types;
