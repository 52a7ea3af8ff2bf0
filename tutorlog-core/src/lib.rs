//! # tutorlog-core
//!
//! Core library for tutorlog - interaction metrics for tutoring conversation logs.
//!
//! This library provides:
//! - Domain types for records, messages, feedback events and metrics
//! - Export loading and a tolerant payload decoder
//! - Speaker classification, role switches, session duration and Bloom scores
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Input:** the export file, one record per stored session chunk
//! - **Decoded:** payloads parsed into messages and feedback events
//! - **Derived:** per-record summaries and per-user metrics (recomputed every run)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tutorlog_core::{aggregate_by_user, load_records, Config, ExtractOptions};
//!
//! let config = Config::load().expect("failed to load config");
//! let loaded = load_records(Path::new("conversation_logs_rows.json")).expect("failed to load export");
//!
//! let report = aggregate_by_user(&loaded.records, &ExtractOptions::from(&config));
//! for (user_id, metrics) in &report.users {
//!     println!("{}: {} switches", user_id, metrics.role_switches);
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{load_records, parse_records, LoadedRecords};
pub use metrics::{aggregate_by_user, ExtractOptions, SpeakerMarkers};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod types;
