//! # examgeo-core
//!
//! Core logic for examgeo - geocoding exam session addresses under a monthly
//! request quota.
//!
//! This crate provides:
//! - Database operations (`db` module)
//! - Data models (`models` module)
//! - Session repository and the resumable batch geocoder (`services` module)
//! - Unified error handling (`error` module)

pub mod db;
pub mod error;
pub mod models;
pub mod services;

// Re-exports for convenience
pub use db::Database;
pub use error::{Error, Result};

pub use models::{ExamSession, NewSession};

pub use services::geocoding::{
    AddressRecord, BatchError, BatchRunner, Coordinates, GeocodeConfig, GeocodeProgressState,
    MapboxGeocoder, ProgressEvent, ProgressStore, QuotaSnapshot, RunOptions, RunResult,
    UsageCounter, UsageReporter,
};
pub use services::SessionRepository;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}
