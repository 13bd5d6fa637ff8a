//! Batch geocoding module
//!
//! Converts exam-session addresses into coordinates through an external
//! geocoding API, under a hard monthly request quota, resuming cleanly after
//! a crash or an exhausted quota.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ BatchRunner                                             │
//! │   - run(RunOptions) -> RunResult                        │
//! │   - resumable_progress() / clear_progress()             │
//! └─────────────────────────────────────────────────────────┘
//!      │              │                 │              │
//!      ▼              ▼                 ▼              ▼
//! ┌──────────┐  ┌───────────┐  ┌──────────────┐  ┌─────────────┐
//! │QuotaGate │  │ Geocoder  │  │ RecordStore  │  │ProgressStore│
//! │          │  │ (Mapbox)  │  │ (sessions)   │  │ (file / kv) │
//! └──────────┘  └───────────┘  └──────────────┘  └─────────────┘
//!      │
//!      ▼
//! ┌──────────────────┐       ┌───────────────┐
//! │ UsageAccounting  │ ◄──── │ UsageReporter │
//! │ (UsageCounter)   │       └───────────────┘
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use examgeo_core::services::geocoding::*;
//! use examgeo_core::services::SessionRepository;
//!
//! let config = GeocodeConfig::from_env();
//! let usage = Arc::new(UsageCounter::new(db.pool.clone(), config.monthly_limit));
//! let geocoder = Arc::new(MapboxGeocoder::new(config.clone(), usage.clone()));
//! let sessions = Arc::new(SessionRepository::new(db.pool.clone()));
//!
//! let runner = BatchRunner::new(geocoder, usage, sessions.clone(), ProgressStore::file(get_progress_path()?))
//!     .with_request_delay(config.request_delay());
//!
//! let records = sessions.address_records().await?;
//! let result = runner.run(RunOptions::new(records)).await?;
//! ```

pub mod batch;
pub mod config;
pub mod mapbox;
pub mod progress;
pub mod provider;
pub mod quota;
pub mod reporter;
pub mod types;
pub mod usage;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{resolve_work_set, BatchError, BatchRunner, RunOptions, WorkSet};
pub use config::{get_progress_path, GeocodeConfig};
pub use mapbox::MapboxGeocoder;
pub use progress::{FileSlot, KvSlot, ProgressSlot, ProgressStore};
pub use provider::{Geocoder, ProviderError, RecordStore, UsageAccounting};
pub use quota::QuotaGate;
pub use reporter::UsageReporter;
pub use types::{
    AddressQuery, AddressRecord, Coordinates, GeocodeProgressState, ProgressEvent,
    QuotaSnapshot, RunResult,
};
pub use usage::UsageCounter;
