//! Services module

pub mod geocoding;
pub mod sessions;

pub use geocoding::{
    BatchError, BatchRunner, GeocodeConfig, MapboxGeocoder, ProgressStore, RunOptions,
    RunResult, UsageCounter, UsageReporter,
};
pub use sessions::SessionRepository;
