//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod config;
pub mod geocode;
pub mod session;

use crate::output::OutputFormat;
use examgeo_core::{Database, GeocodeConfig};

/// Shared context for all commands
pub struct Context {
    pub db: Database,
    pub config: GeocodeConfig,
    pub format: OutputFormat,
    pub quiet: bool,
}
