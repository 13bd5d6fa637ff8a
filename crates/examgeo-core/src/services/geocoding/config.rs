//! Geocoding configuration
//!
//! Read from environment variables:
//!
//! | Variable                   | Default                      |
//! |----------------------------|------------------------------|
//! | `MAPBOX_ACCESS_TOKEN`      | unset (not configured)       |
//! | `EXAMGEO_MONTHLY_LIMIT`    | 100000                       |
//! | `EXAMGEO_REQUEST_DELAY_MS` | 100                          |
//! | `EXAMGEO_MAPBOX_URL`       | `https://api.mapbox.com`     |
//! | `EXAMGEO_PROGRESS_PATH`    | data dir + `geocode-progress.json` |

use std::path::PathBuf;
use std::time::Duration;

use crate::db;
use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

pub const ACCESS_TOKEN_ENV: &str = "MAPBOX_ACCESS_TOKEN";
pub const MONTHLY_LIMIT_ENV: &str = "EXAMGEO_MONTHLY_LIMIT";
pub const REQUEST_DELAY_ENV: &str = "EXAMGEO_REQUEST_DELAY_MS";
pub const BASE_URL_ENV: &str = "EXAMGEO_MAPBOX_URL";
pub const PROGRESS_PATH_ENV: &str = "EXAMGEO_PROGRESS_PATH";

/// Mapbox free tier allowance for temporary geocoding
pub const DEFAULT_MONTHLY_LIMIT: u64 = 100_000;

/// Pause between two provider calls
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;

/// Longest accepted pause between two provider calls
pub const MAX_REQUEST_DELAY_MS: u64 = 10_000;

pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com";

/// File name of the default progress slot
pub const PROGRESS_FILE_NAME: &str = "geocode-progress.json";

// ============================================================================
// Configuration
// ============================================================================

/// Settings for the geocoding provider and the batch runner
#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    /// Mapbox access token; `None` or blank means not configured
    pub access_token: Option<String>,
    /// Requests allowed per calendar month
    pub monthly_limit: u64,
    /// Pause between two provider calls
    pub request_delay_ms: u64,
    /// Provider API root
    pub base_url: String,
    /// ISO country filter passed to the provider
    pub country: Option<String>,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            base_url: DEFAULT_BASE_URL.to_string(),
            country: Some("us".to_string()),
        }
    }
}

impl GeocodeConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Unparseable numbers are logged and replaced by their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let access_token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());

        Self {
            access_token,
            monthly_limit: env_number(MONTHLY_LIMIT_ENV, defaults.monthly_limit),
            request_delay_ms: env_number(REQUEST_DELAY_ENV, defaults.request_delay_ms),
            base_url: std::env::var(BASE_URL_ENV).unwrap_or(defaults.base_url),
            country: defaults.country,
        }
        .validate()
    }

    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        Self {
            access_token: self
                .access_token
                .as_ref()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            monthly_limit: self.monthly_limit.max(1),
            request_delay_ms: self.request_delay_ms.min(MAX_REQUEST_DELAY_MS),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            country: self.country.clone(),
        }
    }

    /// Whether provider credentials are present
    pub fn is_configured(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn env_number(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("[geocode:config] Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Location of the progress file.
/// Priority: EXAMGEO_PROGRESS_PATH env var > app data directory
pub fn get_progress_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(PROGRESS_PATH_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).into_owned()));
    }

    Ok(db::data_dir()?.join(PROGRESS_FILE_NAME))
}

// ============================================================================
// Tests
// ============================================================================
