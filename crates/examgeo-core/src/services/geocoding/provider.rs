//! Collaborator traits and provider errors
//!
//! The batch geocoder talks to three external collaborators:
//!
//! - [`Geocoder`]: turns an address into coordinates
//! - [`UsageAccounting`]: the shared monthly request counter
//! - [`RecordStore`]: writes coordinates back onto the session record

use async_trait::async_trait;
use thiserror::Error;

use super::types::{AddressQuery, Coordinates};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by a geocoding provider, the usage counter or the record store
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider credentials are missing
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Provider refused the request because of its own rate limit
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// API returned an error
    #[error("API error: {0}")]
    ApiError(String),

    /// Failed to parse API response
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Backing database failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record to update does not exist
    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::NetworkError("Request timed out".to_string())
        } else if err.is_connect() {
            ProviderError::NetworkError("Connection failed".to_string())
        } else if err.is_status() {
            match err.status() {
                Some(status) if status.as_u16() == 401 => {
                    ProviderError::Unauthorized("Invalid or expired access token".to_string())
                }
                Some(status) if status.as_u16() == 403 => {
                    ProviderError::Unauthorized("Access forbidden".to_string())
                }
                Some(status) if status.as_u16() == 429 => {
                    ProviderError::RateLimited("Too many requests".to_string())
                }
                Some(status) => ProviderError::ApiError(format!("HTTP {}", status)),
                None => ProviderError::NetworkError(err.to_string()),
            }
        } else if err.is_decode() {
            ProviderError::ParseError(err.to_string())
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::ParseError(err.to_string())
    }
}

impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        ProviderError::Storage(err.to_string())
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// A forward geocoding provider
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Short identifier used in logs (e.g. "mapbox")
    fn provider_id(&self) -> &'static str;

    /// Whether credentials are present. Must not make network requests.
    fn is_configured(&self) -> bool;

    /// Resolve an address.
    ///
    /// `Ok(None)` means the provider could not resolve the address; that is a
    /// normal outcome, not an error.
    async fn geocode(&self, address: &AddressQuery<'_>) -> Result<Option<Coordinates>, ProviderError>;
}

/// Monthly request accounting shared with every other consumer of the quota
#[async_trait]
pub trait UsageAccounting: Send + Sync {
    /// Requests made so far in the current month
    async fn monthly_usage(&self) -> Result<u64, ProviderError>;

    /// Requests allowed per month
    fn monthly_limit(&self) -> u64;

    /// Requests left this month (never negative)
    async fn remaining_quota(&self) -> Result<u64, ProviderError> {
        let used = self.monthly_usage().await?;
        Ok(self.monthly_limit().saturating_sub(used))
    }

    /// Whether at least one more request fits in this month's allowance
    async fn can_make_request(&self) -> Result<bool, ProviderError> {
        Ok(self.remaining_quota().await? > 0)
    }

    /// Count one request against the current month
    async fn record_request(&self) -> Result<(), ProviderError>;
}

/// Backing store for session coordinates
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write coordinates onto the record with `id`
    async fn update_coordinates(&self, id: &str, coordinates: Coordinates) -> Result<(), ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedUsage {
        used: AtomicU64,
        limit: u64,
    }

    #[async_trait]
    impl UsageAccounting for FixedUsage {
        async fn monthly_usage(&self) -> Result<u64, ProviderError> {
            Ok(self.used.load(Ordering::SeqCst))
        }

        fn monthly_limit(&self) -> u64 {
            self.limit
        }

        async fn record_request(&self) -> Result<(), ProviderError> {
            self.used.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_remaining_quota_saturates() {
        let usage = FixedUsage {
            used: AtomicU64::new(12),
            limit: 10,
        };
        assert_eq!(usage.remaining_quota().await.unwrap(), 0);
        assert!(!usage.can_make_request().await.unwrap());
    }

    #[tokio::test]
    async fn test_default_can_make_request() {
        let usage = FixedUsage {
            used: AtomicU64::new(9),
            limit: 10,
        };
        assert!(usage.can_make_request().await.unwrap());
        usage.record_request().await.unwrap();
        assert!(!usage.can_make_request().await.unwrap());
    }

    #[test]
    fn test_provider_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ProviderError = json_err.into();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_provider_error_display() {
        assert_eq!(
            ProviderError::NotConfigured("mapbox".to_string()).to_string(),
            "Provider not configured: mapbox"
        );
        assert_eq!(
            ProviderError::RateLimited("slow down".to_string()).to_string(),
            "Rate limited: slow down"
        );
    }
}
