//! Usage reporter
//!
//! Read-only view of the monthly allowance for display. Safe to call at any
//! time, including while no run is active.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::provider::{Geocoder, ProviderError, UsageAccounting};
use super::types::QuotaSnapshot;

pub struct UsageReporter {
    geocoder: Arc<dyn Geocoder>,
    usage: Arc<dyn UsageAccounting>,
    last: RwLock<Option<QuotaSnapshot>>,
}

impl UsageReporter {
    pub fn new(geocoder: Arc<dyn Geocoder>, usage: Arc<dyn UsageAccounting>) -> Self {
        Self {
            geocoder,
            usage,
            last: RwLock::new(None),
        }
    }

    /// Last fetched snapshot, fetching one if none has been taken yet
    pub async fn snapshot(&self) -> Result<QuotaSnapshot, ProviderError> {
        if let Some(snapshot) = *self.last.read().await {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    /// Re-read the usage counter
    pub async fn refresh(&self) -> Result<QuotaSnapshot, ProviderError> {
        let current_usage = self.usage.monthly_usage().await?;
        let monthly_limit = self.usage.monthly_limit();
        let snapshot = QuotaSnapshot {
            current_usage,
            remaining_quota: monthly_limit.saturating_sub(current_usage),
            monthly_limit,
            is_configured: self.geocoder.is_configured(),
        };

        *self.last.write().await = Some(snapshot);
        Ok(snapshot)
    }

    pub async fn current(&self) -> Result<u64, ProviderError> {
        Ok(self.snapshot().await?.current_usage)
    }

    pub async fn remaining(&self) -> Result<u64, ProviderError> {
        Ok(self.snapshot().await?.remaining_quota)
    }

    pub fn limit(&self) -> u64 {
        self.usage.monthly_limit()
    }

    pub fn is_configured(&self) -> bool {
        self.geocoder.is_configured()
    }
}
