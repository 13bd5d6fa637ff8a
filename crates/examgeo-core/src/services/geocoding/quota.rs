//! Quota gate
//!
//! Keeps a batch run inside the provider's monthly allowance. The allowance is
//! shared with other processes, so it is checked up front and again before
//! every single request.

use std::sync::Arc;

use super::batch::BatchError;
use super::provider::{Geocoder, UsageAccounting};
use super::types::QuotaSnapshot;

pub struct QuotaGate {
    geocoder: Arc<dyn Geocoder>,
    usage: Arc<dyn UsageAccounting>,
}

impl QuotaGate {
    pub fn new(geocoder: Arc<dyn Geocoder>, usage: Arc<dyn UsageAccounting>) -> Self {
        Self { geocoder, usage }
    }

    /// Fail unless provider credentials are present
    pub fn assert_configured(&self) -> Result<(), BatchError> {
        if self.geocoder.is_configured() {
            Ok(())
        } else {
            Err(BatchError::NotConfigured(self.geocoder.provider_id().to_string()))
        }
    }

    /// Fail unless at least `required` requests remain this month
    pub async fn assert_sufficient_quota(&self, required: usize) -> Result<(), BatchError> {
        let remaining = self.usage.remaining_quota().await?;
        if remaining < required as u64 {
            log::warn!(
                "[geocode:quota] Need {} requests but only {} remain this month",
                required,
                remaining
            );
            return Err(BatchError::InsufficientQuota {
                required,
                remaining,
            });
        }
        Ok(())
    }

    /// Whether one more request may be made right now
    pub async fn can_proceed(&self) -> Result<bool, BatchError> {
        Ok(self.usage.can_make_request().await?)
    }

    /// Current usage figures
    pub async fn snapshot(&self) -> Result<QuotaSnapshot, BatchError> {
        let current_usage = self.usage.monthly_usage().await?;
        let monthly_limit = self.usage.monthly_limit();

        Ok(QuotaSnapshot {
            current_usage,
            remaining_quota: monthly_limit.saturating_sub(current_usage),
            monthly_limit,
            is_configured: self.geocoder.is_configured(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::geocoding::testing::{FakeGeocoder, FakeUsage};

    fn gate(geocoder: FakeGeocoder, usage: FakeUsage) -> QuotaGate {
        QuotaGate::new(Arc::new(geocoder), Arc::new(usage))
    }

    #[test]
    fn test_assert_configured() {
        assert!(gate(FakeGeocoder::resolving_all(), FakeUsage::new(1))
            .assert_configured()
            .is_ok());

        let err = gate(FakeGeocoder::unconfigured(), FakeUsage::new(1))
            .assert_configured()
            .unwrap_err();
        assert!(matches!(err, BatchError::NotConfigured(ref id) if id == "fake"));
    }

    #[tokio::test]
    async fn test_assert_sufficient_quota_boundary() {
        let gate = gate(FakeGeocoder::resolving_all(), FakeUsage::new(10).with_used(7));

        assert!(gate.assert_sufficient_quota(3).await.is_ok());
        let err = gate.assert_sufficient_quota(4).await.unwrap_err();
        assert!(matches!(
            err,
            BatchError::InsufficientQuota {
                required: 4,
                remaining: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_can_proceed_tracks_usage() {
        let gate = gate(FakeGeocoder::resolving_all(), FakeUsage::new(5).with_used(5));
        assert!(!gate.can_proceed().await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot() {
        let gate = gate(FakeGeocoder::unconfigured(), FakeUsage::new(100).with_used(40));
        let snapshot = gate.snapshot().await.unwrap();
        assert_eq!(snapshot.current_usage, 40);
        assert_eq!(snapshot.remaining_quota, 60);
        assert!(!snapshot.is_configured);
    }
}
