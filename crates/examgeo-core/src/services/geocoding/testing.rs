//! In-memory collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::provider::{Geocoder, ProviderError, RecordStore, UsageAccounting};
use super::types::{AddressQuery, AddressRecord, Coordinates};

/// Record with a complete address: street "`{id} street`"
pub fn record(id: &str) -> AddressRecord {
    AddressRecord {
        id: id.to_string(),
        street: Some(format!("{id} street")),
        city: Some("Newington".to_string()),
        region: Some("CT".to_string()),
        postal_code: Some("06111".to_string()),
        latitude: None,
        longitude: None,
    }
}

/// Resolves every street to (1.0, 2.0) unless told otherwise
pub struct FakeGeocoder {
    configured: bool,
    misses: HashSet<String>,
    failures: HashSet<String>,
    rejected_from: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeGeocoder {
    pub fn resolving_all() -> Self {
        Self {
            configured: true,
            misses: HashSet::new(),
            failures: HashSet::new(),
            rejected_from: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::resolving_all()
        }
    }

    pub fn with_miss(mut self, street: &str) -> Self {
        self.misses.insert(street.to_string());
        self
    }

    pub fn with_failure(mut self, street: &str) -> Self {
        self.failures.insert(street.to_string());
        self
    }

    /// Answer 401 from this street onwards, as a revoked token would
    pub fn with_rejected_token(mut self, street: &str) -> Self {
        self.rejected_from = Some(street.to_string());
        self
    }

    /// Streets sent to the provider, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    fn provider_id(&self) -> &'static str {
        "fake"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn geocode(&self, address: &AddressQuery<'_>) -> Result<Option<Coordinates>, ProviderError> {
        let rejected = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(address.street.to_string());
            self.rejected_from
                .as_deref()
                .is_some_and(|from| calls.iter().any(|c| c == from))
        };

        if rejected {
            return Err(ProviderError::Unauthorized("HTTP 401".to_string()));
        }

        if self.failures.contains(address.street) {
            return Err(ProviderError::ApiError("HTTP 500".to_string()));
        }
        if self.misses.contains(address.street) {
            return Ok(None);
        }
        Ok(Some(Coordinates {
            latitude: 1.0,
            longitude: 2.0,
        }))
    }
}

/// Usage counter that can start refusing after a number of checks
pub struct FakeUsage {
    used: AtomicU64,
    limit: u64,
    allowed_checks: Option<usize>,
    checks: AtomicUsize,
}

impl FakeUsage {
    pub fn new(limit: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            limit,
            allowed_checks: None,
            checks: AtomicUsize::new(0),
        }
    }

    /// Allow `n` per-request checks, then report the quota as exhausted
    pub fn deny_after(mut self, n: usize) -> Self {
        self.allowed_checks = Some(n);
        self
    }

    pub fn with_used(self, used: u64) -> Self {
        self.used.store(used, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl UsageAccounting for FakeUsage {
    async fn monthly_usage(&self) -> Result<u64, ProviderError> {
        Ok(self.used.load(Ordering::SeqCst))
    }

    fn monthly_limit(&self) -> u64 {
        self.limit
    }

    async fn can_make_request(&self) -> Result<bool, ProviderError> {
        let seen = self.checks.fetch_add(1, Ordering::SeqCst);
        if self.allowed_checks.is_some_and(|n| seen >= n) {
            return Ok(false);
        }
        Ok(self.remaining_quota().await? > 0)
    }

    async fn record_request(&self) -> Result<(), ProviderError> {
        self.used.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Record store keeping coordinates in a map
#[derive(Default)]
pub struct FakeRecords {
    failing: HashSet<String>,
    updates: Mutex<Vec<(String, Coordinates)>>,
}

impl FakeRecords {
    pub fn failing_on(id: &str) -> Self {
        Self {
            failing: HashSet::from([id.to_string()]),
            ..Default::default()
        }
    }

    pub fn updated_ids(&self) -> Vec<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn coordinates(&self, id: &str) -> Option<Coordinates> {
        let updates = self.updates.lock().unwrap();
        let latest: HashMap<&str, Coordinates> =
            updates.iter().map(|(i, c)| (i.as_str(), *c)).collect();
        latest.get(id).copied()
    }
}

#[async_trait]
impl RecordStore for FakeRecords {
    async fn update_coordinates(&self, id: &str, coordinates: Coordinates) -> Result<(), ProviderError> {
        if self.failing.contains(id) {
            return Err(ProviderError::Storage("disk I/O error".to_string()));
        }
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), coordinates));
        Ok(())
    }
}
