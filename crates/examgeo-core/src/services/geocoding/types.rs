//! Geocoding types
//!
//! Records, progress state and run summaries shared by the batch geocoder.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Address Records
// ============================================================================

/// Address of one exam session, as read by the batch geocoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl AddressRecord {
    /// Street, city and region are all present and non-blank.
    /// Postal code is optional.
    pub fn has_required_fields(&self) -> bool {
        [&self.street, &self.city, &self.region]
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Both coordinates are already set
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Borrow the address as a provider query.
    ///
    /// Returns `None` when a required field is missing.
    pub fn query(&self) -> Option<AddressQuery<'_>> {
        if !self.has_required_fields() {
            return None;
        }

        Some(AddressQuery {
            street: self.street.as_deref()?.trim(),
            city: self.city.as_deref()?.trim(),
            region: self.region.as_deref()?.trim(),
            postal_code: self
                .postal_code
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty()),
        })
    }
}

/// Address fields sent to a geocoding provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressQuery<'a> {
    pub street: &'a str,
    pub city: &'a str,
    pub region: &'a str,
    pub postal_code: Option<&'a str>,
}

/// A resolved latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

// ============================================================================
// Progress State
// ============================================================================

/// Persisted bookkeeping for an in-progress run.
///
/// Serialized as `{ "processedIds": [...], "lastProcessedAt": "...", "totalAtStart": n }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeProgressState {
    /// Ids geocoded and written back, in the order they were processed
    pub processed_ids: Vec<String>,
    pub last_processed_at: DateTime<Utc>,
    /// Size of the work set when the run first started
    pub total_at_start: usize,
}

impl GeocodeProgressState {
    /// Start a fresh trail for a run of `total_at_start` records
    pub fn new(total_at_start: usize) -> Self {
        Self {
            processed_ids: Vec::new(),
            last_processed_at: Utc::now(),
            total_at_start,
        }
    }

    /// Record one more processed id. Ids already present are not duplicated.
    pub fn mark_processed(&mut self, id: &str) {
        if !self.contains(id) {
            self.processed_ids.push(id.to_string());
        }
        self.last_processed_at = Utc::now();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processed_ids.iter().any(|p| p == id)
    }

    /// Lookup set of processed ids
    pub fn id_set(&self) -> HashSet<&str> {
        self.processed_ids.iter().map(String::as_str).collect()
    }
}

// ============================================================================
// Quota
// ============================================================================

/// Point-in-time view of the monthly geocoding allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub current_usage: u64,
    pub remaining_quota: u64,
    pub monthly_limit: u64,
    pub is_configured: bool,
}

// ============================================================================
// Run Results
// ============================================================================

/// Counts for one batch invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Records geocoded and written back
    pub processed: usize,
    /// Records with an incomplete address or no provider result
    pub skipped: usize,
    /// Size of the resolved work set
    pub total: usize,
}

/// Progress notification emitted after every attempted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub skipped: usize,
    pub remaining: usize,
    pub total: usize,
    pub monthly_usage: u64,
    pub monthly_limit: u64,
}

// ============================================================================
// Tests
// ============================================================================
