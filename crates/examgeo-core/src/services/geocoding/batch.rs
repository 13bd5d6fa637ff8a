//! Batch geocoding runner
//!
//! Geocodes a list of exam-session addresses one at a time, under the monthly
//! quota, persisting progress after every success so an interrupted run can
//! pick up where it stopped.
//!
//! ```text
//! Idle → Validating → (Resuming | Starting) → Processing(i) → Completed
//!                                                   │
//!                                                   └──────→ QuotaExhausted
//! ```
//!
//! Fatal outcomes:
//! - not configured, insufficient quota: raised before any record is touched
//! - quota exhausted mid-run, or credentials rejected by the provider: records
//!   already written and the saved progress are kept, so the next non-forced
//!   run resumes
//!
//! A provider that cannot resolve an address (or fails for one record) only
//! counts that record as skipped.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use super::config::DEFAULT_REQUEST_DELAY_MS;
use super::progress::ProgressStore;
use super::provider::{Geocoder, ProviderError, RecordStore, UsageAccounting};
use super::quota::QuotaGate;
use super::types::{AddressRecord, GeocodeProgressState, ProgressEvent, QuotaSnapshot, RunResult};

// ============================================================================
// Error Types
// ============================================================================

/// Fatal outcomes of a batch run
#[derive(Error, Debug)]
pub enum BatchError {
    /// Provider credentials are missing
    #[error("Geocoding provider '{0}' is not configured; set MAPBOX_ACCESS_TOKEN")]
    NotConfigured(String),

    /// The work set needs more requests than the month has left
    #[error("Insufficient geocoding quota: {required} requests needed but only {remaining} remain this month")]
    InsufficientQuota { required: usize, remaining: u64 },

    /// The monthly limit was hit partway through the run
    #[error(
        "Monthly geocoding limit reached mid-run: {} of {total} records done ({processed} geocoded, {skipped} skipped); progress saved, resume after the quota resets",
        .processed + .skipped
    )]
    QuotaExhausted {
        processed: usize,
        skipped: usize,
        total: usize,
    },

    /// The provider rejected the credentials; no further record can succeed
    #[error(
        "Geocoding provider '{provider}' rejected the credentials after {} of {total} records ({reason}); progress saved, check MAPBOX_ACCESS_TOKEN",
        .processed + .skipped
    )]
    Unauthorized {
        provider: String,
        reason: String,
        processed: usize,
        skipped: usize,
        total: usize,
    },

    /// The usage counter could not be read
    #[error("Usage accounting failed: {0}")]
    Accounting(#[from] ProviderError),

    /// Progress could not be persisted
    #[error("Progress store failed: {0}")]
    Progress(#[from] crate::error::Error),
}

// ============================================================================
// Options
// ============================================================================

/// Input for one batch run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Candidate records, in the order they should be attempted
    pub records: Vec<AddressRecord>,
    /// Re-geocode everything, ignoring existing coordinates and saved progress
    pub force_all: bool,
    /// Receives one event per attempted record
    pub progress_tx: Option<UnboundedSender<ProgressEvent>>,
}

impl RunOptions {
    pub fn new(records: Vec<AddressRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn force_all(mut self, force_all: bool) -> Self {
        self.force_all = force_all;
        self
    }

    pub fn with_progress(mut self, tx: UnboundedSender<ProgressEvent>) -> Self {
        self.progress_tx = Some(tx);
        self
    }
}

// ============================================================================
// Work Set
// ============================================================================

/// Records a run will attempt, plus the progress trail it extends
#[derive(Debug, Clone)]
pub struct WorkSet {
    pub items: Vec<AddressRecord>,
    pub state: GeocodeProgressState,
    /// Whether `state` came from a previous, interrupted run
    pub resumed: bool,
}

impl WorkSet {
    /// Items that will actually be sent to the provider
    pub fn request_count(&self) -> usize {
        self.items.iter().filter(|r| r.has_required_fields()).count()
    }
}

/// Filter candidates down to the records this run will attempt.
///
/// Records with incomplete addresses stay in the set (they are counted as
/// skipped without a provider call). Unless `force_all`, records that already
/// have coordinates or whose id is in `prior` are dropped. With `force_all`,
/// `prior` is ignored and a fresh trail is started.
pub fn resolve_work_set(
    records: Vec<AddressRecord>,
    force_all: bool,
    prior: Option<GeocodeProgressState>,
) -> WorkSet {
    let prior = if force_all { None } else { prior };

    let items: Vec<AddressRecord> = match &prior {
        Some(state) => {
            let done = state.id_set();
            records
                .into_iter()
                .filter(|r| !r.has_coordinates() && !done.contains(r.id.as_str()))
                .collect()
        }
        None if force_all => records,
        None => records.into_iter().filter(|r| !r.has_coordinates()).collect(),
    };

    match prior {
        Some(state) => WorkSet {
            items,
            state,
            resumed: true,
        },
        None => WorkSet {
            state: GeocodeProgressState::new(items.len()),
            items,
            resumed: false,
        },
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Drives a batch run against the provider, usage counter, record store and
/// progress store.
pub struct BatchRunner {
    geocoder: Arc<dyn Geocoder>,
    records: Arc<dyn RecordStore>,
    gate: QuotaGate,
    progress: ProgressStore,
    request_delay: Duration,
}

impl BatchRunner {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        usage: Arc<dyn UsageAccounting>,
        records: Arc<dyn RecordStore>,
        progress: ProgressStore,
    ) -> Self {
        Self {
            gate: QuotaGate::new(geocoder.clone(), usage),
            geocoder,
            records,
            progress,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
        }
    }

    /// Pause between two provider calls
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Progress left by an interrupted run, if any
    pub async fn resumable_progress(&self) -> Option<GeocodeProgressState> {
        self.progress.load().await
    }

    /// Discard saved progress
    pub async fn clear_progress(&self) -> Result<(), BatchError> {
        Ok(self.progress.clear().await?)
    }

    pub async fn quota_snapshot(&self) -> Result<QuotaSnapshot, BatchError> {
        self.gate.snapshot().await
    }

    /// Run one batch.
    pub async fn run(&self, options: RunOptions) -> Result<RunResult, BatchError> {
        let RunOptions {
            records,
            force_all,
            progress_tx,
        } = options;

        self.gate.assert_configured()?;

        let candidates = records.len();
        let prior = if force_all {
            None
        } else {
            self.progress.load().await
        };
        let work = resolve_work_set(records, force_all, prior);
        let total = work.items.len();

        if work.resumed {
            log::info!(
                "[geocode:batch] Resuming run: {} already processed, {} of {} candidates left",
                work.state.processed_ids.len(),
                total,
                candidates
            );
        } else {
            log::info!(
                "[geocode:batch] Starting run: {} of {} candidates to geocode (force_all={})",
                total,
                candidates,
                force_all
            );
        }

        self.gate.assert_sufficient_quota(work.request_count()).await?;

        if force_all {
            self.progress.clear().await?;
        }

        let mut state = work.state;
        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut calls = 0usize;

        for record in &work.items {
            let Some(query) = record.query() else {
                log::debug!(
                    "[geocode:batch] Skipping {}: street, city and region are required",
                    record.id
                );
                skipped += 1;
                self.emit(&progress_tx, processed, skipped, total).await?;
                continue;
            };

            if calls > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            if !self.gate.can_proceed().await? {
                log::warn!(
                    "[geocode:batch] Monthly limit reached after {} of {} records; keeping progress",
                    processed + skipped,
                    total
                );
                return Err(BatchError::QuotaExhausted {
                    processed,
                    skipped,
                    total,
                });
            }

            calls += 1;
            match self.geocoder.geocode(&query).await {
                Ok(Some(coordinates)) => {
                    match self.records.update_coordinates(&record.id, coordinates).await {
                        Ok(()) => {
                            state.mark_processed(&record.id);
                            self.progress.save(&state).await?;
                            processed += 1;
                        }
                        Err(e) => {
                            // Not added to the trail; a later run retries it
                            log::warn!(
                                "[geocode:batch] Geocoded {} but could not store coordinates: {}",
                                record.id,
                                e
                            );
                            skipped += 1;
                        }
                    }
                }
                Ok(None) => {
                    log::debug!("[geocode:batch] No result for {}", record.id);
                    skipped += 1;
                }
                Err(ProviderError::Unauthorized(reason)) => {
                    log::error!(
                        "[geocode:batch] {} rejected the credentials at {}; stopping after {} of {} records",
                        self.geocoder.provider_id(),
                        record.id,
                        processed + skipped,
                        total
                    );
                    return Err(BatchError::Unauthorized {
                        provider: self.geocoder.provider_id().to_string(),
                        reason,
                        processed,
                        skipped,
                        total,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "[geocode:batch] {} lookup failed for {}: {}",
                        self.geocoder.provider_id(),
                        record.id,
                        e
                    );
                    skipped += 1;
                }
            }

            self.emit(&progress_tx, processed, skipped, total).await?;
        }

        self.progress.clear().await?;

        log::info!(
            "[geocode:batch] Completed: {} geocoded, {} skipped, {} total",
            processed,
            skipped,
            total
        );

        Ok(RunResult {
            processed,
            skipped,
            total,
        })
    }

    async fn emit(
        &self,
        tx: &Option<UnboundedSender<ProgressEvent>>,
        processed: usize,
        skipped: usize,
        total: usize,
    ) -> Result<(), BatchError> {
        let Some(tx) = tx else {
            return Ok(());
        };

        let quota = self.gate.snapshot().await?;
        let event = ProgressEvent {
            processed,
            skipped,
            remaining: total.saturating_sub(processed + skipped),
            total,
            monthly_usage: quota.current_usage,
            monthly_limit: quota.monthly_limit,
        };

        // A dropped receiver only means nobody is watching
        let _ = tx.send(event);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
