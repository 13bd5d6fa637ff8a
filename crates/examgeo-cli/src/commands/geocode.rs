//! Geocode commands
//!
//! Run the batch geocoder and inspect its saved progress and monthly usage.

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use examgeo_core::services::geocoding::get_progress_path;
use examgeo_core::{
    BatchError, BatchRunner, MapboxGeocoder, ProgressEvent, ProgressStore, QuotaSnapshot,
    RunOptions, RunResult, SessionRepository, UsageCounter, UsageReporter,
};
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Context;
use crate::output::{
    print_error, print_info, print_single, print_success, print_warning, OutputFormat,
};

#[derive(Subcommand)]
pub enum GeocodeAction {
    /// Geocode sessions that have no coordinates yet
    Run {
        /// Re-geocode every session, ignoring existing coordinates and saved progress
        #[arg(long)]
        force_all: bool,
    },

    /// Show progress saved by an interrupted run
    Progress,

    /// Discard saved progress
    Clear,

    /// Show this month's request usage
    Usage,
}

/// Usage row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct UsageRow {
    #[tabled(rename = "Used")]
    pub current_usage: u64,
    #[tabled(rename = "Remaining")]
    pub remaining_quota: u64,
    #[tabled(rename = "Monthly Limit")]
    pub monthly_limit: u64,
    #[tabled(rename = "Configured")]
    pub configured: String,
}

impl From<QuotaSnapshot> for UsageRow {
    fn from(snapshot: QuotaSnapshot) -> Self {
        Self {
            current_usage: snapshot.current_usage,
            remaining_quota: snapshot.remaining_quota,
            monthly_limit: snapshot.monthly_limit,
            configured: if snapshot.is_configured { "yes" } else { "no" }.to_string(),
        }
    }
}

/// Run result row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct RunRow {
    #[tabled(rename = "Geocoded")]
    pub processed: usize,
    #[tabled(rename = "Skipped")]
    pub skipped: usize,
    #[tabled(rename = "Total")]
    pub total: usize,
}

impl From<RunResult> for RunRow {
    fn from(result: RunResult) -> Self {
        Self {
            processed: result.processed,
            skipped: result.skipped,
            total: result.total,
        }
    }
}

/// Saved progress row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ProgressRow {
    #[tabled(rename = "Processed")]
    pub processed: usize,
    #[tabled(rename = "Total At Start")]
    pub total_at_start: usize,
    #[tabled(rename = "Last Processed")]
    pub last_processed_at: String,
    #[tabled(rename = "Location")]
    pub location: String,
}

/// Provider, counter and sessions wired against the CLI database
struct Services {
    geocoder: Arc<MapboxGeocoder>,
    usage: Arc<UsageCounter>,
    sessions: Arc<SessionRepository>,
}

impl Services {
    fn new(ctx: &Context) -> Self {
        let usage = Arc::new(UsageCounter::new(
            ctx.db.pool.clone(),
            ctx.config.monthly_limit,
        ));
        Self {
            geocoder: Arc::new(MapboxGeocoder::new(ctx.config.clone(), usage.clone())),
            sessions: Arc::new(SessionRepository::new(ctx.db.pool.clone())),
            usage,
        }
    }

    fn runner(&self, ctx: &Context) -> Result<BatchRunner> {
        let progress = ProgressStore::file(get_progress_path()?);
        Ok(BatchRunner::new(
            self.geocoder.clone(),
            self.usage.clone(),
            self.sessions.clone(),
            progress,
        )
        .with_request_delay(ctx.config.request_delay()))
    }
}

pub async fn execute(ctx: &Context, action: GeocodeAction) -> Result<()> {
    match action {
        GeocodeAction::Run { force_all } => run_batch(ctx, force_all).await,
        GeocodeAction::Progress => show_progress(ctx).await,
        GeocodeAction::Clear => clear_progress(ctx).await,
        GeocodeAction::Usage => show_usage(ctx).await,
    }
}

async fn run_batch(ctx: &Context, force_all: bool) -> Result<()> {
    let services = Services::new(ctx);
    let runner = services.runner(ctx)?;

    if !force_all {
        if let Some(saved) = runner.resumable_progress().await {
            print_info(
                &format!(
                    "Resuming: {} sessions already geocoded in the interrupted run",
                    saved.processed_ids.len()
                ),
                ctx.quiet,
            );
        }
    }

    let records = services.sessions.address_records().await?;
    let (tx, rx) = mpsc::unbounded_channel();
    let show_progress = !ctx.quiet && ctx.format == OutputFormat::Table;
    let printer = tokio::spawn(print_progress(rx, show_progress));

    // The runner owns the sender; the printer stops once run() returns
    let outcome = runner
        .run(RunOptions::new(records).force_all(force_all).with_progress(tx))
        .await;
    finish_printer(printer).await;

    match outcome {
        Ok(result) => {
            match ctx.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Table => {
                    if result.total == 0 {
                        print_success("All sessions already have coordinates", ctx.quiet);
                    } else {
                        print_success(
                            &format!(
                                "Geocoded {} of {} sessions ({} skipped)",
                                result.processed, result.total, result.skipped
                            ),
                            ctx.quiet,
                        );
                        print_single(&RunRow::from(result), ctx.format)?;
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            match &e {
                BatchError::InsufficientQuota { .. } => {
                    print_error("Nothing was geocoded; wait for the monthly quota to reset.");
                }
                BatchError::Unauthorized { .. } => {
                    print_error("Mapbox rejected the access token; fix MAPBOX_ACCESS_TOKEN and run again to resume.");
                }
                BatchError::QuotaExhausted { .. } => {
                    print_warning(
                        "Run `examgeo geocode run` again after the quota resets to resume.",
                        false,
                    );
                }
                _ => {}
            }
            Err(e.into())
        }
    }
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>, show: bool) {
    while let Some(event) = rx.recv().await {
        if show {
            println!("{}", progress_line(&event));
        }
    }
}

/// Wait for the progress printer; returns false if it panicked or was cancelled
async fn finish_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("[cli] Progress printer stopped abnormally: {}", e);
            false
        }
    }
}

fn progress_line(event: &ProgressEvent) -> String {
    format!(
        "[{}/{}] geocoded {}, skipped {}, {} left (usage {}/{})",
        event.processed + event.skipped,
        event.total,
        event.processed,
        event.skipped,
        event.remaining,
        event.monthly_usage,
        event.monthly_limit
    )
}

async fn show_progress(ctx: &Context) -> Result<()> {
    let store = ProgressStore::file(get_progress_path()?);

    let Some(state) = store.load().await else {
        match ctx.format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Table => print_info("No saved progress.", ctx.quiet),
        }
        return Ok(());
    };

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Table => {
            let row = ProgressRow {
                processed: state.processed_ids.len(),
                total_at_start: state.total_at_start,
                last_processed_at: state.last_processed_at.to_rfc3339(),
                location: store.location(),
            };
            print_single(&row, ctx.format)?;
        }
    }
    Ok(())
}

async fn clear_progress(ctx: &Context) -> Result<()> {
    let store = ProgressStore::file(get_progress_path()?);
    store.clear().await?;
    print_success("Saved progress cleared", ctx.quiet);
    Ok(())
}

async fn show_usage(ctx: &Context) -> Result<()> {
    let services = Services::new(ctx);
    let reporter = UsageReporter::new(services.geocoder.clone(), services.usage.clone());
    let snapshot = reporter.refresh().await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Table => print_single(&UsageRow::from(snapshot), ctx.format)?,
    }
    Ok(())
}
