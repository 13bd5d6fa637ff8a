//! Session commands
//!
//! Commands for listing, adding and importing exam sessions.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Subcommand;
use examgeo_core::{ExamSession, NewSession, SessionRepository};
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{
    format_coordinate, print_info, print_output, print_single, print_success, print_warning,
    OutputFormat,
};

#[derive(Subcommand)]
pub enum SessionAction {
    /// List exam sessions
    List {
        /// Only show sessions without coordinates
        #[arg(long)]
        missing: bool,
    },

    /// Add an exam session
    Add {
        /// Session title
        #[arg(long)]
        title: String,

        /// Street address
        #[arg(long)]
        street: Option<String>,

        /// City
        #[arg(long)]
        city: Option<String>,

        /// State or region
        #[arg(long)]
        region: Option<String>,

        /// Postal code
        #[arg(long)]
        postal: Option<String>,

        /// Session date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Import sessions from a JSON array file
    Import {
        /// Path to the JSON file
        file: String,
    },
}

/// Session row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct SessionRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Lat")]
    pub latitude: String,
    #[tabled(rename = "Lon")]
    pub longitude: String,
}

impl From<&ExamSession> for SessionRow {
    fn from(session: &ExamSession) -> Self {
        let address = [
            session.street.as_deref(),
            session.city.as_deref(),
            session.region.as_deref(),
            session.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ");

        Self {
            id: session.id.chars().take(8).collect(),
            title: session.title.clone(),
            address,
            date: session.session_date.clone().unwrap_or_else(|| "-".to_string()),
            latitude: format_coordinate(session.latitude),
            longitude: format_coordinate(session.longitude),
        }
    }
}

pub async fn execute(ctx: &Context, action: SessionAction) -> Result<()> {
    let repo = SessionRepository::new(ctx.db.pool.clone());

    match action {
        SessionAction::List { missing } => list_sessions(ctx, &repo, missing).await,
        SessionAction::Add {
            title,
            street,
            city,
            region,
            postal,
            date,
        } => {
            let new = NewSession {
                title,
                street,
                city,
                region,
                postal_code: postal,
                session_date: date,
                ..Default::default()
            };
            add_session(ctx, &repo, new).await
        }
        SessionAction::Import { file } => import_sessions(ctx, &repo, file).await,
    }
}

async fn list_sessions(ctx: &Context, repo: &SessionRepository, missing: bool) -> Result<()> {
    let sessions = repo.list(missing).await?;

    match ctx.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions_json(&sessions))?);
            Ok(())
        }
        OutputFormat::Table => {
            let rows: Vec<SessionRow> = sessions.iter().map(SessionRow::from).collect();
            print_output(&rows, ctx.format)?;
            if !sessions.is_empty() {
                let missing_count = sessions.iter().filter(|s| !s.is_geocoded()).count();
                print_info(
                    &format!("{} sessions, {} without coordinates", sessions.len(), missing_count),
                    ctx.quiet,
                );
            }
            Ok(())
        }
    }
}

async fn add_session(ctx: &Context, repo: &SessionRepository, new: NewSession) -> Result<()> {
    let session = repo.insert(new).await?;

    if !session.address_record().has_required_fields() {
        print_warning(
            "Address is incomplete (street, city and region are needed to geocode)",
            ctx.quiet,
        );
    }

    match ctx.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&SessionJson::from(&session))?);
        }
        OutputFormat::Table => {
            print_success(&format!("Added session {}", session.id), ctx.quiet);
            print_single(&SessionRow::from(&session), ctx.format)?;
        }
    }
    Ok(())
}

async fn import_sessions(ctx: &Context, repo: &SessionRepository, file: String) -> Result<()> {
    let path = PathBuf::from(shellexpand::tilde(&file).into_owned());
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let sessions: Vec<NewSession> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid session list in {}", path.display()))?;

    let total = sessions.len();
    let mut imported = 0;
    for new in sessions {
        let title = new.title.clone();
        match repo.insert(new).await {
            Ok(_) => imported += 1,
            Err(e) => print_warning(&format!("Skipped '{}': {}", title, e), ctx.quiet),
        }
    }

    print_success(&format!("Imported {} of {} sessions", imported, total), ctx.quiet);
    Ok(())
}

/// Full session shape for JSON output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionJson {
    pub id: String,
    pub title: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub session_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<&ExamSession> for SessionJson {
    fn from(session: &ExamSession) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            street: session.street.clone(),
            city: session.city.clone(),
            region: session.region.clone(),
            postal_code: session.postal_code.clone(),
            session_date: session.session_date.clone(),
            latitude: session.latitude,
            longitude: session.longitude,
        }
    }
}

fn sessions_json(sessions: &[ExamSession]) -> Vec<SessionJson> {
    sessions.iter().map(SessionJson::from).collect()
}
