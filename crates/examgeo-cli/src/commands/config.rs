//! Config commands
//!
//! Shows the effective configuration and where each value came from.

use anyhow::Result;
use clap::Subcommand;
use examgeo_core::services::geocoding::config::{
    ACCESS_TOKEN_ENV, BASE_URL_ENV, MONTHLY_LIMIT_ENV, PROGRESS_PATH_ENV, REQUEST_DELAY_ENV,
};
use examgeo_core::services::geocoding::get_progress_path;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::print_output;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
}

/// Config row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

impl ConfigRow {
    fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
            source: source_of(key).to_string(),
        }
    }
}

pub async fn execute(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(ctx).await,
    }
}

async fn show_config(ctx: &Context) -> Result<()> {
    let rows = config_rows(ctx);
    print_output(&rows, ctx.format)?;
    Ok(())
}

fn config_rows(ctx: &Context) -> Vec<ConfigRow> {
    let db_path = examgeo_core::db::get_db_path()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "Unknown".to_string());
    let progress_path = get_progress_path()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "Unknown".to_string());

    let config = &ctx.config;
    vec![
        ConfigRow::new(examgeo_core::db::DB_PATH_ENV, db_path),
        ConfigRow::new(PROGRESS_PATH_ENV, progress_path),
        ConfigRow::new(ACCESS_TOKEN_ENV, mask_token(config.access_token.as_deref())),
        ConfigRow::new(MONTHLY_LIMIT_ENV, config.monthly_limit.to_string()),
        ConfigRow::new(REQUEST_DELAY_ENV, format!("{} ms", config.request_delay_ms)),
        ConfigRow::new(BASE_URL_ENV, config.base_url.clone()),
    ]
}

fn source_of(key: &str) -> &'static str {
    if std::env::var(key).is_ok_and(|v| !v.trim().is_empty()) {
        "env"
    } else {
        "default"
    }
}

/// Show only the token's prefix
fn mask_token(token: Option<&str>) -> String {
    match token {
        Some(t) if t.chars().count() > 8 => format!("{}****", t.chars().take(6).collect::<String>()),
        Some(_) => "****".to_string(),
        None => "Not set".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token(None), "Not set");
        assert_eq!(mask_token(Some("short")), "****");
        assert_eq!(mask_token(Some("pk.eyJ1IjoiZXhhbWdlbyJ9")), "pk.eyJ****");
    }

    #[test]
    fn test_source_of_unset_key() {
        assert_eq!(source_of("EXAMGEO_TEST_UNSET_KEY_FOR_SOURCE"), "default");
    }
}
