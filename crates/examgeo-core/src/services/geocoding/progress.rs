//! Progress store
//!
//! Durable bookkeeping of which records an interrupted run has already
//! geocoded. The state lives in a single key-value slot:
//!
//! - [`FileSlot`]: a JSON file next to the database (default)
//! - [`KvSlot`]: a row in the `app_kv` table
//!
//! Anything in the slot that does not parse as a [`GeocodeProgressState`] is
//! treated as "no progress".

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::types::GeocodeProgressState;
use crate::error::Result;

/// Key used by [`KvSlot`] when none is given
pub const DEFAULT_PROGRESS_KEY: &str = "geocode_progress";

// ============================================================================
// Slots
// ============================================================================

/// One durable key-value slot holding a raw string
#[async_trait]
pub trait ProgressSlot: Send + Sync {
    /// Raw slot content, `None` when the slot does not exist
    async fn read(&self) -> Result<Option<String>>;

    /// Replace the slot content
    async fn write(&self, contents: &str) -> Result<()>;

    /// Delete the slot. Deleting a missing slot is not an error.
    async fn remove(&self) -> Result<()>;

    /// Where the slot lives, for display
    fn describe(&self) -> String;
}

/// Slot stored as a file on disk
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ProgressSlot for FileSlot {
    async fn read(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crash never leaves a half-written file
        let temp = self.temp_path();
        tokio::fs::write(&temp, contents).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Slot stored as a row in the `app_kv` table
pub struct KvSlot {
    pool: SqlitePool,
    key: String,
}

impl KvSlot {
    pub fn new(pool: SqlitePool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }
}

#[async_trait]
impl ProgressSlot for KvSlot {
    async fn read(&self) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM app_kv WHERE key = ?")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn write(&self, contents: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_kv (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.key)
        .bind(contents)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        sqlx::query("DELETE FROM app_kv WHERE key = ?")
            .bind(&self.key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("app_kv:{}", self.key)
    }
}

// ============================================================================
// ProgressStore
// ============================================================================

/// Load/save/clear of the persisted [`GeocodeProgressState`]
pub struct ProgressStore {
    slot: Box<dyn ProgressSlot>,
}

impl ProgressStore {
    pub fn new(slot: impl ProgressSlot + 'static) -> Self {
        Self {
            slot: Box::new(slot),
        }
    }

    /// Progress file at `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSlot::new(path))
    }

    /// Progress row in the database under [`DEFAULT_PROGRESS_KEY`]
    pub fn kv(pool: SqlitePool) -> Self {
        Self::new(KvSlot::new(pool, DEFAULT_PROGRESS_KEY))
    }

    /// Saved progress, or `None` when the slot is absent, unreadable or malformed
    pub async fn load(&self) -> Option<GeocodeProgressState> {
        let raw = match self.slot.read().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!(
                    "[geocode:progress] Could not read {}: {}",
                    self.slot.describe(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_str::<GeocodeProgressState>(&raw) {
            Ok(state) => {
                log::debug!(
                    "[geocode:progress] Loaded {} processed ids from {}",
                    state.processed_ids.len(),
                    self.slot.describe()
                );
                Some(state)
            }
            Err(e) => {
                log::warn!(
                    "[geocode:progress] Ignoring malformed progress in {}: {}",
                    self.slot.describe(),
                    e
                );
                None
            }
        }
    }

    /// Overwrite the slot with the full state
    pub async fn save(&self, state: &GeocodeProgressState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.slot.write(&json).await
    }

    /// Remove the slot entirely
    pub async fn clear(&self) -> Result<()> {
        self.slot.remove().await?;
        log::info!("[geocode:progress] Cleared {}", self.slot.describe());
        Ok(())
    }

    pub fn location(&self) -> String {
        self.slot.describe()
    }
}

// ============================================================================
// Tests
// ============================================================================
