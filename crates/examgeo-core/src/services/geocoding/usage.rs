//! Monthly request counter
//!
//! Persists geocoding request counts to SQLite, one row per UTC month.
//! Every process pointed at the same database shares the counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::provider::{ProviderError, UsageAccounting};

/// Accounting period key ("YYYY-MM") for a timestamp
pub fn period_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// SQLite-backed monthly usage counter
pub struct UsageCounter {
    pool: SqlitePool,
    monthly_limit: u64,
}

impl UsageCounter {
    /// Create a new counter with the given database pool and monthly limit
    pub fn new(pool: SqlitePool, monthly_limit: u64) -> Self {
        Self {
            pool,
            monthly_limit,
        }
    }

    /// Requests recorded for a specific period
    pub async fn usage_for_period(&self, period: &str) -> Result<u64, ProviderError> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT request_count FROM geocode_usage WHERE period = ?")
                .bind(period)
                .fetch_optional(&self.pool)
                .await?;

        Ok(count.unwrap_or(0).max(0) as u64)
    }

    /// Add `count` requests to a specific period
    pub async fn add_for_period(&self, period: &str, count: u64) -> Result<(), ProviderError> {
        sqlx::query(
            r#"
            INSERT INTO geocode_usage (period, request_count, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(period) DO UPDATE SET
                request_count = request_count + excluded.request_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(period)
        .bind(count as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UsageAccounting for UsageCounter {
    async fn monthly_usage(&self) -> Result<u64, ProviderError> {
        self.usage_for_period(&period_key(Utc::now())).await
    }

    fn monthly_limit(&self) -> u64 {
        self.monthly_limit
    }

    async fn record_request(&self) -> Result<(), ProviderError> {
        let period = period_key(Utc::now());
        self.add_for_period(&period, 1).await?;
        log::debug!("[geocode:usage] Recorded request for {}", period);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn counter(limit: u64) -> (UsageCounter, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("usage.db")).await.unwrap();
        (UsageCounter::new(db.pool, limit), temp_dir)
    }

    #[test]
    fn test_period_key() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 0).unwrap();
        assert_eq!(period_key(at), "2026-03");
    }

    #[tokio::test]
    async fn test_empty_counter() {
        let (counter, _dir) = counter(5).await;
        assert_eq!(counter.monthly_usage().await.unwrap(), 0);
        assert_eq!(counter.remaining_quota().await.unwrap(), 5);
        assert!(counter.can_make_request().await.unwrap());
    }

    #[tokio::test]
    async fn test_record_request_increments_current_month() {
        let (counter, _dir) = counter(2).await;
        counter.record_request().await.unwrap();
        counter.record_request().await.unwrap();

        assert_eq!(counter.monthly_usage().await.unwrap(), 2);
        assert_eq!(counter.remaining_quota().await.unwrap(), 0);
        assert!(!counter.can_make_request().await.unwrap());
    }

    #[tokio::test]
    async fn test_other_periods_do_not_count() {
        let (counter, _dir) = counter(10).await;
        counter.add_for_period("1999-12", 7).await.unwrap();

        assert_eq!(counter.usage_for_period("1999-12").await.unwrap(), 7);
        assert_eq!(counter.monthly_usage().await.unwrap(), 0);
    }
}
