//! Exam session repository
//!
//! CRUD over the `exam_sessions` table, and the [`RecordStore`] the batch
//! geocoder writes coordinates through.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ExamSession, NewSession};
use crate::services::geocoding::{AddressRecord, Coordinates, ProviderError, RecordStore};

const SESSION_COLUMNS: &str = "id, title, street, city, region, postal_code, latitude, longitude, \
     session_date, created_at, updated_at";

#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All sessions in insertion order; `missing_only` keeps those without coordinates
    pub async fn list(&self, missing_only: bool) -> Result<Vec<ExamSession>> {
        let filter = if missing_only {
            "WHERE latitude IS NULL OR longitude IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM exam_sessions {} ORDER BY rowid",
            SESSION_COLUMNS, filter
        );

        let sessions = sqlx::query_as::<_, ExamSession>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ExamSession>> {
        let sql = format!("SELECT {} FROM exam_sessions WHERE id = ?", SESSION_COLUMNS);
        let session = sqlx::query_as::<_, ExamSession>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    /// Insert a session and return the stored row
    pub async fn insert(&self, new: NewSession) -> Result<ExamSession> {
        if new.title.trim().is_empty() {
            return Err(Error::validation("Session title is required"));
        }
        if new.latitude.is_some() != new.longitude.is_some() {
            return Err(Error::validation(
                "Latitude and longitude must be given together",
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO exam_sessions
            (id, title, street, city, region, postal_code, latitude, longitude,
             session_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(new.title.trim())
        .bind(&new.street)
        .bind(&new.city)
        .bind(&new.region)
        .bind(&new.postal_code)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(&new.session_date)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        log::debug!("[sessions] Inserted session {}", id);

        self.get(&id)
            .await?
            .ok_or_else(|| Error::not_found(format!("session {}", id)))
    }

    /// Address view of every session, in insertion order
    pub async fn address_records(&self) -> Result<Vec<AddressRecord>> {
        Ok(self
            .list(false)
            .await?
            .iter()
            .map(ExamSession::address_record)
            .collect())
    }

    /// Set coordinates on one session
    pub async fn set_coordinates(&self, id: &str, coordinates: Coordinates) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE exam_sessions
            SET latitude = ?, longitude = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(coordinates.latitude)
        .bind(coordinates.longitude)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("session {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SessionRepository {
    async fn update_coordinates(&self, id: &str, coordinates: Coordinates) -> std::result::Result<(), ProviderError> {
        self.set_coordinates(id, coordinates).await.map_err(|e| match e {
            Error::NotFound(what) => ProviderError::NotFound(what),
            other => ProviderError::Storage(other.to_string()),
        })
    }
}
