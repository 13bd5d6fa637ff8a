//! Data models for exam sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::services::geocoding::AddressRecord;

/// Exam session model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamSession {
    pub id: String,
    pub title: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub session_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExamSession {
    /// Address view of this session, as consumed by the batch geocoder
    pub fn address_record(&self) -> AddressRecord {
        AddressRecord {
            id: self.id.clone(),
            street: self.street.clone(),
            city: self.city.clone(),
            region: self.region.clone(),
            postal_code: self.postal_code.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Whether both coordinates are set
    pub fn is_geocoded(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Create exam session request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSession {
    pub title: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub session_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
