//! Mapbox geocoding provider
//!
//! Implements [`Geocoder`] on top of the Mapbox Geocoding API v6 structured
//! forward search:
//!
//! ```text
//! GET {base_url}/search/geocode/v6/forward
//!     ?address_line1=..&place=..&region=..&postcode=..
//!     &country=us&limit=1&access_token=..
//! ```
//!
//! The first feature's `geometry.coordinates` (`[longitude, latitude]`) is the
//! result. An empty feature list means the address could not be resolved.
//!
//! Every request that left the process is counted on the shared
//! [`UsageAccounting`] counter, whether or not it produced a result. A request
//! that failed to connect is not counted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::config::GeocodeConfig;
use super::provider::{Geocoder, ProviderError, UsageAccounting};
use super::types::{AddressQuery, Coordinates};

// ============================================================================
// Constants
// ============================================================================

const FORWARD_PATH: &str = "/search/geocode/v6/forward";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<f64>,
}

/// First usable coordinate pair in a forward-geocoding response
fn first_coordinates(body: &str) -> Result<Option<Coordinates>, ProviderError> {
    let collection: FeatureCollection = serde_json::from_str(body)?;

    Ok(collection
        .features
        .into_iter()
        .filter_map(|f| f.geometry)
        .find_map(|g| match g.coordinates.as_slice() {
            [longitude, latitude, ..] => Some(Coordinates {
                latitude: *latitude,
                longitude: *longitude,
            }),
            _ => None,
        }))
}

// ============================================================================
// Provider
// ============================================================================

pub struct MapboxGeocoder {
    client: Client,
    config: GeocodeConfig,
    usage: Arc<dyn UsageAccounting>,
}

impl MapboxGeocoder {
    pub fn new(config: GeocodeConfig, usage: Arc<dyn UsageAccounting>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            config: config.validate(),
            usage,
        }
    }

    async fn count_request(&self) {
        if let Err(e) = self.usage.record_request().await {
            log::warn!("[geocode:mapbox] Failed to record request: {}", e);
        }
    }

    fn query_params<'a>(&'a self, address: &AddressQuery<'a>, token: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("address_line1", address.street),
            ("place", address.city),
            ("region", address.region),
        ];
        if let Some(postcode) = address.postal_code {
            params.push(("postcode", postcode));
        }
        if let Some(country) = self.config.country.as_deref() {
            params.push(("country", country));
        }
        params.push(("limit", "1"));
        params.push(("access_token", token));
        params
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    fn provider_id(&self) -> &'static str {
        "mapbox"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn geocode(&self, address: &AddressQuery<'_>) -> Result<Option<Coordinates>, ProviderError> {
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("mapbox".to_string()))?;

        let url = format!("{}{}", self.config.base_url, FORWARD_PATH);
        log::debug!(
            "[geocode:mapbox] Forward geocoding {}, {}, {}",
            address.street,
            address.city,
            address.region
        );

        let sent = self
            .client
            .get(&url)
            .query(&self.query_params(address, token))
            .header("Accept", "application/json")
            .send()
            .await;

        // A failed connect never reached the provider; anything else may have
        let response = match sent {
            Ok(response) => {
                self.count_request().await;
                response
            }
            Err(e) if e.is_connect() => {
                log::warn!("[geocode:mapbox] Could not connect: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                self.count_request().await;
                return Err(e.into());
            }
        };
        let status = response.status();

        if status == 401 || status == 403 {
            log::warn!("[geocode:mapbox] Authentication failed: HTTP {}", status);
            return Err(ProviderError::Unauthorized(format!(
                "Mapbox rejected the access token (HTTP {})",
                status
            )));
        }

        if status == 429 {
            log::warn!("[geocode:mapbox] Rate limited by provider");
            return Err(ProviderError::RateLimited(
                "Mapbox returned HTTP 429".to_string(),
            ));
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            log::error!("[geocode:mapbox] API error: HTTP {} - {}", status, error_body);
            return Err(ProviderError::ApiError(format!(
                "API returned HTTP {}: {}",
                status, error_body
            )));
        }

        let body = response.text().await?;
        let coordinates = first_coordinates(&body).map_err(|e| {
            log::error!("[geocode:mapbox] Failed to parse API response: {}", e);
            e
        })?;

        if coordinates.is_none() {
            log::debug!("[geocode:mapbox] No features for {}", address.street);
        }

        Ok(coordinates)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::geocoding::testing::FakeUsage;

    #[test]
    fn test_first_coordinates_swaps_lon_lat() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-72.7276, 41.6987]}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}}
            ]
        }"#;

        let coords = first_coordinates(body).unwrap().unwrap();
        assert_eq!(coords.latitude, 41.6987);
        assert_eq!(coords.longitude, -72.7276);
    }

    #[test]
    fn test_first_coordinates_empty() {
        let body = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(first_coordinates(body).unwrap().is_none());
    }

    #[test]
    fn test_first_coordinates_skips_bad_geometry() {
        let body = r#"{"features": [
            {"geometry": null},
            {"geometry": {"coordinates": [1.5]}},
            {"geometry": {"coordinates": [10.0, 20.0]}}
        ]}"#;
        let coords = first_coordinates(body).unwrap().unwrap();
        assert_eq!(coords.latitude, 20.0);
    }

    #[test]
    fn test_first_coordinates_invalid_json() {
        let err = first_coordinates("<html>").unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_query_params_include_optional_fields() {
        let geocoder = MapboxGeocoder::new(
            GeocodeConfig {
                access_token: Some("pk.abc".to_string()),
                ..Default::default()
            },
            Arc::new(FakeUsage::new(10)),
        );
        let address = AddressQuery {
            street: "225 Main St",
            city: "Newington",
            region: "CT",
            postal_code: Some("06111"),
        };

        let params = geocoder.query_params(&address, "pk.abc");
        assert!(params.contains(&("postcode", "06111")));
        assert!(params.contains(&("country", "us")));
        assert!(params.contains(&("limit", "1")));
        assert_eq!(params.last(), Some(&("access_token", "pk.abc")));
    }

    #[tokio::test]
    async fn test_geocode_without_token_is_not_configured() {
        let geocoder = MapboxGeocoder::new(GeocodeConfig::default(), Arc::new(FakeUsage::new(10)));
        assert!(!geocoder.is_configured());

        let address = AddressQuery {
            street: "1 Elm St",
            city: "Dayton",
            region: "OH",
            postal_code: None,
        };
        let err = geocoder.geocode(&address).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
