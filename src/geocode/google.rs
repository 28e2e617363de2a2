use crate::error::GeocodeError;
use crate::geocode::nominatim::transport_error;
use crate::geocode::Geocoder;
use crate::models::Coordinates;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "google";

#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    results: Vec<GeoResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeoResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// Google Maps Geocoding API
pub struct GoogleGeocoder {
    client: Client,
    url: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create Google geocoding client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
        })
    }
}

/// Interpret the API `status` field
pub fn parse_response(body: &str) -> Result<Option<Coordinates>, GeocodeError> {
    let response: Response = serde_json::from_str(body).map_err(|e| GeocodeError::Service {
        provider: PROVIDER,
        message: format!("unexpected response: {e}"),
    })?;
    let message = || response.error_message.clone().unwrap_or_else(|| response.status.clone());

    match response.status.as_str() {
        "OK" => Ok(response.results.first().map(|r| Coordinates {
            latitude: r.geometry.location.lat,
            longitude: r.geometry.location.lng,
        })),
        "ZERO_RESULTS" => Ok(None),
        "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => Err(GeocodeError::Service {
            provider: PROVIDER,
            message: message(),
        }),
        _ => Err(GeocodeError::Rejected {
            provider: PROVIDER,
            message: message(),
        }),
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("address", query), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if response.status().is_server_error() {
            return Err(GeocodeError::Service {
                provider: PROVIDER,
                message: format!("HTTP {}", response.status()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_yields_location() {
        let body = r#"{"status":"OK","results":[{"geometry":{"location":{"lat":-15.79,"lng":-47.88}}}]}"#;
        assert_eq!(
            parse_response(body).unwrap(),
            Some(Coordinates {
                latitude: -15.79,
                longitude: -47.88
            })
        );
    }

    #[test]
    fn statuses_map_to_outcomes() {
        assert_eq!(
            parse_response(r#"{"status":"ZERO_RESULTS","results":[]}"#).unwrap(),
            None
        );
        assert!(parse_response(r#"{"status":"OVER_QUERY_LIMIT"}"#)
            .unwrap_err()
            .is_transient());
        let denied = parse_response(
            r#"{"status":"REQUEST_DENIED","error_message":"The provided API key is invalid."}"#,
        )
        .unwrap_err();
        assert!(!denied.is_transient());
        assert!(denied.to_string().contains("API key is invalid"));
    }

    #[tokio::test]
    async fn connection_errors_do_not_expose_the_key() {
        // nothing listens on port 1
        let geocoder = GoogleGeocoder::new(
            "http://127.0.0.1:1/geo",
            "SECRETKEY123".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = geocoder.geocode("SQS 308").await.unwrap_err();
        assert!(err.is_transient());
        assert!(!err.to_string().contains("SECRETKEY123"));
    }
}
