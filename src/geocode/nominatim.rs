use crate::error::GeocodeError;
use crate::geocode::Geocoder;
use crate::models::Coordinates;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "nominatim";

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search API. No key, but a real user agent and at
/// most one request per second.
pub struct Nominatim {
    client: Client,
    url: String,
}

impl Nominatim {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create Nominatim client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

/// First hit of a search response
pub fn parse_response(body: &str) -> Result<Option<Coordinates>, GeocodeError> {
    let places: Vec<Place> = serde_json::from_str(body).map_err(|e| GeocodeError::Service {
        provider: PROVIDER,
        message: format!("unexpected response: {e}"),
    })?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    match (place.lat.trim().parse(), place.lon.trim().parse()) {
        (Ok(latitude), Ok(longitude)) => Ok(Some(Coordinates {
            latitude,
            longitude,
        })),
        _ => Err(GeocodeError::Service {
            provider: PROVIDER,
            message: format!("invalid coordinates {}/{}", place.lat, place.lon),
        }),
    }
}

/// The request URL is dropped from the message; it can carry an API key.
pub(crate) fn transport_error(provider: &'static str, err: reqwest::Error) -> GeocodeError {
    if err.is_timeout() {
        GeocodeError::Timeout { provider }
    } else {
        GeocodeError::Service {
            provider,
            message: err.without_url().to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for Nominatim {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(GeocodeError::Service {
                provider: PROVIDER,
                message: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(GeocodeError::Rejected {
                provider: PROVIDER,
                message: format!("HTTP {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        parse_response(&body)
    }
}
