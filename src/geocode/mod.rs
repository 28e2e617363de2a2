//! Address to coordinates, with fallback between simplified queries and
//! between providers.

pub mod address;
pub mod google;
pub mod nominatim;

use crate::config::{GeocodeConfig, GeocodeProvider, HttpConfig};
use crate::error::GeocodeError;
use crate::models::Coordinates;
use address::query_variants;
use anyhow::Result;
use async_trait::async_trait;
use google::GoogleGeocoder;
use nominatim::Nominatim;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// A geocoding provider
#[async_trait]
pub trait Geocoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the provider has no match for `query`
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Providers tried in order, each with every query variant of an address.
///
/// Requests are spaced by at least `min_interval`. A timeout or service error
/// is retried once; a rejected request skips the rest of that provider.
pub struct GeocodeChain {
    providers: Vec<Box<dyn Geocoder>>,
    region: String,
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl GeocodeChain {
    pub fn new(providers: Vec<Box<dyn Geocoder>>, region: &str, min_interval: Duration) -> Self {
        Self {
            providers,
            region: region.to_string(),
            min_interval,
            last_request: None,
        }
    }

    /// Build the configured providers. Google is left out when its API key is
    /// not set.
    pub fn from_config(config: &GeocodeConfig, http: &HttpConfig) -> Result<Self> {
        let mut order = vec![config.primary];
        if let Some(secondary) = config.secondary.filter(|s| *s != config.primary) {
            order.push(secondary);
        }

        let mut providers: Vec<Box<dyn Geocoder>> = Vec::new();
        for provider in order {
            match provider {
                GeocodeProvider::Nominatim => providers.push(Box::new(Nominatim::new(
                    &config.nominatim_url,
                    &http.user_agent,
                    http.timeout(),
                )?)),
                GeocodeProvider::Google => match std::env::var(&config.google_api_key_env) {
                    Ok(key) if !key.trim().is_empty() => providers.push(Box::new(
                        GoogleGeocoder::new(&config.google_url, key, http.timeout())?,
                    )),
                    _ => warn!(
                        env = %config.google_api_key_env,
                        "Google API key not set, skipping Google geocoding"
                    ),
                },
            }
        }

        info!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "Geocoding providers ready"
        );
        Ok(Self::new(providers, &config.region, config.min_interval()))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            sleep_until(last + self.min_interval).await;
        }
        self.last_request = Some(Instant::now());
    }

    async fn query(
        &mut self,
        index: usize,
        query: &str,
    ) -> Result<Option<Coordinates>, GeocodeError> {
        self.throttle().await;
        match self.providers[index].geocode(query).await {
            Err(e) if e.is_transient() => {
                debug!(query, error = %e, "Transient geocoding error, retrying once");
                self.throttle().await;
                self.providers[index].geocode(query).await
            }
            other => other,
        }
    }

    /// Coordinates for `text`, or `None` when no provider finds it.
    /// Provider failures are logged, never returned.
    pub async fn locate(&mut self, text: &str) -> Option<Coordinates> {
        let variants = query_variants(text, &self.region);
        if variants.is_empty() {
            return None;
        }

        for index in 0..self.providers.len() {
            let provider = self.providers[index].name();
            for query in &variants {
                match self.query(index, query).await {
                    Ok(Some(coords)) => {
                        debug!(provider, query = %query, "Geocoded");
                        return Some(coords);
                    }
                    Ok(None) => debug!(provider, query = %query, "No match"),
                    Err(e @ GeocodeError::Rejected { .. }) => {
                        warn!(provider, error = %e, "Provider rejected request, trying next provider");
                        break;
                    }
                    Err(e) => warn!(provider, query = %query, error = %e, "Geocoding failed"),
                }
            }
        }

        debug!(text, "No coordinates found");
        None
    }
}
