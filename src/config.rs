//! Layered configuration: built-in defaults, then `imoveis.toml` in the
//! working directory (or the file passed with `--config`), then `IMOVEIS_*`
//! environment variables with `__` separating nested keys
//! (`IMOVEIS_SCRAPE__WORKERS=6`).

use crate::error::ConfigError;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "imoveis.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub scrape: ScrapeConfig,
    pub retry: RetryConfig,
    pub geocode: GeocodeConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Time a browser-rendered page gets after navigation, seconds
    pub browser_settle_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:92.0) Gecko/20100101 Firefox/92.0"
                .to_string(),
            timeout_secs: 30,
            browser_settle_secs: 4,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn browser_settle(&self) -> Duration {
        Duration::from_secs(self.browser_settle_secs)
    }
}

/// Pagination and batching of a scrape run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Pages fetched concurrently
    pub workers: usize,
    /// Pages per checkpointed batch
    pub batch_size: usize,
    /// Pause between batches, seconds
    pub batch_delay_secs: f64,
    /// Random spread applied to the pause, seconds (±)
    pub batch_delay_jitter_secs: f64,
    /// Consecutive empty pages that mark the end of results
    pub empty_page_threshold: usize,
    pub max_pages: Option<usize>,
    pub output_dir: PathBuf,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            batch_size: 30,
            batch_delay_secs: 30.0,
            batch_delay_jitter_secs: 5.0,
            empty_page_threshold: 2,
            max_pages: None,
            output_dir: PathBuf::from("dataset"),
        }
    }
}

impl ScrapeConfig {
    pub fn batch_delay(&self) -> Duration {
        let jitter = if self.batch_delay_jitter_secs > 0.0 {
            use rand::Rng;
            rand::thread_rng()
                .gen_range(-self.batch_delay_jitter_secs..=self.batch_delay_jitter_secs)
        } else {
            0.0
        };
        Duration::from_secs_f64((self.batch_delay_secs + jitter).max(0.0))
    }
}

/// Exponential backoff for page requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2_000,
            backoff_factor: 2.0,
            max_delay_ms: 120_000,
            jitter_min: 0.5,
            jitter_max: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodeProvider {
    Nominatim,
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    pub primary: GeocodeProvider,
    /// Used when the primary provider finds nothing; Google needs an API key
    pub secondary: Option<GeocodeProvider>,
    /// Pause between provider requests, milliseconds
    pub min_interval_ms: u64,
    /// Appended to simplified address queries
    pub region: String,
    pub nominatim_url: String,
    pub google_url: String,
    /// Name of the environment variable holding the Google API key
    pub google_api_key_env: String,
    /// Records geocoded before each checkpoint flush
    pub batch_size: usize,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            primary: GeocodeProvider::Nominatim,
            secondary: Some(GeocodeProvider::Google),
            min_interval_ms: 1_100,
            region: "Brasília, DF, Brasil".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org/search".to_string(),
            google_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            google_api_key_env: "GOOGLE_MAPS_API_KEY".to_string(),
            batch_size: 50,
        }
    }
}

impl GeocodeConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub pipeline_dir: PathBuf,
    pub mongo_cluster: String,
    pub database: String,
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pipeline_dir: PathBuf::from("pipeline"),
            mongo_cluster: "cluster0.mhq2j.mongodb.net".to_string(),
            database: "housingprices".to_string(),
            collection: "property_listings".to_string(),
        }
    }
}

/// Load configuration from defaults, an optional TOML file and the environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    let file = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if file.exists() {
        figment = figment.merge(Toml::file(&file));
    }

    figment = figment.merge(Env::prefixed("IMOVEIS_").split("__"));

    figment
        .extract()
        .map_err(|e| ConfigError::Invalid(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_every_section() {
        let config = AppConfig::default();
        assert_eq!(config.scrape.empty_page_threshold, 2);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.geocode.primary, GeocodeProvider::Nominatim);
        assert_eq!(config.storage.collection, "property_listings");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scrape]\nworkers = 6\nbatch_size = 45\n\n[geocode]\nprimary = \"google\""
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.scrape.workers, 6);
        assert_eq!(config.scrape.batch_size, 45);
        assert_eq!(config.scrape.empty_page_threshold, 2);
        assert_eq!(config.geocode.primary, GeocodeProvider::Google);
    }

    #[test]
    fn invalid_values_keep_their_source() {
        use anyhow::Context;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scrape]\nworkers = \"many\"").unwrap();

        let err = load_config(Some(file.path()))
            .context("Failed to load configuration")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(_))
        ));
        assert!(format!("{err:#}").contains("workers"));
    }

    #[test]
    fn batch_delay_stays_within_jitter() {
        let scrape = ScrapeConfig {
            batch_delay_secs: 10.0,
            batch_delay_jitter_secs: 5.0,
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = scrape.batch_delay().as_secs_f64();
            assert!((5.0..=15.0).contains(&delay));
        }
    }
}
