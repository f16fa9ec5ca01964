//! Persistent resolver configuration model and defaults.

use std::path::Path;
use std::time::Duration;

use log::{info, warn};

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Per-upstream request spacing and retry policy.
    pub network: NetworkConfig,
    #[serde(default)]
    /// Resolution engine tunables.
    pub resolution: ResolutionConfig,
    #[serde(default)]
    /// Upstream credentials. Empty values fall back to the system keyring.
    pub credentials: CredentialsConfig,
}

/// Request spacing, retry and timeout settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_spotify_interval_ms")]
    pub spotify_interval_ms: u64,
    #[serde(default = "default_wikipedia_interval_ms")]
    pub wikipedia_interval_ms: u64,
    #[serde(default = "default_wikidata_interval_ms")]
    pub wikidata_interval_ms: u64,
    #[serde(default = "default_musicbrainz_interval_ms")]
    pub musicbrainz_interval_ms: u64,
    #[serde(default = "default_ai_interval_ms")]
    pub ai_interval_ms: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Resolution engine preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ResolutionConfig {
    /// Biography length that stops further biography-only lookups.
    #[serde(default = "default_min_biography_chars")]
    pub min_biography_chars: usize,
    #[serde(default)]
    pub ai_research_enabled: bool,
    #[serde(default = "default_true")]
    pub resolve_wikidata_labels: bool,
    #[serde(default = "default_batch_workers")]
    pub batch_workers: usize,
}

/// Opaque upstream secrets.
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub spotify_client_id: String,
    #[serde(default)]
    pub spotify_client_secret: String,
    #[serde(default)]
    pub perplexity_api_key: String,
    #[serde(default = "default_perplexity_model")]
    pub perplexity_model: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            spotify_interval_ms: default_spotify_interval_ms(),
            wikipedia_interval_ms: default_wikipedia_interval_ms(),
            wikidata_interval_ms: default_wikidata_interval_ms(),
            musicbrainz_interval_ms: default_musicbrainz_interval_ms(),
            ai_interval_ms: default_ai_interval_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            min_biography_chars: default_min_biography_chars(),
            ai_research_enabled: false,
            resolve_wikidata_labels: true,
            batch_workers: default_batch_workers(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_spotify_interval_ms() -> u64 {
    600
}

fn default_wikipedia_interval_ms() -> u64 {
    1_000
}

fn default_wikidata_interval_ms() -> u64 {
    1_000
}

fn default_musicbrainz_interval_ms() -> u64 {
    1_000
}

fn default_ai_interval_ms() -> u64 {
    2_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_min_biography_chars() -> usize {
    200
}

fn default_batch_workers() -> usize {
    2
}

fn default_perplexity_model() -> String {
    "sonar-pro".to_string()
}

const MAX_BATCH_WORKERS: usize = 8;
const MAX_INTERVAL_MS: u64 = 60_000;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Clamps values that would break the rate or retry invariants.
pub fn sanitize_config(config: Config) -> Config {
    let mut sanitized = config;
    let network = &mut sanitized.network;
    for interval in [
        &mut network.spotify_interval_ms,
        &mut network.wikipedia_interval_ms,
        &mut network.wikidata_interval_ms,
        &mut network.musicbrainz_interval_ms,
        &mut network.ai_interval_ms,
    ] {
        *interval = (*interval).min(MAX_INTERVAL_MS);
    }
    // Total attempts stay within 2..=5.
    network.max_retries = network.max_retries.clamp(1, 4);
    network.retry_base_delay_ms = network.retry_base_delay_ms.min(4_000);
    network.request_timeout_secs = network.request_timeout_secs.clamp(1, MAX_REQUEST_TIMEOUT_SECS);

    let resolution = &mut sanitized.resolution;
    resolution.batch_workers = resolution.batch_workers.clamp(1, MAX_BATCH_WORKERS);
    resolution.min_biography_chars = resolution.min_biography_chars.max(1);

    let credentials = &mut sanitized.credentials;
    credentials.spotify_client_id = credentials.spotify_client_id.trim().to_string();
    credentials.spotify_client_secret = credentials.spotify_client_secret.trim().to_string();
    credentials.perplexity_api_key = credentials.perplexity_api_key.trim().to_string();
    if credentials.perplexity_model.trim().is_empty() {
        credentials.perplexity_model = default_perplexity_model();
    }
    sanitized
}

/// Reads `path`, writing a default file first when none exists.
pub fn load_or_create(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create config dir: {err}"))?;
        }
        let serialized = toml::to_string(&Config::default())
            .map_err(|err| format!("failed to serialize default config: {err}"))?;
        std::fs::write(path, serialized)
            .map_err(|err| format!("failed to write default config: {err}"))?;
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
    let parsed = toml::from_str::<Config>(&content).unwrap_or_else(|err| {
        warn!("Config file is invalid, using defaults: {err}");
        Config::default()
    });
    Ok(sanitize_config(parsed))
}
