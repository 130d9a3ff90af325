//! Layered configuration for the embedding engine (§6).
//!
//! Precedence, highest to lowest: environment variables > TOML config file
//! > built-in defaults. Mirrors the precedence model used across the wider
//! configuration layer this crate is derived from, trimmed to the handful
//! of settings this core actually reads.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_provider_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_cache_backend() -> CacheBackendKind {
    CacheBackendKind::Memory
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_batch_inter_call_delay_ms() -> u64 {
    100
}

fn default_store_backend() -> StoreBackendKind {
    StoreBackendKind::Memory
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "PipelineSettings::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "PipelineSettings::default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "PipelineSettings::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "PipelineSettings::default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl PipelineSettings {
    fn default_batch_size() -> usize {
        50
    }
    fn default_max_workers() -> usize {
        5
    }
    fn default_retry_attempts() -> u32 {
        3
    }
    fn default_retry_delay_secs() -> u64 {
        5
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            max_workers: Self::default_max_workers(),
            retry_attempts: Self::default_retry_attempts(),
            retry_delay_secs: Self::default_retry_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "SearchSettings::default_limit")]
    pub default_limit: usize,
    #[serde(default = "SearchSettings::default_threshold")]
    pub default_threshold: f32,
    #[serde(default = "SearchSettings::default_similar_threshold")]
    pub similar_to_record_default_threshold: f32,
}

impl SearchSettings {
    fn default_limit() -> usize {
        10
    }
    fn default_threshold() -> f32 {
        0.7
    }
    fn default_similar_threshold() -> f32 {
        0.5
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: Self::default_limit(),
            default_threshold: Self::default_threshold(),
            similar_to_record_default_threshold: Self::default_similar_threshold(),
        }
    }
}

/// Top-level settings, assembled once at startup and passed down explicitly
/// to the service and pipeline constructors (§9 "Global client singletons").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub provider_api_key: Option<String>,
    #[serde(default = "default_provider_url")]
    pub provider_url: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackendKind,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    pub redis_url: Option<String>,

    #[serde(default = "default_batch_inter_call_delay_ms")]
    pub batch_inter_call_delay_ms: u64,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackendKind,
    pub postgres_dsn: Option<String>,

    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_api_key: None,
            provider_url: default_provider_url(),
            provider_timeout_secs: default_provider_timeout_secs(),
            cache_backend: default_cache_backend(),
            cache_ttl_secs: default_cache_ttl_secs(),
            redis_url: None,
            batch_inter_call_delay_ms: default_batch_inter_call_delay_ms(),
            store_backend: default_store_backend(),
            postgres_dsn: None,
            pipeline: PipelineSettings::default(),
            search: SearchSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn batch_inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.batch_inter_call_delay_ms)
    }

    /// Load from an optional TOML file, then overlay `EMBEDDING_*`
    /// environment variables, then validate. Defaults fill in the rest.
    pub fn load(file_path: Option<&Path>) -> Result<Self, crate::error::EmbeddingError> {
        let mut settings = match file_path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    crate::error::EmbeddingError::ConfigMissing(format!(
                        "failed to read {}: {e}",
                        path.display()
                    ))
                })?;
                toml::from_str(&raw).map_err(|e| {
                    crate::error::EmbeddingError::ConfigMissing(format!(
                        "invalid config file {}: {e}",
                        path.display()
                    ))
                })?
            }
            _ => Settings::default(),
        };

        settings.overlay_env();
        settings.validate()?;
        Ok(settings)
    }

    fn overlay_env(&mut self) {
        if let Ok(key) = std::env::var("EMBEDDING_PROVIDER_API_KEY") {
            self.provider_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("EMBEDDING_PROVIDER_URL") {
            self.provider_url = url;
        }
        if let Ok(secs) = std::env::var("EMBEDDING_PROVIDER_TIMEOUT_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.provider_timeout_secs = parsed;
            }
        }
        if let Ok(url) = std::env::var("EMBEDDING_REDIS_URL") {
            self.redis_url = Some(url);
            self.cache_backend = CacheBackendKind::Redis;
        }
        if let Ok(dsn) = std::env::var("EMBEDDING_POSTGRES_DSN") {
            self.postgres_dsn = Some(dsn);
            self.store_backend = StoreBackendKind::Postgres;
        }
        if let Ok(level) = std::env::var("EMBEDDING_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// `ConfigMissing` is fatal at startup (§7): a postgres/redis backend
    /// selected without its connection string is refused here rather than
    /// discovered lazily on first use.
    fn validate(&self) -> Result<(), crate::error::EmbeddingError> {
        if self.store_backend == StoreBackendKind::Postgres && self.postgres_dsn.is_none() {
            return Err(crate::error::EmbeddingError::ConfigMissing(
                "store_backend = postgres requires postgres_dsn".into(),
            ));
        }
        if self.cache_backend == CacheBackendKind::Redis && self.redis_url.is_none() {
            return Err(crate::error::EmbeddingError::ConfigMissing(
                "cache_backend = redis requires redis_url".into(),
            ));
        }
        Ok(())
    }
}
