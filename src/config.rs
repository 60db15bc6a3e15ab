//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/ragbridge.sqlite"
//!
//! [collector]
//! retry_attempts = 3
//! retry_delay_ms = 1000
//!
//! [providers]
//! timeout_secs = 30
//!
//! [retrieval]
//! search_limit = 5
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [logging]
//! filter = "info"
//! ```
//!
//! Only `[db]` is required; every other section has defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Retry behaviour of the datasource collector.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Total `get_data` attempts per run, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fixed wait between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl CollectorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}

/// Settings applied to every HTTP-backed provider.
#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Documents retrieved per question; also the context window size.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
    /// Overrides the built-in prompt template.
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            prompt_template: None,
        }
    }
}

fn default_search_limit() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Check cross-field invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.collector.retry_attempts == 0 {
            anyhow::bail!("collector.retry_attempts must be > 0");
        }
        if self.retrieval.search_limit == 0 {
            anyhow::bail!("retrieval.search_limit must be >= 1");
        }
        if self.providers.timeout_secs == 0 {
            anyhow::bail!("providers.timeout_secs must be > 0");
        }
        if let Some(ref template) = self.retrieval.prompt_template {
            if !template.contains("{{query}}") {
                anyhow::bail!("retrieval.prompt_template must contain {{{{query}}}}");
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
