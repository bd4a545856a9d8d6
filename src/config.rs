use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, Result};
use crate::scheduler::SchedulerConfig;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub scheduler: SchedulerSection,
    pub storage: StorageConfig,
}

/// Azure OpenAI connection settings. The API key is only ever read from the
/// environment; endpoint and deployment may be overridden from there too.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: Option<String>,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub ca_cert_path: Option<PathBuf>,
    pub skip_tls_verify: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: "gpt-4.1-mini".to_string(),
            api_version: "2025-04-01-preview".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout_ms: 120000,
            ca_cert_path: None,
            skip_tls_verify: false,
        }
    }
}

/// Scheduler knobs as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub batch_size: usize,
    pub max_requests_per_minute: f64,
    pub max_tokens_per_minute: f64,
    pub max_attempts: u32,
    pub rate_limit_cooldown_secs: u64,
    pub checkpoint_interval: usize,
    pub checkpoint_settle_ms: u64,
    pub poll_interval_ms: u64,
    pub per_item_token_overhead: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            batch_size: defaults.batch_size,
            max_requests_per_minute: defaults.max_requests_per_minute,
            max_tokens_per_minute: defaults.max_tokens_per_minute,
            max_attempts: defaults.max_attempts,
            rate_limit_cooldown_secs: defaults.rate_limit_cooldown.as_secs(),
            checkpoint_interval: defaults.checkpoint_interval,
            checkpoint_settle_ms: defaults.checkpoint_settle.as_millis() as u64,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            per_item_token_overhead: defaults.per_item_token_overhead,
        }
    }
}

impl SchedulerSection {
    /// Convert into the runtime scheduler configuration
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            batch_size: self.batch_size.max(1),
            max_requests_per_minute: self.max_requests_per_minute,
            max_tokens_per_minute: self.max_tokens_per_minute,
            max_attempts: self.max_attempts.max(1),
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            checkpoint_interval: self.checkpoint_interval,
            checkpoint_settle: Duration::from_millis(self.checkpoint_settle_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            per_item_token_overhead: self.per_item_token_overhead,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub checkpoint_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(PROJECT_NAME);
        Self {
            checkpoint_dir: base.join("checkpoints"),
            log_dir: base.join("logs"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            scheduler: SchedulerSection::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(PROJECT_NAME).join(format!("{}.yml", PROJECT_NAME));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", PROJECT_NAME));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| ClassifyError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e)))?;

        let config: Self = serde_yaml::from_str(&content)?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
