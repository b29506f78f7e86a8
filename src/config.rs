use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SweepError};
use crate::query::FolderExclusions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Ceiling on candidate messages fetched per rule
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Folders excluded from every rule's search
    #[serde(default)]
    pub exclusions: FolderExclusions,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            exclusions: FolderExclusions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Provider's published call ceiling
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
    /// Fraction of the ceiling the engine actually uses
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
            safety_factor: default_safety_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    /// Simulate actions without mutating the mailbox
    #[serde(default)]
    pub dry_run: bool,
}

fn default_max_results() -> usize {
    500
}

fn default_calls_per_minute() -> u32 {
    // Gmail grants 15,000 quota units/min per user; list and get cost
    // ~5 units each, so ~3000 calls/min nominal.
    3000
}

fn default_safety_factor() -> f64 {
    crate::rate_limiter::DEFAULT_SAFETY_FACTOR
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SweepError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SweepError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SweepError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SweepError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| SweepError::ConfigError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.max_results == 0 {
            return Err(SweepError::ConfigError(
                "search.max_results must be greater than zero".to_string(),
            ));
        }

        if self.quota.calls_per_minute == 0 {
            return Err(SweepError::ConfigError(
                "quota.calls_per_minute must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.quota.safety_factor) || self.quota.safety_factor == 0.0 {
            return Err(SweepError::ConfigError(
                "quota.safety_factor must be in (0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    /// Write a commented example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let example = r#"# mailsweep configuration

[search]
# Ceiling on candidate messages fetched per rule
max_results = 500

[search.exclusions]
# Folders excluded from every rule's search
trash = true
spam = true
drafts = true
sent = false

[quota]
# Provider's published call ceiling and the fraction of it to use
calls_per_minute = 3000
safety_factor = 0.8

[execution]
# Simulate actions without mutating the mailbox
dry_run = false
"#;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SweepError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        tokio::fs::write(path, example)
            .await
            .map_err(|e| SweepError::ConfigError(format!("Failed to write example config: {}", e)))?;

        Ok(())
    }
}
