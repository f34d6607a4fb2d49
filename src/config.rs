use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::RetryConfig;

/// Main configuration structure for labflow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabflowConfig {
    /// Result store client settings
    pub store: StoreConfig,
    /// Workflow engine settings
    pub workflow: WorkflowConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Attempts per store call in the retrying client, including the first
    pub retry_max_attempts: u32,
    /// Fixed wait between attempts in milliseconds (the ambient
    /// token-refresh window)
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Backoff before the single completion retry, in milliseconds
    pub complete_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
}

impl Default for LabflowConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                retry_max_attempts: 2,
                retry_delay_ms: 1500,
            },
            workflow: WorkflowConfig {
                complete_retry_delay_ms: 1500,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
        }
    }
}

impl LabflowConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. Configuration file (labflow.toml)
    /// 3. Environment variables (prefixed with LABFLOW_)
    pub fn load() -> Result<Self> {
        let defaults = LabflowConfig::default();
        let mut builder = Config::builder()
            .set_default(
                "store.retry_max_attempts",
                defaults.store.retry_max_attempts as i64,
            )?
            .set_default("store.retry_delay_ms", defaults.store.retry_delay_ms as i64)?
            .set_default(
                "workflow.complete_retry_delay_ms",
                defaults.workflow.complete_retry_delay_ms as i64,
            )?
            .set_default("observability.log_level", defaults.observability.log_level)?;

        if Path::new("labflow.toml").exists() {
            builder = builder.add_source(File::with_name("labflow"));
        }

        builder = builder.add_source(
            Environment::with_prefix("LABFLOW")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Retry settings for the store client decorator.
    pub fn store_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.store.retry_max_attempts,
            delay: std::time::Duration::from_millis(self.store.retry_delay_ms),
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<LabflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = LabflowConfig::load_env_file();
        LabflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static LabflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_retry_windows() {
        let config = LabflowConfig::default();
        assert_eq!(config.store.retry_max_attempts, 2);
        assert_eq!(config.store.retry_delay_ms, 1500);
        assert_eq!(config.workflow.complete_retry_delay_ms, 1500);
        let retry = config.store_retry();
        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.delay, std::time::Duration::from_millis(1500));
    }
}
