use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::finalize::backoff::RetryConfig;

/// Main configuration structure for the picking core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FreepickConfig {
    /// Finalization retry tuning
    pub retry: RetrySettings,
    /// Finalization protocol settings
    pub finalize: FinalizeSettings,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum finalize attempts before surfacing the error
    pub max_attempts: u32,
    /// Base delay for the exponential backoff, in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap, in milliseconds
    pub max_delay_ms: u64,
    /// Randomize retry delays
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: false,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FinalizeSettings {
    /// Age after which another process may take over an in-progress
    /// finalize marker, in seconds
    pub stale_finalize_after_secs: u64,
}

impl Default for FinalizeSettings {
    fn default() -> Self {
        Self {
            stale_finalize_after_secs: 120,
        }
    }
}

impl FinalizeSettings {
    pub fn stale_finalize_after(&self) -> Duration {
        Duration::from_secs(self.stale_finalize_after_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level directive when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_output: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_output: true,
        }
    }
}

impl FreepickConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (freepick.toml)
    /// 3. Environment variables (prefixed with FREEPICK_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("freepick.toml").exists() {
            builder = builder.add_source(File::with_name("freepick"));
        }

        builder = builder.add_source(
            Environment::with_prefix("FREEPICK")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_protocol_constants() {
        let config = FreepickConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 200);
        assert_eq!(config.finalize.stale_finalize_after_secs, 120);
    }

    #[test]
    fn retry_settings_convert_to_runtime_config() {
        let settings = RetrySettings {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: true,
        };
        let retry = settings.to_retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_millis(1_000));
        assert!(retry.jitter);
    }
}
