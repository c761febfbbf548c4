//! Configuration management
//!
//! Settings live in a TOML file, `config.toml`, inside the config directory.
//! The directory is `$MM_CONFIG_DIR` when set, otherwise the platform config
//! directory joined with `multimanager`. A missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use tokio::sync::Semaphore;

use crate::traits::{DEFAULT_PART_CONCURRENCY, DEFAULT_PART_SIZE, MAX_PART_SIZE, TransferOptions};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "MM_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";
const MIB: u64 = 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// AWS connection settings; unset fields fall back to the SDK default chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores or local DynamoDB
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Transfer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub part_size_mib: u64,
    pub concurrency: usize,
    /// Cap on concurrent objects per batch; absent means unbounded
    pub max_in_flight: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            part_size_mib: DEFAULT_PART_SIZE / MIB,
            concurrency: DEFAULT_PART_CONCURRENCY,
            max_in_flight: None,
        }
    }
}

/// Delete retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries on throttling; `-1` retries forever
    pub retries: i64,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            retries: policy.retries,
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

impl Config {
    /// Check values that would otherwise only fail at call time
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.aws.endpoint_url {
            url::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("invalid endpoint_url '{endpoint}': {e}")))?;
        }

        if self.aws.access_key.is_some() != self.aws.secret_key.is_some() {
            return Err(Error::Config(
                "access_key and secret_key must be set together".to_string(),
            ));
        }

        if self.transfer.part_size_mib == 0 {
            return Err(Error::Config("part_size_mib must be positive".to_string()));
        }
        if self.transfer.part_size_mib > MAX_PART_SIZE / MIB {
            return Err(Error::Config(format!(
                "part_size_mib must be at most {}",
                MAX_PART_SIZE / MIB
            )));
        }

        match self.transfer.max_in_flight {
            Some(0) => {
                return Err(Error::Config("max_in_flight must be positive".to_string()));
            }
            Some(max) if max > Semaphore::MAX_PERMITS => {
                return Err(Error::Config(format!(
                    "max_in_flight must be at most {}",
                    Semaphore::MAX_PERMITS
                )));
            }
            _ => {}
        }

        self.retry_policy().budget()?;
        Ok(())
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            part_size: self
                .transfer
                .part_size_mib
                .checked_mul(MIB)
                .unwrap_or(MAX_PART_SIZE),
            concurrency: self.transfer.concurrency,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.retries,
            Duration::from_millis(self.retry.backoff_ms),
        )
    }
}

/// Loads and saves the config file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Resolve the config file location from the environment
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?
                .join("multimanager"),
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    /// Use an explicit config file path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, returning defaults when the file does not exist
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml"));

        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.transfer_options(), TransferOptions::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.toml"));

        let mut config = Config::default();
        config.aws.region = Some("eu-west-1".to_string());
        config.aws.endpoint_url = Some("http://localhost:8000".to_string());
        config.transfer.max_in_flight = Some(16);
        config.retry.retries = -1;

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nretries = 10\n").unwrap();

        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.retry.retries, 10);
        assert_eq!(config.retry.backoff_ms, 100);
        assert_eq!(config.transfer.part_size_mib, 8);
    }

    #[test]
    fn test_invalid_retries_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nretries = -2\n").unwrap();

        let err = ConfigManager::with_path(&path).load().unwrap_err();
        assert!(matches!(err, Error::InvalidRetry(-2)));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = Config::default();
        config.aws.endpoint_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut config = Config::default();
        config.aws.access_key = Some("AKIA".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_part_size_upper_bound() {
        let mut config = Config::default();
        config.transfer.part_size_mib = 5120;
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer_options().part_size, MAX_PART_SIZE);

        config.transfer.part_size_mib = 5121;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        // Unvalidated values must not overflow
        config.transfer.part_size_mib = 1 << 45;
        assert!(config.validate().is_err());
        assert_eq!(config.transfer_options().effective_part_size(), MAX_PART_SIZE);
    }

    #[test]
    fn test_max_in_flight_bounds() {
        let mut config = Config::default();
        config.transfer.max_in_flight = Some(Semaphore::MAX_PERMITS);
        assert!(config.validate().is_ok());

        config.transfer.max_in_flight = Some(usize::MAX);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_in_flight must be at most"));
    }

    #[test]
    fn test_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[transfer\n").unwrap();

        let err = ConfigManager::with_path(&path).load().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
