//! Client configuration.
//!
//! Stored as TOML. Every field has a default, so a partial file (or an
//! empty one) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gnfd_transfer::RetryPolicy;
use gnfd_types::RedundancyParams;
use gnfd_types::constants::{
    DEFAULT_DATA_SHARDS, DEFAULT_MAX_ATTEMPTS, DEFAULT_PARALLELISM, DEFAULT_PARITY_SHARDS,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SEGMENT_SIZE,
};
use serde::{Deserialize, Serialize};

/// Errors from loading, saving or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Segment size in bytes.
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Segments in flight per transfer.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Attempts per segment, the first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_data_shards")]
    pub data_shards: usize,

    #[serde(default = "default_parity_shards")]
    pub parity_shards: usize,

    /// Use HTTPS for provider endpoints registered without a scheme.
    #[serde(default)]
    pub secure: bool,

    /// Directory for resume checkpoints. Without one, checkpoints only live
    /// as long as the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_dir: Option<PathBuf>,
}

fn default_part_size() -> u64 {
    DEFAULT_SEGMENT_SIZE
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_data_shards() -> usize {
    DEFAULT_DATA_SHARDS
}

fn default_parity_shards() -> usize {
    DEFAULT_PARITY_SHARDS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            parallelism: default_parallelism(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_factor: default_backoff_factor(),
            request_timeout_secs: default_request_timeout_secs(),
            data_shards: default_data_shards(),
            parity_shards: default_parity_shards(),
            secure: false,
            checkpoint_dir: None,
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.part_size == 0 {
            return Err(invalid("part_size", "must be greater than zero"));
        }
        if self.parallelism == 0 {
            return Err(invalid("parallelism", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(invalid("backoff_factor", "must be >= 1.0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than zero"));
        }
        if self.data_shards == 0 || self.parity_shards == 0 {
            return Err(invalid("data_shards/parity_shards", "must be positive"));
        }
        Ok(())
    }

    /// Resolves the per-transfer options.
    pub fn transfer_options(&self) -> Result<TransferOptions, ConfigError> {
        self.validate()?;
        Ok(TransferOptions {
            part_size: self.part_size,
            parallelism: self.parallelism,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                backoff_factor: self.backoff_factor,
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            redundancy: RedundancyParams {
                data_shards: self.data_shards,
                parity_shards: self.parity_shards,
            },
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Options shared by every transfer started from one client.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub part_size: u64,
    pub parallelism: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub redundancy: RedundancyParams,
}
