//! Configuration loading for the tideline engine.
//!
//! Configuration is loaded from a TOML file. Every key is optional; missing
//! keys take the defaults below.
//!
//! ```toml
//! page_size = 20
//! prefetch_margin = 5
//! warm_ahead = 5
//! pending_capacity = 200
//! max_newer_pages = 5
//!
//! [reconnect]
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//! jitter_ms = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use feed_core::{ReconnectPolicy, TimelineConfig};

/// Root configuration for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Limit passed with every page request (default: 20).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Prefetch trigger margin in entries (default: 5).
    #[serde(default = "default_prefetch_margin")]
    pub prefetch_margin: usize,
    /// Entries below the viewport reported for warm-loading (default: 5).
    #[serde(default = "default_warm_ahead")]
    pub warm_ahead: usize,
    /// Maximum withheld stream entries (default: 200).
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
    /// Newer pages fetched before falling back to a full refresh (default: 5).
    #[serde(default = "default_max_newer_pages")]
    pub max_newer_pages: usize,
    /// Stream reconnection backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Stream reconnection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Backoff unit, doubled on every attempt (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Maximum random jitter added to each delay (default: 1000).
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

// Default value functions
fn default_page_size() -> usize {
    20
}

fn default_prefetch_margin() -> usize {
    5
}

fn default_warm_ahead() -> usize {
    5
}

fn default_pending_capacity() -> usize {
    feed_core::DEFAULT_PENDING_CAPACITY
}

fn default_max_newer_pages() -> usize {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            prefetch_margin: default_prefetch_margin(),
            warm_ahead: default_warm_ahead(),
            pending_capacity: default_pending_capacity(),
            max_newer_pages: default_max_newer_pages(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.pending_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pending_capacity must be at least 1".into(),
            ));
        }
        if self.max_newer_pages == 0 {
            return Err(ConfigError::Invalid(
                "max_newer_pages must be at least 1".into(),
            ));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "reconnect.base_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Tunables for the pure timeline.
    pub fn timeline(&self) -> TimelineConfig {
        TimelineConfig {
            page_size: self.page_size,
            prefetch_margin: self.prefetch_margin,
            warm_ahead: self.warm_ahead,
            pending_capacity: self.pending_capacity,
        }
    }
}

impl ReconnectConfig {
    /// Backoff policy for the stream state machine.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
