#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for pkgd
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/pkgd/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

pub mod repository;

pub use repository::{RemoteRepo, RepositoryConfig};

use pkgd_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub queues: QueueConfig,

    #[serde(default)]
    pub interaction: InteractionConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Concurrency limit of each job queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Install / update / uninstall work
    #[serde(default = "default_transaction_concurrency")]
    pub transaction: usize,
    /// Read-only searches
    #[serde(default = "default_search_concurrency")]
    pub search: usize,
    /// Prune
    #[serde(default = "default_serial")]
    pub maintenance: usize,
    /// Repository format migration
    #[serde(default = "default_serial")]
    pub migrate: usize,
}

/// Interaction handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Seconds before an unanswered request cancels its task; 0 waits forever
    #[serde(default = "default_interaction_timeout")]
    pub timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            transaction: default_transaction_concurrency(),
            search: default_search_concurrency(),
            maintenance: default_serial(),
            migrate: default_serial(),
        }
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_interaction_timeout(),
        }
    }
}

impl InteractionConfig {
    /// Deadline applied to interactions, if any
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

// Default value functions for serde
fn default_transaction_concurrency() -> usize {
    1
}

fn default_search_concurrency() -> usize {
    4
}

fn default_serial() -> usize {
    1
}

fn default_interaction_timeout() -> u64 {
    300 // 5 minutes
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("pkgd").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if fs::try_exists(&config_path).await.unwrap_or(false) {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Some(value) = env_usize("PKGD_TRANSACTION_CONCURRENCY")? {
            self.queues.transaction = value;
        }

        if let Some(value) = env_usize("PKGD_SEARCH_CONCURRENCY")? {
            self.queues.search = value;
        }

        if let Ok(timeout) = std::env::var("PKGD_INTERACTION_TIMEOUT") {
            self.interaction.timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "PKGD_INTERACTION_TIMEOUT".to_string(),
                    value: timeout,
                })?;
        }

        if let Ok(repo) = std::env::var("PKGD_DEFAULT_REPO") {
            self.repository.default_repo = repo;
        }

        Ok(())
    }

    /// Reject configurations the coordinator cannot run with
    ///
    /// # Errors
    ///
    /// Returns an error if any queue has zero concurrency or the repository
    /// section is inconsistent.
    pub fn validate(&self) -> Result<(), Error> {
        let limits = [
            ("queues.transaction", self.queues.transaction),
            ("queues.search", self.queues.search),
            ("queues.maintenance", self.queues.maintenance),
            ("queues.migrate", self.queues.migrate),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                }
                .into());
            }
        }

        self.repository.validate()
    }
}

fn env_usize(var: &str) -> Result<Option<usize>, Error> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| {
                ConfigError::InvalidValue {
                    field: var.to_string(),
                    value,
                }
                .into()
            }),
        Err(_) => Ok(None),
    }
}
