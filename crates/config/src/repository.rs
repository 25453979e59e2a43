use pkgd_errors::{ConfigError, Error};
use pkgd_types::Arch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A remote package source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepo {
    pub url: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

/// Repository settings exposed through the coordinator's configuration surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default = "default_repo_name")]
    pub default_repo: String,
    #[serde(default = "default_repos")]
    pub repos: BTreeMap<String, RemoteRepo>,
    #[serde(default = "default_channel")]
    pub default_channel: String,
    /// Falls back to the host architecture when unset
    #[serde(default)]
    pub default_arch: Option<Arch>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_repo: default_repo_name(),
            repos: default_repos(),
            default_channel: default_channel(),
            default_arch: None,
        }
    }
}

impl RepositoryConfig {
    /// Effective architecture for references that omit one
    #[must_use]
    pub fn arch(&self) -> Arch {
        self.default_arch.unwrap_or_else(Arch::host)
    }

    /// Check that the default repository is one of the configured ones
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `default_repo` is not a key of
    /// `repos`, or if a repository has an empty URL.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.repos.contains_key(&self.default_repo) {
            return Err(ConfigError::InvalidValue {
                field: "repository.default_repo".to_string(),
                value: self.default_repo.clone(),
            }
            .into());
        }

        if let Some((name, _)) = self.repos.iter().find(|(_, repo)| repo.url.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: format!("repository.repos.{name}.url"),
                value: String::new(),
            }
            .into());
        }

        Ok(())
    }
}

fn default_priority() -> u32 {
    1
}

fn default_repo_name() -> String {
    "stable".to_string()
}

fn default_channel() -> String {
    pkgd_types::package::DEFAULT_CHANNEL.to_string()
}

fn default_repos() -> BTreeMap<String, RemoteRepo> {
    BTreeMap::from([(
        default_repo_name(),
        RemoteRepo {
            url: "https://repo.pkgd.dev".to_string(),
            priority: default_priority(),
        },
    )])
}
