#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Repository collaborator for pkgd
//!
//! The transaction core never touches storage directly. It drives a
//! [`Repository`] through a small async interface: resolve metadata,
//! fetch and commit module content, remove it, count reverse
//! dependencies and take exclusive access for format migrations.
//! [`MemoryRepository`] is a content-addressed in-process implementation
//! used by the CLI and the tests.

mod archive;
mod catalogue;
mod content;
mod memory;

pub use archive::{ArchiveFormat, ArchiveParser, ManifestArchiveParser, ParsedArchive};
pub use catalogue::{Catalogue, CatalogueEntry};
pub use content::{ContentId, PackageContent};
pub use memory::{MemoryRepository, CURRENT_FORMAT};

use async_trait::async_trait;
use pkgd_config::RepositoryConfig;
use pkgd_errors::Error;
use pkgd_types::{Arch, Module, ModuleRef, PackageInfo, PackageReference};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A module committed into the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub info: PackageInfo,
    pub module: Module,
    pub content_id: ContentId,
}

impl InstalledPackage {
    #[must_use]
    pub fn module_ref(&self) -> ModuleRef {
        ModuleRef::new(self.info.reference.clone(), self.module.clone())
    }
}

/// Result of a format migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub from_format: u32,
    pub to_format: u32,
}

impl Migration {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from_format == self.to_format
    }
}

/// Search parameters; `text` matches names and descriptions case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub arch: Option<Arch>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matches(&self, info: &PackageInfo) -> bool {
        let reference = &info.reference;
        if self.channel.as_ref().is_some_and(|c| c != &reference.channel) {
            return false;
        }
        if self.arch.is_some_and(|a| a != reference.arch) {
            return false;
        }
        let needle = self.text.to_lowercase();
        reference.name.to_lowercase().contains(&needle)
            || info
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Content-addressed package store consumed by the transaction core
///
/// Implementations own their retry policy; the core surfaces any error
/// as a failed task without retrying.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Metadata for an exact reference
    async fn resolve(&self, reference: &PackageReference) -> Result<PackageInfo, Error>;

    /// Content of one module of a published package
    async fn fetch(&self, target: &ModuleRef) -> Result<PackageContent, Error>;

    /// Atomically make `module` of `info` installed
    async fn commit(
        &self,
        info: &PackageInfo,
        module: &Module,
        content: PackageContent,
    ) -> Result<(), Error>;

    async fn remove(&self, target: &ModuleRef) -> Result<(), Error>;

    async fn installed(&self) -> Result<Vec<InstalledPackage>, Error>;

    /// Number of installed packages that depend on `reference`
    async fn referrers(&self, reference: &PackageReference) -> Result<usize, Error>;

    async fn begin_exclusive(&self) -> Result<(), Error>;

    async fn end_exclusive(&self) -> Result<(), Error>;

    async fn format_version(&self) -> Result<u32, Error>;

    /// Upgrade the storage format; only valid between begin/end exclusive
    async fn migrate(&self) -> Result<Migration, Error>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<PackageInfo>, Error>;

    async fn configuration(&self) -> Result<RepositoryConfig, Error>;

    async fn configure(&self, config: RepositoryConfig) -> Result<(), Error>;

    /// The installed entry for exactly `target`, if any
    async fn installed_entry(&self, target: &ModuleRef) -> Result<Option<InstalledPackage>, Error> {
        Ok(self
            .installed()
            .await?
            .into_iter()
            .find(|entry| &entry.module_ref() == target))
    }
}
