//! In-process content-addressed repository

use crate::{
    Catalogue, ContentId, InstalledPackage, Migration, PackageContent, Repository, SearchQuery,
};
use async_trait::async_trait;
use pkgd_config::RepositoryConfig;
use pkgd_errors::{Error, RepositoryError};
use pkgd_types::{Module, ModuleRef, PackageInfo, PackageReference};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Storage format written by this build
pub const CURRENT_FORMAT: u32 = 2;

#[derive(Debug, Clone)]
struct Published {
    info: PackageInfo,
    modules: BTreeMap<Module, PackageContent>,
}

#[derive(Debug, Default)]
struct State {
    catalogue: BTreeMap<PackageReference, Published>,
    installed: BTreeMap<ModuleRef, InstalledPackage>,
    /// Content id -> payload; collected once no installed entry points at it
    objects: HashMap<ContentId, Vec<u8>>,
    format: u32,
    config: RepositoryConfig,
}

/// Repository keeping published packages, installed modules and blobs in
/// memory
#[derive(Debug)]
pub struct MemoryRepository {
    state: RwLock<State>,
    exclusive: AtomicBool,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new(RepositoryConfig::default())
    }
}

impl MemoryRepository {
    #[must_use]
    pub fn new(config: RepositoryConfig) -> Self {
        Self::with_format(config, CURRENT_FORMAT)
    }

    /// Repository reporting an older storage format, pending migration
    #[must_use]
    pub fn with_format(config: RepositoryConfig, format: u32) -> Self {
        Self {
            state: RwLock::new(State {
                format,
                config,
                ..State::default()
            }),
            exclusive: AtomicBool::new(false),
        }
    }

    /// Build a repository publishing every catalogue entry
    ///
    /// # Errors
    ///
    /// Returns an error if an entry has an invalid dependency reference.
    pub async fn from_catalogue(
        config: RepositoryConfig,
        catalogue: Catalogue,
    ) -> Result<Self, Error> {
        let channel = config.default_channel.clone();
        let arch = config.arch();
        let repository = Self::new(config);
        for entry in catalogue.packages {
            let (info, modules) = entry.into_package(&channel, arch)?;
            repository.publish(info, modules).await;
        }
        Ok(repository)
    }

    /// Make a package available for resolve/fetch
    pub async fn publish(
        &self,
        info: PackageInfo,
        modules: impl IntoIterator<Item = (Module, PackageContent)>,
    ) {
        let modules = modules.into_iter().collect();
        let mut state = self.state.write().await;
        state
            .catalogue
            .insert(info.reference.clone(), Published { info, modules });
    }

    /// Number of stored blobs
    pub async fn object_count(&self) -> usize {
        self.state.read().await.objects.len()
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive.load(Ordering::SeqCst)
    }

    fn ensure_shared(&self, operation: &str) -> Result<(), Error> {
        if self.is_exclusive() {
            return Err(RepositoryError::Locked {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn not_found(reference: &impl std::fmt::Display) -> Error {
    RepositoryError::NotFound {
        reference: reference.to_string(),
    }
    .into()
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn resolve(&self, reference: &PackageReference) -> Result<PackageInfo, Error> {
        self.ensure_shared("resolve")?;
        let state = self.state.read().await;
        if let Some(published) = state.catalogue.get(reference) {
            return Ok(published.info.clone());
        }
        // Packages installed from archives are never published
        state
            .installed
            .values()
            .find(|entry| &entry.info.reference == reference)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| not_found(reference))
    }

    async fn fetch(&self, target: &ModuleRef) -> Result<PackageContent, Error> {
        self.ensure_shared("fetch")?;
        let state = self.state.read().await;
        state
            .catalogue
            .get(&target.reference)
            .and_then(|published| published.modules.get(&target.module))
            .cloned()
            .ok_or_else(|| not_found(target))
    }

    async fn commit(
        &self,
        info: &PackageInfo,
        module: &Module,
        content: PackageContent,
    ) -> Result<(), Error> {
        self.ensure_shared("commit")?;
        let content_id = content.id();
        let mut state = self.state.write().await;
        let previous = state.installed.insert(
            ModuleRef::new(info.reference.clone(), module.clone()),
            InstalledPackage {
                info: info.clone(),
                module: module.clone(),
                content_id: content_id.clone(),
            },
        );
        state.objects.entry(content_id).or_insert(content.data);
        if let Some(previous) = previous {
            collect_garbage(&mut state, &previous.content_id);
        }
        tracing::debug!(reference = %info.reference, %module, "committed module");
        Ok(())
    }

    async fn remove(&self, target: &ModuleRef) -> Result<(), Error> {
        self.ensure_shared("remove")?;
        let mut state = self.state.write().await;
        let removed = state
            .installed
            .remove(target)
            .ok_or_else(|| not_found(target))?;
        collect_garbage(&mut state, &removed.content_id);
        tracing::debug!(%target, "removed module");
        Ok(())
    }

    async fn installed(&self) -> Result<Vec<InstalledPackage>, Error> {
        Ok(self.state.read().await.installed.values().cloned().collect())
    }

    async fn referrers(&self, reference: &PackageReference) -> Result<usize, Error> {
        let state = self.state.read().await;
        let count = state
            .installed
            .values()
            .filter(|entry| &entry.info.reference != reference)
            .filter(|entry| {
                entry.info.dependencies.iter().any(|dependency| {
                    dependency.reference.same_package(reference)
                        && reference.version >= dependency.reference.version
                })
            })
            .count();
        Ok(count)
    }

    async fn begin_exclusive(&self) -> Result<(), Error> {
        if self.exclusive.swap(true, Ordering::SeqCst) {
            return Err(RepositoryError::Locked {
                operation: "begin exclusive access".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn end_exclusive(&self) -> Result<(), Error> {
        self.exclusive.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn format_version(&self) -> Result<u32, Error> {
        Ok(self.state.read().await.format)
    }

    async fn migrate(&self) -> Result<Migration, Error> {
        if !self.is_exclusive() {
            return Err(RepositoryError::MigrationFailed {
                message: "exclusive access not held".to_string(),
            }
            .into());
        }
        let mut state = self.state.write().await;
        if state.format > CURRENT_FORMAT {
            return Err(RepositoryError::MigrationFailed {
                message: format!(
                    "format {} is newer than supported format {CURRENT_FORMAT}",
                    state.format
                ),
            }
            .into());
        }
        let migration = Migration {
            from_format: state.format,
            to_format: CURRENT_FORMAT,
        };
        state.format = CURRENT_FORMAT;
        Ok(migration)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<PackageInfo>, Error> {
        self.ensure_shared("search")?;
        let state = self.state.read().await;
        let mut results: BTreeMap<&PackageReference, &PackageInfo> = BTreeMap::new();
        let published = state.catalogue.values().map(|p| &p.info);
        let installed = state.installed.values().map(|e| &e.info);
        for info in published.chain(installed) {
            if query.matches(info) {
                results.entry(&info.reference).or_insert(info);
            }
        }
        Ok(results.into_values().cloned().collect())
    }

    async fn configuration(&self) -> Result<RepositoryConfig, Error> {
        Ok(self.state.read().await.config.clone())
    }

    async fn configure(&self, config: RepositoryConfig) -> Result<(), Error> {
        if !config.repos.contains_key(&config.default_repo) {
            return Err(RepositoryError::UnknownRepo {
                name: config.default_repo,
            }
            .into());
        }
        self.state.write().await.config = config;
        Ok(())
    }
}

fn collect_garbage(state: &mut State, content_id: &ContentId) {
    let referenced = state
        .installed
        .values()
        .any(|entry| &entry.content_id == content_id);
    if !referenced {
        state.objects.remove(content_id);
    }
}
