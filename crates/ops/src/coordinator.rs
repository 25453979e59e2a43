//! Public operation surface

use crate::context::{CoordinatorBuilder, OpsCtx};
use crate::task::Claim;
use crate::{install, maintenance, search, uninstall, update};
use pkgd_config::{QueueConfig, RepositoryConfig};
use pkgd_errors::{Error, OpsError, PackageError};
use pkgd_events::{AppEvent, EventEmitter, GeneralEvent};
use pkgd_repository::{ArchiveFormat, InstalledPackage, SearchQuery};
use pkgd_types::{
    InteractionId, InteractionReply, InteractionRequest, JobId, Module, ModuleRef, PackageInfo,
    PackageReference, TaskId, TaskKind, TaskOutcome, TaskOutput, TaskState, TaskTarget,
};
use std::sync::Arc;

/// Accepts package transactions and tracks them as tasks
///
/// Every mutating operation returns a [`TaskId`] immediately and runs on
/// one of the coordinator's job queues. Callers observe progress by
/// querying [`TransactionCoordinator::task`], awaiting
/// [`TransactionCoordinator::wait`] or draining the event channel.
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct TransactionCoordinator {
    ctx: Arc<OpsCtx>,
}

impl TransactionCoordinator {
    pub(crate) fn from_ctx(ctx: OpsCtx) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// Install `module` of `reference` along with its missing dependencies
    ///
    /// Returns the existing task if one is already installing this target.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInProgress` if a task of another kind currently
    /// targets the same reference and module.
    pub fn install(&self, reference: PackageReference, module: Module) -> Result<TaskId, Error> {
        let target = ModuleRef::new(reference, module);
        match self
            .ctx
            .registry
            .claim(TaskKind::Install, install::target_of(&target), None)?
        {
            Claim::Existing(id) => Ok(id),
            Claim::Created(id) => {
                install::submit(&self.ctx, id, target);
                Ok(id)
            }
        }
    }

    /// Install a package from raw archive content
    ///
    /// The archive is parsed before anything is queued. The task installs
    /// the archive's binary module, or its first module when it has none,
    /// committing the archive's own payload instead of fetching it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArchive` if the content cannot be parsed, and
    /// `AlreadyInProgress` as for [`Self::install`].
    pub fn install_from_archive(
        &self,
        format: ArchiveFormat,
        bytes: &[u8],
    ) -> Result<TaskId, Error> {
        let archive = self.ctx.archives.parse(format, bytes)?;
        let module = if archive.modules.contains_key(&Module::BINARY) {
            Module::BINARY
        } else {
            archive
                .modules
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| PackageError::InvalidArchive {
                    message: "archive contains no modules".to_string(),
                })?
        };
        let target = ModuleRef::new(archive.info.reference.clone(), module);
        tracing::debug!(%format, %target, "parsed archive");

        match self
            .ctx
            .registry
            .claim(TaskKind::Install, install::target_of(&target), None)?
        {
            Claim::Existing(id) => Ok(id),
            Claim::Created(id) => {
                self.ctx.staged.insert(id, Arc::new(archive));
                install::submit(&self.ctx, id, target);
                Ok(id)
            }
        }
    }

    /// Replace the installed `from` with the strictly newer `to`
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInProgress` if another kind of task targets either
    /// version.
    pub fn update(
        &self,
        from: PackageReference,
        to: PackageReference,
        module: Module,
    ) -> Result<TaskId, Error> {
        let target = TaskTarget::Update {
            from: from.clone(),
            to: to.clone(),
            module: module.clone(),
        };
        match self.ctx.registry.claim(TaskKind::Update, target, None)? {
            Claim::Existing(id) => Ok(id),
            Claim::Created(id) => {
                update::submit(&self.ctx, id, from, to, module);
                Ok(id)
            }
        }
    }

    /// Remove `module` of `reference`
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInProgress` if another kind of task targets it.
    pub fn uninstall(&self, reference: PackageReference, module: Module) -> Result<TaskId, Error> {
        let target = ModuleRef::new(reference, module);
        match self
            .ctx
            .registry
            .claim(TaskKind::Uninstall, install::target_of(&target), None)?
        {
            Claim::Existing(id) => Ok(id),
            Claim::Created(id) => {
                uninstall::submit(&self.ctx, id, target);
                Ok(id)
            }
        }
    }

    /// Queue removal of unreferenced runtime and base packages
    ///
    /// The task identifier is also the job identifier of the
    /// `PruneFinished` event.
    ///
    /// # Errors
    ///
    /// Returns an error only if the task cannot be registered.
    pub fn prune(&self) -> Result<TaskId, Error> {
        let id = self
            .ctx
            .registry
            .claim(TaskKind::Prune, TaskTarget::Repository, None)?
            .id();
        maintenance::submit_prune(&self.ctx, id);
        Ok(id)
    }

    /// Prune and wait for the removed set
    ///
    /// # Errors
    ///
    /// Returns the prune task's failure, or `Cancelled` if it was cancelled.
    pub async fn prune_now(&self) -> Result<Vec<PackageInfo>, Error> {
        let state = self.wait(self.prune()?).await?;
        match into_result(state)? {
            TaskOutput::Pruned { removed } => Ok(removed),
            other => Err(Error::internal(format!(
                "prune produced unexpected output {other:?}"
            ))),
        }
    }

    /// Queue a repository format migration
    ///
    /// Work queued after this call does not start until the migration has
    /// finished; work already running is drained first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the task cannot be registered.
    pub fn migrate(&self) -> Result<TaskId, Error> {
        let id = self
            .ctx
            .registry
            .claim(TaskKind::Migrate, TaskTarget::Repository, None)?
            .id();
        maintenance::submit_migrate(&self.ctx, id);
        Ok(id)
    }

    /// Queue a search; results arrive as a `SearchFinished` event
    #[must_use]
    pub fn search(&self, query: SearchQuery) -> JobId {
        let job_id = JobId::new();
        search::submit(&self.ctx, job_id, query);
        job_id
    }

    /// Search without going through the queue
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn search_now(&self, query: &SearchQuery) -> Result<Vec<PackageInfo>, Error> {
        search::run(&self.ctx, query).await
    }

    /// Current state of a task
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown task identifier.
    pub fn task(&self, id: TaskId) -> Result<TaskState, Error> {
        self.ctx.registry.snapshot(id)
    }

    /// All tasks in creation order
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskState> {
        self.ctx.registry.list()
    }

    /// Request cooperative cancellation of a task
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown task identifier.
    pub fn cancel(&self, id: TaskId) -> Result<(), Error> {
        self.ctx.registry.cancel(id)
    }

    /// Answer an outstanding interaction
    ///
    /// # Errors
    ///
    /// Returns `UnknownInteraction` if nothing with this identifier is
    /// outstanding and `InvalidChoice` if `choice` was not offered.
    pub fn reply_interaction(
        &self,
        id: InteractionId,
        choice: impl Into<String>,
    ) -> Result<(), Error> {
        self.ctx.broker.reply(id, InteractionReply::new(choice))
    }

    /// Interactions currently waiting for a reply
    #[must_use]
    pub fn pending_interactions(&self) -> Vec<InteractionRequest> {
        self.ctx.broker.outstanding()
    }

    /// Resolve once the task reaches a terminal state
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown task identifier.
    pub async fn wait(&self, id: TaskId) -> Result<TaskState, Error> {
        self.ctx.registry.wait(id).await
    }

    /// [`Self::install`] followed by [`Self::wait`]
    ///
    /// # Errors
    ///
    /// Returns submission errors only; the task's own failure is part of the
    /// returned state.
    pub async fn install_and_wait(
        &self,
        reference: PackageReference,
        module: Module,
    ) -> Result<TaskState, Error> {
        self.wait(self.install(reference, module)?).await
    }

    /// [`Self::update`] followed by [`Self::wait`]
    ///
    /// # Errors
    ///
    /// Returns submission errors only.
    pub async fn update_and_wait(
        &self,
        from: PackageReference,
        to: PackageReference,
        module: Module,
    ) -> Result<TaskState, Error> {
        self.wait(self.update(from, to, module)?).await
    }

    /// [`Self::uninstall`] followed by [`Self::wait`]
    ///
    /// # Errors
    ///
    /// Returns submission errors only.
    pub async fn uninstall_and_wait(
        &self,
        reference: PackageReference,
        module: Module,
    ) -> Result<TaskState, Error> {
        self.wait(self.uninstall(reference, module)?).await
    }

    /// Installed modules as the repository reports them
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn installed(&self) -> Result<Vec<InstalledPackage>, Error> {
        let _shared = self.ctx.gate.shared().await;
        self.ctx.repository.installed().await
    }

    /// Active repository configuration
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn configuration(&self) -> Result<RepositoryConfig, Error> {
        self.ctx.repository.configuration().await
    }

    /// Validate and apply a new repository configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the default repository is not
    /// listed, or the repository's error.
    pub async fn set_configuration(&self, config: RepositoryConfig) -> Result<(), Error> {
        config.validate()?;
        let default_repo = config.default_repo.clone();
        {
            let _shared = self.ctx.gate.shared().await;
            self.ctx.repository.configure(config).await?;
        }
        tracing::info!(%default_repo, "repository configuration updated");
        self.ctx
            .registry
            .emit(AppEvent::General(GeneralEvent::ConfigurationUpdated { default_repo }));
        Ok(())
    }

    /// Queue concurrency limits this coordinator was built with
    #[must_use]
    pub fn queue_limits(&self) -> &QueueConfig {
        &self.ctx.config.queues
    }
}

/// Turn a terminal task state into its output or recorded failure
fn into_result(state: TaskState) -> Result<TaskOutput, Error> {
    match state.outcome {
        Some(TaskOutcome::Succeeded(output)) => Ok(output),
        Some(TaskOutcome::Failed(failure)) => Err(OpsError::TaskFailed {
            task_id: state.id.as_uuid(),
            kind: failure.kind,
            message: failure.to_string(),
        }
        .into()),
        Some(TaskOutcome::Canceled) => Err(Error::Cancelled),
        None => Err(OpsError::InvalidTransition {
            task_id: state.id.as_uuid(),
            status: state.status.to_string(),
            expected: "a terminal state".to_string(),
        }
        .into()),
    }
}
