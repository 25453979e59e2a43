//! Shared state of a coordinator and its builder

use crate::gate::{Announcement, ExclusiveGate};
use crate::interaction::InteractionBroker;
use crate::queue::JobQueue;
use crate::task::{StepResult, TaskHandle, TaskRegistry};
use crate::TransactionCoordinator;
use dashmap::DashMap;
use pkgd_config::Config;
use pkgd_errors::{Error, OpsError};
use pkgd_events::EventSender;
use pkgd_repository::{ArchiveParser, ManifestArchiveParser, ParsedArchive, Repository};
use pkgd_types::TaskId;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The independent queues work is scheduled on
pub(crate) struct Queues {
    /// Install, update and uninstall
    pub(crate) transaction: JobQueue,
    pub(crate) search: JobQueue,
    /// Prune
    pub(crate) maintenance: JobQueue,
    pub(crate) migrate: JobQueue,
}

/// Everything a workflow needs, shared by all queued work units
pub(crate) struct OpsCtx {
    pub(crate) repository: Arc<dyn Repository>,
    pub(crate) archives: Arc<dyn ArchiveParser>,
    /// Parsed archives waiting for their install task to run
    pub(crate) staged: DashMap<TaskId, Arc<ParsedArchive>>,
    pub(crate) registry: Arc<TaskRegistry>,
    /// Held while a task pins the packages it relies on and while prune
    /// decides on and removes a package
    pub(crate) retention: Mutex<()>,
    pub(crate) broker: InteractionBroker,
    pub(crate) gate: Arc<ExclusiveGate>,
    pub(crate) queues: Queues,
    pub(crate) config: Config,
}

/// How a queued unit coordinates with repository migrations
pub(crate) enum Access {
    Shared,
    Exclusive(Announcement),
}

impl OpsCtx {
    /// Drive a queued task through its lifecycle
    ///
    /// Skips the task if it left `Queued` before its turn (cancelled, or
    /// adopted as a dependency by another task).
    pub(crate) async fn run_queued<F, Fut>(self: Arc<Self>, id: TaskId, access: Access, body: F)
    where
        F: FnOnce(Arc<Self>, TaskHandle) -> Fut,
        Fut: Future<Output = StepResult>,
    {
        if !self.is_queued(id) {
            return;
        }

        let (_shared, _exclusive) = match access {
            Access::Shared => (Some(self.gate.shared().await), None),
            Access::Exclusive(announcement) => {
                let guard = tokio::select! {
                    guard = self.gate.exclusive(announcement) => guard,
                    () = self.until_not_queued(id) => return,
                };
                (None, Some(guard))
            }
        };

        let Some(task) = self.registry.start(id) else {
            return;
        };
        let result = body(Arc::clone(&self), task.clone()).await;
        task.finish(result);
    }

    /// Take the archive content staged for an install task, if any
    pub(crate) fn take_staged(&self, id: TaskId) -> Option<Arc<ParsedArchive>> {
        self.staged.remove(&id).map(|(_, archive)| archive)
    }

    fn is_queued(&self, id: TaskId) -> bool {
        self.registry
            .snapshot(id)
            .is_ok_and(|state| state.status == pkgd_types::TaskStatus::Queued)
    }

    async fn until_not_queued(&self, id: TaskId) {
        // A queued task only leaves `Queued` here by being cancelled
        let _ = self.registry.wait(id).await;
    }
}

/// Builder for [`TransactionCoordinator`]
#[derive(Default)]
pub struct CoordinatorBuilder {
    repository: Option<Arc<dyn Repository>>,
    archives: Option<Arc<dyn ArchiveParser>>,
    tx: Option<EventSender>,
    config: Option<Config>,
}

impl CoordinatorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the repository collaborator
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Set the archive parser used by `install_from_archive`
    #[must_use]
    pub fn with_archive_parser(mut self, archives: Arc<dyn ArchiveParser>) -> Self {
        self.archives = Some(archives);
        self
    }

    /// Set event sender
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the coordinator
    ///
    /// # Errors
    ///
    /// Returns an error if no repository was provided or the configuration
    /// is invalid.
    pub fn build(self) -> Result<TransactionCoordinator, Error> {
        let repository = self
            .repository
            .ok_or_else(|| OpsError::MissingComponent {
                component: "repository".to_string(),
            })?;
        let archives = self
            .archives
            .unwrap_or_else(|| Arc::new(ManifestArchiveParser) as Arc<dyn ArchiveParser>);
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let registry = Arc::new(TaskRegistry::new(self.tx));
        let broker = InteractionBroker::new(Arc::clone(&registry), config.interaction.timeout());
        let queues = Queues {
            transaction: JobQueue::new("transaction", config.queues.transaction),
            search: JobQueue::new("search", config.queues.search),
            maintenance: JobQueue::new("maintenance", config.queues.maintenance),
            migrate: JobQueue::new("migrate", config.queues.migrate),
        };

        Ok(TransactionCoordinator::from_ctx(OpsCtx {
            repository,
            archives,
            staged: DashMap::new(),
            registry,
            retention: Mutex::new(()),
            broker,
            gate: ExclusiveGate::new(),
            queues,
            config,
        }))
    }
}
