//! Task arena and per-task execution handle
//!
//! Every accepted operation owns a slot in [`TaskRegistry`]. The registry
//! validates each status change against the task state machine, keeps the
//! index of which task currently holds each (reference, module) pair, and
//! publishes a notification for every transition.

use dashmap::DashMap;
use pkgd_errors::{Error, InstallError, OpsError, PackageError, RepositoryError};
use pkgd_events::{AppEvent, EventEmitter, EventSender, TaskEvent};
use pkgd_types::{
    InteractionRequest, ModuleRef, TaskFailure, TaskId, TaskKind, TaskOutcome, TaskOutput,
    TaskState, TaskStatus, TaskTarget,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct TaskSlot {
    state: TaskState,
    cancel: CancellationToken,
    status: watch::Sender<TaskStatus>,
    /// Installed packages the task relies on until it is terminal
    pinned: Vec<ModuleRef>,
}

/// Result of asking the registry for a task on a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// A new task was created in `Queued`
    Created(TaskId),
    /// A non-terminal task of the same kind already targets it
    Existing(TaskId),
}

impl Claim {
    pub(crate) fn id(self) -> TaskId {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }
}

pub(crate) struct TaskRegistry {
    tasks: DashMap<TaskId, TaskSlot>,
    order: Mutex<Vec<TaskId>>,
    /// (reference, module) -> task holding it; always locked before `tasks`
    active: Mutex<HashMap<ModuleRef, TaskId>>,
    tx: Option<EventSender>,
}

impl EventEmitter for TaskRegistry {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(id: TaskId) -> Error {
    OpsError::TaskNotFound {
        task_id: id.as_uuid(),
    }
    .into()
}

impl TaskRegistry {
    pub(crate) fn new(tx: Option<EventSender>) -> Self {
        Self {
            tasks: DashMap::new(),
            order: Mutex::new(Vec::new()),
            active: Mutex::new(HashMap::new()),
            tx,
        }
    }

    /// Create a task for `target` unless an equivalent one is active
    ///
    /// A non-terminal task of the same kind and target is returned as
    /// [`Claim::Existing`]. A non-terminal task of another kind holding any
    /// of the target's keys rejects the claim with `AlreadyInProgress`.
    pub(crate) fn claim(
        &self,
        kind: TaskKind,
        target: TaskTarget,
        parent: Option<TaskId>,
    ) -> Result<Claim, Error> {
        let keys = target.conflict_keys();
        let mut active = lock(&self.active);

        for key in &keys {
            let Some(holder) = active.get(key).copied() else {
                continue;
            };
            let Some((holder_kind, holder_target, terminal)) =
                self.tasks.get(&holder).map(|slot| {
                    (
                        slot.state.kind,
                        slot.state.target.clone(),
                        slot.state.is_terminal(),
                    )
                })
            else {
                continue;
            };
            if terminal {
                continue;
            }
            if holder_kind == kind && holder_target == target {
                return Ok(Claim::Existing(holder));
            }
            return Err(OpsError::AlreadyInProgress {
                task_id: holder.as_uuid(),
                operation: holder_kind.to_string(),
                target: key.to_string(),
            }
            .into());
        }

        let state = TaskState::new(kind, target, parent);
        let id = state.id;
        let (status, _) = watch::channel(TaskStatus::Queued);
        self.tasks.insert(
            id,
            TaskSlot {
                state: state.clone(),
                cancel: CancellationToken::new(),
                status,
                pinned: Vec::new(),
            },
        );
        for key in keys {
            active.insert(key, id);
        }
        lock(&self.order).push(id);
        drop(active);

        tracing::info!(task_id = %id, %kind, target = %state.target, "task queued");
        self.emit(AppEvent::Task(TaskEvent::ListChanged { task_id: id }));
        self.notify(&state);
        Ok(Claim::Created(id))
    }

    pub(crate) fn snapshot(&self, id: TaskId) -> Result<TaskState, Error> {
        self.tasks
            .get(&id)
            .map(|slot| slot.state.clone())
            .ok_or_else(|| not_found(id))
    }

    /// All tasks in creation order
    pub(crate) fn list(&self) -> Vec<TaskState> {
        lock(&self.order)
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|slot| slot.state.clone()))
            .collect()
    }

    /// Non-terminal task currently holding `key`
    pub(crate) fn active_task(&self, key: &ModuleRef) -> Option<TaskId> {
        let holder = lock(&self.active).get(key).copied()?;
        self.tasks
            .get(&holder)
            .filter(|slot| !slot.state.is_terminal())
            .map(|_| holder)
    }

    /// Keep `keys` from being pruned while `id` is non-terminal
    pub(crate) fn pin(&self, id: TaskId, keys: impl IntoIterator<Item = ModuleRef>) {
        if let Some(mut slot) = self.tasks.get_mut(&id) {
            slot.pinned.extend(keys);
        }
    }

    /// Non-terminal task relying on the installed `key`
    pub(crate) fn pinned_by(&self, key: &ModuleRef) -> Option<TaskId> {
        self.tasks.iter().find_map(|slot| {
            let relies = !slot.state.is_terminal()
                && slot
                    .pinned
                    .iter()
                    .any(|pin| pin == key || pin.is_satisfied_by(key));
            relies.then_some(slot.state.id)
        })
    }

    /// Whether the most recent successful task touching `key`, other than
    /// `except`, was an uninstall
    pub(crate) fn previously_uninstalled(&self, key: &ModuleRef, except: TaskId) -> bool {
        let order = lock(&self.order).clone();
        order
            .iter()
            .rev()
            .filter(|id| **id != except)
            .filter_map(|id| self.tasks.get(id).map(|slot| slot.state.clone()))
            .find(|state| {
                state.status == TaskStatus::Succeeded && state.target.conflict_keys().contains(key)
            })
            .is_some_and(|state| state.kind == TaskKind::Uninstall)
    }

    /// Move a `Queued` task to `Running` and hand out its handle
    ///
    /// Returns `None` if the task is no longer queued, e.g. because it was
    /// cancelled or adopted as a dependency by another task.
    pub(crate) fn start(self: &Arc<Self>, id: TaskId) -> Option<TaskHandle> {
        let (state, cancel) = {
            let mut slot = self.tasks.get_mut(&id)?;
            if slot.state.status != TaskStatus::Queued {
                return None;
            }
            slot.state.status = TaskStatus::Running;
            slot.state.log("started");
            slot.status.send_replace(TaskStatus::Running);
            (slot.state.clone(), slot.cancel.clone())
        };
        tracing::info!(task_id = %id, kind = %state.kind, "task running");
        self.notify(&state);
        Some(TaskHandle {
            id,
            registry: Arc::clone(self),
            cancel,
        })
    }

    fn update<R>(
        &self,
        id: TaskId,
        apply: impl FnOnce(&mut TaskState) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let (result, state) = {
            let mut slot = self.tasks.get_mut(&id).ok_or_else(|| not_found(id))?;
            let result = apply(&mut slot.state)?;
            slot.state.updated_at = chrono::Utc::now();
            let status = slot.state.status;
            slot.status.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });
            (result, slot.state.clone())
        };
        self.notify(&state);
        Ok(result)
    }

    fn transition(state: &mut TaskState, next: TaskStatus) -> Result<(), Error> {
        if !state.status.can_transition_to(next) {
            return Err(OpsError::InvalidTransition {
                task_id: state.id.as_uuid(),
                status: state.status.to_string(),
                expected: next.to_string(),
            }
            .into());
        }
        state.status = next;
        Ok(())
    }

    pub(crate) fn progress(&self, id: TaskId, percent: u8, message: String) -> Result<(), Error> {
        self.update(id, |state| {
            if !state.is_terminal() {
                state.progress = percent.min(100).max(state.progress);
            }
            state.log(message);
            Ok(())
        })
    }

    /// `Running -> AwaitingInteraction` with `request` attached
    pub(crate) fn await_interaction(
        &self,
        id: TaskId,
        request: InteractionRequest,
    ) -> Result<(), Error> {
        self.update(id, |state| {
            Self::transition(state, TaskStatus::AwaitingInteraction)?;
            state.log(request.message.clone());
            state.interaction = Some(request);
            Ok(())
        })
    }

    /// `AwaitingInteraction -> Running` once a reply was delivered
    pub(crate) fn resume(&self, id: TaskId, choice: &str) -> Result<(), Error> {
        self.update(id, |state| {
            Self::transition(state, TaskStatus::Running)?;
            state.interaction = None;
            state.log(format!("answered: {choice}"));
            Ok(())
        })
    }

    /// Request cooperative cancellation
    ///
    /// A queued task is cancelled on the spot; a running one observes the
    /// request at its next checkpoint. Cancelling a finished task is a no-op.
    pub(crate) fn cancel(&self, id: TaskId) -> Result<(), Error> {
        let finished = {
            let mut slot = self.tasks.get_mut(&id).ok_or_else(|| not_found(id))?;
            if slot.state.is_terminal() {
                return Ok(());
            }
            slot.state.cancel_requested = true;
            slot.state.log("cancellation requested");
            slot.cancel.cancel();
            if slot.state.status == TaskStatus::Queued {
                Some(Self::apply_outcome(&mut slot, TaskOutcome::Canceled))
            } else {
                None
            }
        };

        match finished {
            Some(state) => self.after_terminal(&state),
            None => {
                tracing::info!(task_id = %id, "cancellation requested");
                let state = self.snapshot(id)?;
                self.notify(&state);
            }
        }
        Ok(())
    }

    /// Record the final outcome; ignored if the task is already terminal
    pub(crate) fn finish(&self, id: TaskId, outcome: TaskOutcome) {
        let state = {
            let Some(mut slot) = self.tasks.get_mut(&id) else {
                return;
            };
            if slot.state.is_terminal() {
                return;
            }
            Self::apply_outcome(&mut slot, outcome)
        };
        self.after_terminal(&state);
    }

    fn apply_outcome(slot: &mut TaskSlot, outcome: TaskOutcome) -> TaskState {
        let state = &mut slot.state;
        state.status = outcome.status();
        state.interaction = None;
        let message = match &outcome {
            TaskOutcome::Succeeded(_) => {
                state.progress = 100;
                "succeeded".to_string()
            }
            TaskOutcome::Failed(failure) => format!("failed: {failure}"),
            TaskOutcome::Canceled => "canceled".to_string(),
        };
        state.log(message);
        state.outcome = Some(outcome);
        slot.status.send_replace(state.status);
        state.clone()
    }

    fn after_terminal(&self, state: &TaskState) {
        {
            let mut active = lock(&self.active);
            for key in state.target.conflict_keys() {
                if active.get(&key) == Some(&state.id) {
                    active.remove(&key);
                }
            }
        }

        match state.status {
            TaskStatus::Failed => {
                tracing::warn!(
                    task_id = %state.id,
                    kind = %state.kind,
                    message = ?state.last_message(),
                    "task failed"
                );
            }
            status => {
                tracing::info!(task_id = %state.id, kind = %state.kind, %status, "task finished");
            }
        }
        self.notify(state);
        self.emit(AppEvent::Task(TaskEvent::ListChanged { task_id: state.id }));
    }

    fn notify(&self, state: &TaskState) {
        self.emit(AppEvent::Task(TaskEvent::Changed {
            task_id: state.id,
            kind: state.kind,
            status: state.status,
            progress: state.progress,
            message: state
                .last_message()
                .map_or_else(|| state.status.to_string(), str::to_string),
        }));
    }

    /// Resolve once the task reaches a terminal state
    pub(crate) async fn wait(&self, id: TaskId) -> Result<TaskState, Error> {
        let mut status = self
            .tasks
            .get(&id)
            .map(|slot| slot.status.subscribe())
            .ok_or_else(|| not_found(id))?;
        status
            .wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| OpsError::TaskAbandoned {
                task_id: id.as_uuid(),
            })?;
        self.snapshot(id)
    }
}

/// Failure of one workflow step
///
/// Carries the error that stopped the task and, when the error was caused
/// by another task failing, that task's recorded failure.
#[derive(Debug)]
pub(crate) struct StepError {
    pub(crate) error: Error,
    pub(crate) cause: Option<TaskFailure>,
}

impl StepError {
    pub(crate) fn caused_by(error: impl Into<Error>, cause: TaskFailure) -> Self {
        Self {
            error: error.into(),
            cause: Some(cause),
        }
    }
}

macro_rules! step_error_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for StepError {
                fn from(error: $source) -> Self {
                    Self {
                        error: error.into(),
                        cause: None,
                    }
                }
            }
        )*
    };
}

step_error_from!(Error, InstallError, OpsError, PackageError, RepositoryError);

pub(crate) type StepResult = Result<TaskOutput, StepError>;

/// Capability handed to the worker executing one task
#[derive(Clone)]
pub(crate) struct TaskHandle {
    id: TaskId,
    registry: Arc<TaskRegistry>,
    cancel: CancellationToken,
}

impl TaskHandle {
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Cancellation checkpoint
    pub(crate) fn checkpoint(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub(crate) fn progress(&self, percent: u8, message: impl Into<String>) {
        if let Err(e) = self.registry.progress(self.id, percent, message.into()) {
            tracing::debug!(task_id = %self.id, error = %e, "progress update dropped");
        }
    }

    pub(crate) fn finish(&self, result: StepResult) {
        let outcome = match result {
            Ok(output) => TaskOutcome::Succeeded(output),
            Err(StepError {
                error: Error::Cancelled,
                ..
            }) => TaskOutcome::Canceled,
            Err(StepError { error, cause }) => {
                let mut failure = TaskFailure::from_error(&error);
                if let Some(cause) = cause {
                    failure = failure.with_cause(cause);
                }
                TaskOutcome::Failed(failure)
            }
        };
        self.registry.finish(self.id, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgd_errors::ErrorKind;
    use pkgd_types::{Arch, Module, PackageReference, Version};

    fn target_reference(name: &str) -> PackageReference {
        PackageReference::new("main", name, Version::new(1, 0, 0), Arch::X86_64)
    }

    fn target(name: &str) -> TaskTarget {
        TaskTarget::package(target_reference(name), Module::BINARY)
    }

    #[test]
    fn test_claim_is_idempotent_per_target() {
        let registry = TaskRegistry::new(None);
        let first = registry.claim(TaskKind::Install, target("a"), None).unwrap();
        let second = registry.claim(TaskKind::Install, target("a"), None).unwrap();
        assert!(matches!(first, Claim::Created(_)));
        assert_eq!(second, Claim::Existing(first.id()));

        let other = registry.claim(TaskKind::Install, target("b"), None).unwrap();
        assert!(matches!(other, Claim::Created(_)));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_conflicting_kind_is_rejected() {
        let registry = TaskRegistry::new(None);
        registry.claim(TaskKind::Install, target("a"), None).unwrap();
        let err = registry
            .claim(TaskKind::Uninstall, target("a"), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInProgress);
    }

    #[test]
    fn test_terminal_task_releases_target() {
        let registry = Arc::new(TaskRegistry::new(None));
        let id = registry
            .claim(TaskKind::Install, target("a"), None)
            .unwrap()
            .id();
        let handle = registry.start(id).unwrap();
        handle.finish(Ok(TaskOutput::Pruned { removed: vec![] }));

        assert_eq!(registry.snapshot(id).unwrap().status, TaskStatus::Succeeded);
        assert!(registry.active_task(&target("a").conflict_keys()[0]).is_none());

        let again = registry.claim(TaskKind::Install, target("a"), None).unwrap();
        assert!(matches!(again, Claim::Created(new) if new != id));
    }

    #[test]
    fn test_cancel_queued_is_immediate() {
        let registry = Arc::new(TaskRegistry::new(None));
        let id = registry
            .claim(TaskKind::Uninstall, target("a"), None)
            .unwrap()
            .id();
        registry.cancel(id).unwrap();

        let state = registry.snapshot(id).unwrap();
        assert_eq!(state.status, TaskStatus::Canceled);
        assert!(state.cancel_requested);
        assert!(registry.start(id).is_none());

        // Cancelling a finished task changes nothing
        registry.cancel(id).unwrap();
        assert_eq!(registry.snapshot(id).unwrap().status, TaskStatus::Canceled);
    }

    #[test]
    fn test_cancel_running_waits_for_checkpoint() {
        let registry = Arc::new(TaskRegistry::new(None));
        let id = registry
            .claim(TaskKind::Install, target("a"), None)
            .unwrap()
            .id();
        let handle = registry.start(id).unwrap();
        assert!(handle.checkpoint().is_ok());

        registry.cancel(id).unwrap();
        assert_eq!(registry.snapshot(id).unwrap().status, TaskStatus::Running);
        assert!(handle.checkpoint().unwrap_err().is_cancelled());

        handle.finish(Err(Error::Cancelled.into()));
        assert_eq!(registry.snapshot(id).unwrap().status, TaskStatus::Canceled);
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let registry = Arc::new(TaskRegistry::new(None));
        let id = registry
            .claim(TaskKind::Install, target("a"), None)
            .unwrap()
            .id();
        // Queued tasks cannot wait for interactions
        let request = InteractionRequest::new(id, "replace?", &["yes", "no"]);
        assert!(registry.await_interaction(id, request).is_err());
        assert!(registry.resume(id, "yes").is_err());
    }

    #[test]
    fn test_failure_records_cause_chain() {
        let registry = Arc::new(TaskRegistry::new(None));
        let id = registry
            .claim(TaskKind::Install, target("a"), None)
            .unwrap()
            .id();
        let handle = registry.start(id).unwrap();
        let cause = TaskFailure::from_error(&Error::from(InstallError::PackageNotFound {
            package: "c".into(),
        }));
        handle.finish(Err(StepError::caused_by(
            InstallError::DependencyFailed {
                dependency: "c".into(),
                message: cause.message.clone(),
            },
            cause,
        )));

        let state = registry.snapshot(id).unwrap();
        let failure = state.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::DependencyFailed);
        assert_eq!(failure.root_cause().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_wait_resolves_on_terminal_state() {
        let registry = Arc::new(TaskRegistry::new(None));
        let id = registry
            .claim(TaskKind::Install, target("a"), None)
            .unwrap()
            .id();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait(id).await })
        };

        let handle = registry.start(id).unwrap();
        handle.progress(50, "halfway");
        handle.finish(Err(InstallError::NotInstalled {
            package: "a".into(),
        }
        .into()));

        let state = waiter.await.unwrap().unwrap();
        assert_eq!(state.status, TaskStatus::Failed);
        assert_eq!(state.failure().unwrap().kind, ErrorKind::NotInstalled);
    }

    #[tokio::test]
    async fn test_events_published_for_transitions() {
        let (tx, mut rx) = pkgd_events::channel();
        let registry = Arc::new(TaskRegistry::new(Some(tx)));
        let id = registry
            .claim(TaskKind::Prune, TaskTarget::Repository, None)
            .unwrap()
            .id();
        registry.start(id).unwrap().finish(Ok(TaskOutput::Pruned { removed: vec![] }));

        let mut statuses = Vec::new();
        let mut list_changes = 0;
        while let Ok(message) = rx.try_recv() {
            match message.event {
                AppEvent::Task(TaskEvent::Changed { status, .. }) => statuses.push(status),
                AppEvent::Task(TaskEvent::ListChanged { .. }) => list_changes += 1,
                _ => {}
            }
        }
        assert_eq!(
            statuses,
            vec![TaskStatus::Queued, TaskStatus::Running, TaskStatus::Succeeded]
        );
        assert_eq!(list_changes, 2);
    }

    #[test]
    fn test_pins_last_until_terminal() {
        let registry = Arc::new(TaskRegistry::new(None));
        let runtime = |version: &str| {
            ModuleRef::new(
                PackageReference::new(
                    "main",
                    "runtime",
                    Version::parse(version).unwrap(),
                    Arch::X86_64,
                ),
                Module::BINARY,
            )
        };
        let id = registry
            .claim(TaskKind::Install, target("app"), None)
            .unwrap()
            .id();
        registry.pin(id, [runtime("1.0.0")]);

        assert_eq!(registry.pinned_by(&runtime("1.0.0")), Some(id));
        // An installed newer version satisfies the same requirement
        assert_eq!(registry.pinned_by(&runtime("1.2.0")), Some(id));
        assert_eq!(registry.pinned_by(&runtime("0.9.0")), None);

        registry.start(id).unwrap().finish(Ok(TaskOutput::Skipped {
            reference: target_reference("app"),
            module: Module::BINARY,
        }));
        assert_eq!(registry.pinned_by(&runtime("1.0.0")), None);
    }
}
