//! Task state model
//!
//! A task is one accepted long-running operation. Its lifecycle is
//! `Queued -> Running -> {Succeeded, Failed, Canceled}`, with `Running`
//! able to park in `AwaitingInteraction` while a confirmation is pending.

use crate::{InteractionRequest, ModuleRef, Module, PackageInfo, PackageReference, TaskId};
use chrono::{DateTime, Utc};
use pkgd_errors::{Error, ErrorKind, UserFacingError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Install,
    Update,
    Uninstall,
    Prune,
    Migrate,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Update => write!(f, "update"),
            Self::Uninstall => write!(f, "uninstall"),
            Self::Prune => write!(f, "prune"),
            Self::Migrate => write!(f, "migrate"),
        }
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    AwaitingInteraction,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Whether the state machine permits moving from `self` to `next`
    #[must_use]
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::{AwaitingInteraction, Canceled, Failed, Queued, Running, Succeeded};
        matches!(
            (self, next),
            (Queued, Running | Canceled | Failed)
                | (Running, AwaitingInteraction | Succeeded | Failed | Canceled)
                | (AwaitingInteraction, Running | Failed | Canceled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::AwaitingInteraction => write!(f, "awaiting_interaction"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// What a task operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskTarget {
    Package {
        reference: PackageReference,
        module: Module,
    },
    Update {
        from: PackageReference,
        to: PackageReference,
        module: Module,
    },
    /// Repository-wide maintenance (prune, migrate)
    Repository,
}

impl TaskTarget {
    #[must_use]
    pub fn package(reference: PackageReference, module: Module) -> Self {
        Self::Package { reference, module }
    }

    /// The (reference, module) pairs this target holds exclusively while active
    #[must_use]
    pub fn conflict_keys(&self) -> Vec<ModuleRef> {
        match self {
            Self::Package { reference, module } => {
                vec![ModuleRef::new(reference.clone(), module.clone())]
            }
            Self::Update { from, to, module } => vec![
                ModuleRef::new(from.clone(), module.clone()),
                ModuleRef::new(to.clone(), module.clone()),
            ],
            Self::Repository => Vec::new(),
        }
    }
}

impl fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package { reference, module } => write!(f, "{reference} [{module}]"),
            Self::Update { from, to, module } => write!(f, "{from} -> {to} [{module}]"),
            Self::Repository => write!(f, "repository"),
        }
    }
}

/// One entry of a task's progress log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Success payload of a finished task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutput {
    Installed {
        reference: PackageReference,
        module: Module,
    },
    /// The caller chose to keep an existing installation
    Skipped {
        reference: PackageReference,
        module: Module,
    },
    Updated {
        from: PackageReference,
        to: PackageReference,
        module: Module,
    },
    Uninstalled {
        reference: PackageReference,
        module: Module,
        /// True when an earlier uninstall had already removed the content
        already_removed: bool,
    },
    Pruned {
        removed: Vec<PackageInfo>,
    },
    Migrated {
        from_format: u32,
        to_format: u32,
    },
}

/// Recorded failure of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    /// Task the failure originated in, when it was propagated from another task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<TaskFailure>>,
}

impl TaskFailure {
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            code: error.user_code().map(str::to_string),
            message: error.user_message().into_owned(),
            origin: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: TaskFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: TaskId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Innermost failure in the cause chain
    #[must_use]
    pub fn root_cause(&self) -> &TaskFailure {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)?;
        if let Some(cause) = &self.cause {
            write!(f, ": caused by {cause}")?;
        }
        Ok(())
    }
}

/// Final result of a terminal task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded(TaskOutput),
    Failed(TaskFailure),
    Canceled,
}

impl TaskOutcome {
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Succeeded(_) => TaskStatus::Succeeded,
            Self::Failed(_) => TaskStatus::Failed,
            Self::Canceled => TaskStatus::Canceled,
        }
    }
}

/// Snapshot of one in-flight or completed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: TaskTarget,
    pub status: TaskStatus,
    /// Completion percentage, 0-100
    pub progress: u8,
    pub messages: Vec<ProgressMessage>,
    pub interaction: Option<InteractionRequest>,
    pub outcome: Option<TaskOutcome>,
    /// Task this one was created for as a prerequisite
    pub parent: Option<TaskId>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    #[must_use]
    pub fn new(kind: TaskKind, target: TaskTarget, parent: Option<TaskId>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            kind,
            target,
            status: TaskStatus::Queued,
            progress: 0,
            messages: Vec::new(),
            interaction: None,
            outcome: None,
            parent,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append to the progress log; allowed in every state
    pub fn log(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.messages.push(ProgressMessage {
            timestamp: now,
            message: message.into(),
        });
        self.updated_at = now;
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(|m| m.message.as_str())
    }

    #[must_use]
    pub fn failure(&self) -> Option<&TaskFailure> {
        match &self.outcome {
            Some(TaskOutcome::Failed(failure)) => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn output(&self) -> Option<&TaskOutput> {
        match &self.outcome {
            Some(TaskOutcome::Succeeded(output)) => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgd_errors::InstallError;

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [TaskStatus::Succeeded, TaskStatus::Failed, TaskStatus::Canceled] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Queued,
                TaskStatus::Running,
                TaskStatus::AwaitingInteraction,
                TaskStatus::Succeeded,
                TaskStatus::Failed,
                TaskStatus::Canceled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_interaction_round_trip_transitions() {
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::AwaitingInteraction));
        assert!(TaskStatus::AwaitingInteraction.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::AwaitingInteraction.can_transition_to(TaskStatus::Canceled));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::AwaitingInteraction));
        assert!(!TaskStatus::AwaitingInteraction.can_transition_to(TaskStatus::Succeeded));
    }

    #[test]
    fn test_failure_chain() {
        let root = TaskFailure::from_error(&Error::from(InstallError::PackageNotFound {
            package: "c".into(),
        }));
        let failure = TaskFailure::from_error(&Error::from(InstallError::DependencyFailed {
            dependency: "c".into(),
            message: root.message.clone(),
        }))
        .with_cause(root.clone());

        assert_eq!(failure.kind, ErrorKind::DependencyFailed);
        assert_eq!(failure.root_cause(), &root);
        assert_eq!(failure.root_cause().kind, ErrorKind::NotFound);
        assert!(failure.to_string().contains("caused by"));
    }

    #[test]
    fn test_log_survives_terminal_state() {
        let mut state = TaskState::new(TaskKind::Prune, TaskTarget::Repository, None);
        state.status = TaskStatus::Succeeded;
        state.log("diagnostic note");
        assert_eq!(state.last_message(), Some("diagnostic note"));
        assert!(state.is_terminal());
    }
}
