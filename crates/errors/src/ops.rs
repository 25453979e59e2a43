//! Transaction orchestration error types

use std::borrow::Cow;

use crate::{ErrorKind, UserFacingError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum OpsError {
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: Uuid },

    #[error("no outstanding interaction with id {interaction_id}")]
    UnknownInteraction { interaction_id: Uuid },

    #[error("choice {choice:?} is not offered by interaction {interaction_id}")]
    InvalidChoice { interaction_id: Uuid, choice: String },

    #[error("{operation} task {task_id} already targets {target}")]
    AlreadyInProgress {
        task_id: Uuid,
        operation: String,
        target: String,
    },

    #[error("task {task_id} is {status}, expected {expected}")]
    InvalidTransition {
        task_id: Uuid,
        status: String,
        expected: String,
    },

    #[error("task {task_id} was dropped before reaching a final state")]
    TaskAbandoned { task_id: Uuid },

    #[error("missing component: {component}")]
    MissingComponent { component: String },

    #[error("task {task_id} failed: {message}")]
    TaskFailed {
        task_id: Uuid,
        kind: ErrorKind,
        message: String,
    },
}

impl OpsError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TaskNotFound { .. } => ErrorKind::NotFound,
            Self::UnknownInteraction { .. } => ErrorKind::UnknownInteraction,
            Self::InvalidChoice { .. } => ErrorKind::InvalidChoice,
            Self::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            Self::TaskFailed { kind, .. } => *kind,
            Self::InvalidTransition { .. }
            | Self::TaskAbandoned { .. }
            | Self::MissingComponent { .. } => ErrorKind::Internal,
        }
    }
}

impl UserFacingError for OpsError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownInteraction { .. } => {
                Some("The request was already answered, expired, or its task was cancelled.")
            }
            Self::InvalidChoice { .. } => Some("Reply with one of the offered choices."),
            Self::AlreadyInProgress { .. } => {
                Some("Wait for the running task to finish or cancel it first.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::AlreadyInProgress { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::TaskNotFound { .. } => "ops.task_not_found",
            Self::UnknownInteraction { .. } => "ops.unknown_interaction",
            Self::InvalidChoice { .. } => "ops.invalid_choice",
            Self::AlreadyInProgress { .. } => "ops.already_in_progress",
            Self::InvalidTransition { .. } => "ops.invalid_transition",
            Self::TaskAbandoned { .. } => "ops.task_abandoned",
            Self::MissingComponent { .. } => "ops.missing_component",
            Self::TaskFailed { .. } => "ops.task_failed",
        };
        Some(code)
    }
}
