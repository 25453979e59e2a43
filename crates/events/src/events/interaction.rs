use pkgd_types::{InteractionId, InteractionRequest, TaskId};
use serde::{Deserialize, Serialize};

/// Confirmation requests raised by running tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    /// A task is waiting for one of `request.choices`
    Requested { request: InteractionRequest },

    Resolved {
        interaction_id: InteractionId,
        task_id: TaskId,
        choice: String,
    },

    /// Deadline passed without a reply; the task is being cancelled
    Expired {
        interaction_id: InteractionId,
        task_id: TaskId,
    },
}

impl InteractionEvent {
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Requested { request } => request.task_id,
            Self::Resolved { task_id, .. } | Self::Expired { task_id, .. } => *task_id,
        }
    }
}
