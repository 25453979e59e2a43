use pkgd_types::{TaskId, TaskKind, TaskStatus};
use serde::{Deserialize, Serialize};

/// Task lifecycle notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Status, progress or message of a task changed
    Changed {
        task_id: TaskId,
        kind: TaskKind,
        status: TaskStatus,
        progress: u8,
        message: String,
    },

    /// A task was created or reached a terminal state
    ListChanged { task_id: TaskId },
}

impl TaskEvent {
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Changed { task_id, .. } | Self::ListChanged { task_id } => *task_id,
        }
    }
}
