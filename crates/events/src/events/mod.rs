use serde::{Deserialize, Serialize};

use crate::{EventLevel, EventSource};

pub mod general;
pub mod interaction;
pub mod job;
pub mod task;

pub use general::*;
pub use interaction::*;
pub use job::*;
pub use task::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Warnings, errors and operation markers
    General(GeneralEvent),

    /// Task state transitions and task list changes
    Task(TaskEvent),

    /// Interaction requests and their resolution
    Interaction(InteractionEvent),

    /// Search, prune and migrate results
    Job(JobEvent),
}

impl AppEvent {
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Task(_) => EventSource::TASK,
            Self::Interaction(_) => EventSource::INTERACTION,
            Self::Job(_) => EventSource::JOB,
        }
    }

    /// Task or job identifier used as the correlation id
    #[must_use]
    pub fn correlation_id(&self) -> Option<String> {
        match self {
            Self::General(_) => None,
            Self::Task(event) => Some(event.task_id().to_string()),
            Self::Interaction(event) => Some(event.task_id().to_string()),
            Self::Job(event) => Some(event.job_id().to_string()),
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use pkgd_types::TaskStatus;
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::Job(JobEvent::Failed { .. })
            | Self::Task(TaskEvent::Changed {
                status: TaskStatus::Failed,
                ..
            }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Interaction(InteractionEvent::Expired { .. })
            | Self::Task(TaskEvent::Changed {
                status: TaskStatus::Canceled,
                ..
            }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Task(TaskEvent::ListChanged { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "pkgd::events::general",
            Self::Task(_) => "pkgd::events::task",
            Self::Interaction(_) => "pkgd::events::interaction",
            Self::Job(_) => "pkgd::events::job",
        }
    }

    #[must_use]
    pub fn event_level(&self) -> EventLevel {
        self.log_level().into()
    }
}
