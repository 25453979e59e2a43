//! Mid-transaction confirmation requests

use crate::{InteractionId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A question a running task asks its caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub id: InteractionId,
    pub task_id: TaskId,
    pub message: String,
    /// Offered answers; the first one is the default
    pub choices: Vec<String>,
    /// When false the request is informational and resolves immediately
    pub suspend: bool,
    pub deadline: Option<DateTime<Utc>>,
}

impl InteractionRequest {
    pub fn new(task_id: TaskId, message: impl Into<String>, choices: &[&str]) -> Self {
        Self {
            id: InteractionId::new(),
            task_id,
            message: message.into(),
            choices: choices.iter().map(|c| (*c).to_string()).collect(),
            suspend: true,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn informational(mut self) -> Self {
        self.suspend = false;
        self
    }

    #[must_use]
    pub fn offers(&self, choice: &str) -> bool {
        self.choices.iter().any(|c| c == choice)
    }

    #[must_use]
    pub fn default_choice(&self) -> Option<&str> {
        self.choices.first().map(String::as_str)
    }
}

/// The caller's answer to an [`InteractionRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionReply {
    pub choice: String,
}

impl InteractionReply {
    pub fn new(choice: impl Into<String>) -> Self {
        Self {
            choice: choice.into(),
        }
    }

    #[must_use]
    pub fn is(&self, choice: &str) -> bool {
        self.choice == choice
    }
}
