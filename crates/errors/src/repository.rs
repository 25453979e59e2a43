//! Repository collaborator error types

use std::borrow::Cow;

use crate::{ErrorKind, UserFacingError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("reference not found in repository: {reference}")]
    NotFound { reference: String },

    #[error("repository {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("repository is locked for exclusive access, cannot {operation}")]
    Locked { operation: String },

    #[error("repository migration failed: {message}")]
    MigrationFailed { message: String },

    #[error("unknown repository: {name}")]
    UnknownRepo { name: String },
}

impl RepositoryError {
    /// Shorthand for the opaque I/O style failure.
    pub fn failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UnknownRepo { .. } => ErrorKind::Config,
            Self::OperationFailed { .. } | Self::Locked { .. } | Self::MigrationFailed { .. } => {
                ErrorKind::RepositoryFailure
            }
        }
    }
}

impl UserFacingError for RepositoryError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Locked { .. } => Some("Wait for the running migration to finish and retry."),
            Self::UnknownRepo { .. } => Some("Add the repository to the [repository.repos] table."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::OperationFailed { .. } | Self::Locked { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::NotFound { .. } => "repository.not_found",
            Self::OperationFailed { .. } => "repository.operation_failed",
            Self::Locked { .. } => "repository.locked",
            Self::MigrationFailed { .. } => "repository.migration_failed",
            Self::UnknownRepo { .. } => "repository.unknown_repo",
        };
        Some(code)
    }
}
