//! Stable error classification

use std::fmt;

/// Coarse, stable category attached to every failed task.
///
/// Callers observe failures by querying task state rather than receiving the
/// original error, so the kind is the part of a failure that is safe to match
/// on across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ErrorKind {
    NotFound,
    AlreadyInProgress,
    DependencyCycle,
    DependencyFailed,
    InvalidArchive,
    VersionNotNewer,
    NotInstalled,
    RepositoryFailure,
    UnknownInteraction,
    InvalidChoice,
    InvalidArgument,
    Canceled,
    Config,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyInProgress => "already_in_progress",
            Self::DependencyCycle => "dependency_cycle",
            Self::DependencyFailed => "dependency_failed",
            Self::InvalidArchive => "invalid_archive",
            Self::VersionNotNewer => "version_not_newer",
            Self::NotInstalled => "not_installed",
            Self::RepositoryFailure => "repository_failure",
            Self::UnknownInteraction => "unknown_interaction",
            Self::InvalidChoice => "invalid_choice",
            Self::InvalidArgument => "invalid_argument",
            Self::Canceled => "canceled",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
