//! Install, update and uninstall workflow error types

use std::borrow::Cow;

use crate::{ErrorKind, UserFacingError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum InstallError {
    #[error("package not found: {package}")]
    PackageNotFound { package: String },

    #[error("circular dependency detected: {chain}")]
    DependencyCycle { chain: String },

    #[error("dependency {dependency} failed: {message}")]
    DependencyFailed { dependency: String, message: String },

    #[error("{requested} is not newer than {current}")]
    VersionNotNewer { current: String, requested: String },

    #[error("package not installed: {package}")]
    NotInstalled { package: String },

    #[error("update must keep package identity: {from} -> {to}")]
    IdentityMismatch { from: String, to: String },

    #[error("installation failed: {message}")]
    Failed { message: String },
}

impl InstallError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PackageNotFound { .. } => ErrorKind::NotFound,
            Self::DependencyCycle { .. } => ErrorKind::DependencyCycle,
            Self::DependencyFailed { .. } => ErrorKind::DependencyFailed,
            Self::VersionNotNewer { .. } => ErrorKind::VersionNotNewer,
            Self::NotInstalled { .. } => ErrorKind::NotInstalled,
            Self::IdentityMismatch { .. } => ErrorKind::InvalidArgument,
            Self::Failed { .. } => ErrorKind::Internal,
        }
    }
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PackageNotFound { .. } => {
                Some("Check the package name, channel and architecture against the repository.")
            }
            Self::DependencyCycle { .. } => {
                Some("The package metadata declares a dependency loop; report it to the publisher.")
            }
            Self::DependencyFailed { .. } => {
                Some("Inspect the failed dependency task for the underlying cause.")
            }
            Self::VersionNotNewer { .. } => Some("Pick a version newer than the installed one."),
            Self::NotInstalled { .. } => {
                Some("List installed packages to find the exact reference.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::PackageNotFound { .. } => "install.package_not_found",
            Self::DependencyCycle { .. } => "install.dependency_cycle",
            Self::DependencyFailed { .. } => "install.dependency_failed",
            Self::VersionNotNewer { .. } => "install.version_not_newer",
            Self::NotInstalled { .. } => "install.not_installed",
            Self::IdentityMismatch { .. } => "install.identity_mismatch",
            Self::Failed { .. } => "install.failed",
        };
        Some(code)
    }
}
