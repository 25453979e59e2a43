//! Package descriptor and archive error types

use std::borrow::Cow;

use crate::{ErrorKind, UserFacingError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PackageError {
    #[error("invalid archive: {message}")]
    InvalidArchive { message: String },

    #[error("invalid package reference {input}: {reason}")]
    InvalidReference { input: String, reason: String },

    #[error("archive does not contain module {module}")]
    MissingModule { module: String },
}

impl PackageError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArchive { .. } | Self::MissingModule { .. } => ErrorKind::InvalidArchive,
            Self::InvalidReference { .. } => ErrorKind::InvalidArgument,
        }
    }
}

impl UserFacingError for PackageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidReference { .. } => {
                Some("References look like channel:name/version/arch, e.g. main:org.demo/1.0.0/x86_64.")
            }
            Self::InvalidArchive { .. } | Self::MissingModule { .. } => {
                Some("Re-export the package file and make sure the format flag matches it.")
            }
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidArchive { .. } => "package.invalid_archive",
            Self::InvalidReference { .. } => "package.invalid_reference",
            Self::MissingModule { .. } => "package.missing_module",
        };
        Some(code)
    }
}
