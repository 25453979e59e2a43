//! Integration tests for error types

#[cfg(test)]
mod tests {
    use pkgd_errors::*;
    use uuid::Uuid;

    #[test]
    fn test_error_conversion() {
        let err: Error = RepositoryError::failed("commit", "disk full").into();
        assert!(matches!(err, Error::Repository(_)));
        assert_eq!(err.kind(), ErrorKind::RepositoryFailure);
    }

    #[test]
    fn test_error_display() {
        let err = InstallError::VersionNotNewer {
            current: "1.2.0".into(),
            requested: "1.1.0".into(),
        };
        assert_eq!(err.to_string(), "1.1.0 is not newer than 1.2.0");
    }

    #[test]
    fn test_kinds_are_stable() {
        let cases: Vec<(Error, ErrorKind)> = vec![
            (
                InstallError::DependencyCycle { chain: "a -> b -> a".into() }.into(),
                ErrorKind::DependencyCycle,
            ),
            (
                InstallError::NotInstalled { package: "a".into() }.into(),
                ErrorKind::NotInstalled,
            ),
            (
                PackageError::InvalidArchive { message: "truncated".into() }.into(),
                ErrorKind::InvalidArchive,
            ),
            (
                OpsError::UnknownInteraction { interaction_id: Uuid::new_v4() }.into(),
                ErrorKind::UnknownInteraction,
            ),
            (
                RepositoryError::NotFound { reference: "a".into() }.into(),
                ErrorKind::NotFound,
            ),
            (Error::Cancelled, ErrorKind::Canceled),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_user_codes() {
        let err: Error = InstallError::DependencyCycle { chain: "a".into() }.into();
        assert_eq!(err.user_code(), Some("install.dependency_cycle"));
        assert!(err.user_hint().is_some());
        assert!(!err.is_retryable());

        let locked: Error = RepositoryError::Locked { operation: "commit".into() }.into();
        assert!(locked.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::VersionNotNewer.to_string(), "version_not_newer");
        assert_eq!(ErrorKind::Canceled.as_str(), "canceled");
    }
}
