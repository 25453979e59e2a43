//! Integration tests for config

#[cfg(test)]
mod tests {
    use pkgd_config::*;
    use pkgd_types::Arch;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[queues]
transaction = 2
search = 8

[interaction]
timeout_secs = 0

[repository]
default_repo = "nightly"
default_channel = "beta"
default_arch = "arm64"

[repository.repos.nightly]
url = "https://nightly.example.com"
priority = 5
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.queues.transaction, 2);
        assert_eq!(config.queues.search, 8);
        assert_eq!(config.queues.maintenance, 1);
        assert_eq!(config.interaction.timeout(), None);
        assert_eq!(config.repository.default_repo, "nightly");
        assert_eq!(config.repository.default_channel, "beta");
        assert_eq!(config.repository.arch(), Arch::Arm64);
        assert_eq!(config.repository.repos["nightly"].priority, 5);
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let result = Config::load_from_file(std::path::Path::new("/nonexistent/pkgd.toml")).await;
        assert!(matches!(
            result,
            Err(pkgd_errors::Error::Config(pkgd_errors::ConfigError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.queues.transaction, 1);
        assert_eq!(config.queues.search, 4);
        assert_eq!(config.queues.maintenance, 1);
        assert_eq!(config.interaction.timeout(), Some(Duration::from_secs(300)));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.queues.search = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_default_repo() {
        let mut config = Config::default();
        config.repository.default_repo = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::set_var("PKGD_TRANSACTION_CONCURRENCY", "3");
        std::env::set_var("PKGD_INTERACTION_TIMEOUT", "10");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.queues.transaction, 3);
        assert_eq!(config.interaction.timeout(), Some(Duration::from_secs(10)));

        std::env::remove_var("PKGD_TRANSACTION_CONCURRENCY");
        std::env::remove_var("PKGD_INTERACTION_TIMEOUT");
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::set_var("PKGD_SEARCH_CONCURRENCY", "many");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(result.is_err());

        std::env::remove_var("PKGD_SEARCH_CONCURRENCY");
    }
}
