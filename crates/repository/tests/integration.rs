//! Integration tests for the memory repository

#[cfg(test)]
mod tests {
    use pkgd_config::RepositoryConfig;
    use pkgd_errors::ErrorKind;
    use pkgd_repository::*;
    use pkgd_types::{Arch, Module, ModuleRef, PackageInfo, PackageKind, PackageReference, Version};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reference(name: &str, version: &str) -> PackageReference {
        PackageReference::new("main", name, Version::parse(version).unwrap(), Arch::X86_64)
    }

    async fn published(repo: &MemoryRepository, info: PackageInfo) {
        let payload = PackageContent::new(info.reference.to_string().into_bytes());
        repo.publish(info, [(Module::BINARY, payload)]).await;
    }

    async fn install(repo: &MemoryRepository, info: &PackageInfo) {
        let target = ModuleRef::new(info.reference.clone(), Module::BINARY);
        let content = repo.fetch(&target).await.unwrap();
        repo.commit(info, &Module::BINARY, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_and_remove_collects_content() {
        let repo = MemoryRepository::default();
        let info = PackageInfo::new(reference("jq", "1.7.0"), PackageKind::App);
        published(&repo, info.clone()).await;

        install(&repo, &info).await;
        assert_eq!(repo.object_count().await, 1);

        let target = ModuleRef::new(info.reference.clone(), Module::BINARY);
        assert!(repo.installed_entry(&target).await.unwrap().is_some());

        repo.remove(&target).await.unwrap();
        assert_eq!(repo.object_count().await, 0);
        assert!(repo.installed().await.unwrap().is_empty());

        let err = repo.remove(&target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_resolve_unknown_reference() {
        let repo = MemoryRepository::default();
        let err = repo.resolve(&reference("missing", "1.0.0")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_referrers_follow_dependencies() {
        let repo = MemoryRepository::default();
        let runtime = PackageInfo::new(reference("runtime", "2.1.0"), PackageKind::Runtime);
        let app = PackageInfo::new(reference("app", "1.0.0"), PackageKind::App)
            .with_dependency(reference("runtime", "2.0.0"), Module::BINARY);
        published(&repo, runtime.clone()).await;
        published(&repo, app.clone()).await;

        install(&repo, &runtime).await;
        assert_eq!(repo.referrers(&runtime.reference).await.unwrap(), 0);

        install(&repo, &app).await;
        assert_eq!(repo.referrers(&runtime.reference).await.unwrap(), 1);
        assert_eq!(repo.referrers(&reference("runtime", "1.0.0")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exclusive_access_blocks_mutation() {
        let repo = MemoryRepository::with_format(RepositoryConfig::default(), 1);
        let info = PackageInfo::new(reference("jq", "1.7.0"), PackageKind::App);
        published(&repo, info.clone()).await;

        assert!(repo.migrate().await.is_err());

        repo.begin_exclusive().await.unwrap();
        assert!(repo.begin_exclusive().await.is_err());
        let err = repo.resolve(&info.reference).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepositoryFailure);

        let migration = repo.migrate().await.unwrap();
        assert_eq!(migration.from_format, 1);
        assert_eq!(migration.to_format, CURRENT_FORMAT);
        repo.end_exclusive().await.unwrap();

        assert_eq!(repo.format_version().await.unwrap(), CURRENT_FORMAT);
        assert!(repo.resolve(&info.reference).await.is_ok());
    }

    #[tokio::test]
    async fn test_search_matches_name_and_description() {
        let repo = MemoryRepository::default();
        published(
            &repo,
            PackageInfo::new(reference("org.demo.editor", "1.0.0"), PackageKind::App)
                .with_description("A text editor"),
        )
        .await;
        published(
            &repo,
            PackageInfo::new(reference("org.demo.player", "1.0.0"), PackageKind::App),
        )
        .await;

        let results = repo.search(&SearchQuery::new("TEXT")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reference.name, "org.demo.editor");

        let results = repo.search(&SearchQuery::new("org.demo")).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_configure_rejects_unknown_default_repo() {
        let repo = MemoryRepository::default();
        let mut config = repo.configuration().await.unwrap();
        config.default_repo = "nowhere".into();
        let err = repo.configure(config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_load_catalogue_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[package]]
name = "org.demo.app"
version = "1.0.0"
arch = "x86_64"
depends = ["org.demo.runtime/1.0.0/x86_64"]

[[package]]
name = "org.demo.runtime"
version = "1.0.0"
arch = "x86_64"
kind = "runtime"
"#
        )
        .unwrap();

        let catalogue = Catalogue::load(file.path()).await.unwrap();
        let repo = MemoryRepository::from_catalogue(RepositoryConfig::default(), catalogue)
            .await
            .unwrap();

        let app = repo.resolve(&reference("org.demo.app", "1.0.0")).await.unwrap();
        assert_eq!(app.dependencies.len(), 1);
        let runtime = ModuleRef::new(reference("org.demo.runtime", "1.0.0"), Module::BINARY);
        assert!(repo.fetch(&runtime).await.is_ok());
    }
}
