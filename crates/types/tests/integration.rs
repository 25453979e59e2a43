//! Integration tests for types

#[cfg(test)]
mod tests {
    use pkgd_types::*;
    use proptest::prelude::*;

    #[test]
    fn test_arch_serialization() {
        let arch = Arch::Arm64;
        let json = serde_json::to_string(&arch).unwrap();
        assert_eq!(json, r#""arm64""#);

        let deserialized: Arch = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, arch);
    }

    #[test]
    fn test_package_info_defaults_from_json() {
        let json = r#"{
            "reference": { "channel": "main", "name": "org.demo", "version": "1.0.0", "arch": "x86_64" },
            "dependencies": [
                { "reference": { "channel": "main", "name": "org.runtime", "version": "2.0.0", "arch": "x86_64" } }
            ]
        }"#;
        let info: PackageInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.kind, PackageKind::App);
        assert_eq!(info.dependencies.len(), 1);
        assert_eq!(info.dependencies[0].module, Module::BINARY);
    }

    #[test]
    fn test_task_state_serializes_outcome() {
        let reference: PackageReference = "main:org.demo/1.0.0/x86_64".parse().unwrap();
        let mut state = TaskState::new(
            TaskKind::Install,
            TaskTarget::package(reference.clone(), Module::BINARY),
            None,
        );
        state.status = TaskStatus::Succeeded;
        state.outcome = Some(TaskOutcome::Succeeded(TaskOutput::Installed {
            reference,
            module: Module::BINARY,
        }));

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["outcome"]["outcome"], "succeeded");
        assert_eq!(value["outcome"]["detail"]["type"], "installed");
    }

    #[test]
    fn test_update_target_conflicts_on_both_versions() {
        let from: PackageReference = "org.demo/1.0.0/x86_64".parse().unwrap();
        let to: PackageReference = "org.demo/2.0.0/x86_64".parse().unwrap();
        let target = TaskTarget::Update {
            from: from.clone(),
            to: to.clone(),
            module: Module::BINARY,
        };
        let keys = target.conflict_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&ModuleRef::new(from, Module::BINARY)));
        assert!(keys.contains(&ModuleRef::new(to, Module::BINARY)));
        assert!(TaskTarget::Repository.conflict_keys().is_empty());
    }

    proptest! {
        #[test]
        fn prop_satisfaction_follows_version_order(
            required in (0u64..20, 0u64..20, 0u64..20),
            installed in (0u64..20, 0u64..20, 0u64..20),
        ) {
            let required_version = Version::new(required.0, required.1, required.2);
            let installed_version = Version::new(installed.0, installed.1, installed.2);
            let base =
                PackageReference::new("main", "org.demo", required_version.clone(), Arch::X86_64);

            let requirement = ModuleRef::new(base.clone(), Module::BINARY);
            let candidate =
                ModuleRef::new(base.with_version(installed_version.clone()), Module::BINARY);

            prop_assert_eq!(
                requirement.is_satisfied_by(&candidate),
                installed_version >= required_version
            );
        }
    }
}
