//! TOML catalogues used to seed a [`MemoryRepository`](crate::MemoryRepository)
//!
//! ```toml
//! [[package]]
//! name = "org.demo.app"
//! version = "1.0.0"
//! kind = "app"
//! depends = ["org.demo.runtime/1.0.0/x86_64"]
//!
//! [package.modules]
//! binary = "payload bytes"
//! ```

use crate::PackageContent;
use pkgd_errors::{ConfigError, Error};
use pkgd_types::{Arch, Module, ModuleRef, PackageInfo, PackageKind, PackageReference, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalogue {
    #[serde(default, rename = "package")]
    pub packages: Vec<CatalogueEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub arch: Option<Arch>,
    #[serde(default)]
    pub kind: PackageKind,
    #[serde(default)]
    pub description: Option<String>,
    /// `channel:name/version/arch` strings; an optional `#module` suffix
    /// selects a module other than `binary`
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub modules: BTreeMap<Module, String>,
}

impl Catalogue {
    /// # Errors
    ///
    /// Returns an error if the document is not a valid catalogue.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;
        Self::from_toml(&contents)
    }
}

impl CatalogueEntry {
    /// Build the package metadata and module payloads for this entry
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency string is not a valid reference.
    pub fn into_package(
        self,
        default_channel: &str,
        default_arch: Arch,
    ) -> Result<(PackageInfo, BTreeMap<Module, PackageContent>), Error> {
        let reference = PackageReference::new(
            self.channel.unwrap_or_else(|| default_channel.to_string()),
            self.name,
            self.version,
            self.arch.unwrap_or(default_arch),
        );

        let mut info = PackageInfo::new(reference, self.kind);
        info.description = self.description;
        for dependency in &self.depends {
            info.dependencies.push(parse_dependency(dependency)?);
        }

        let mut modules: BTreeMap<Module, PackageContent> = self
            .modules
            .into_iter()
            .map(|(module, payload)| (module, PackageContent::new(payload.into_bytes())))
            .collect();
        if modules.is_empty() {
            modules.insert(
                Module::BINARY,
                PackageContent::new(info.reference.to_string().into_bytes()),
            );
        }
        info.size = modules.values().map(|c| c.len() as u64).sum();

        Ok((info, modules))
    }
}

fn parse_dependency(input: &str) -> Result<ModuleRef, Error> {
    let (reference, module) = match input.split_once('#') {
        Some((reference, module)) => (reference, Module::new(module)),
        None => (input, Module::BINARY),
    };
    Ok(ModuleRef::new(reference.parse()?, module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_entry_defaults() {
        let catalogue = Catalogue::from_toml(
            r#"
[[package]]
name = "org.demo.app"
version = "1.0.0"
depends = ["org.demo.runtime/1.0.0/x86_64", "org.demo.sdk/2.0.0/x86_64#develop"]

[[package]]
name = "org.demo.runtime"
version = "1.0.0"
kind = "runtime"
modules = { binary = "rt" }
"#,
        )
        .unwrap();
        assert_eq!(catalogue.packages.len(), 2);

        let mut entries = catalogue.packages.into_iter();
        let (app, modules) = entries
            .next()
            .unwrap()
            .into_package("main", Arch::X86_64)
            .unwrap();
        assert_eq!(app.kind, PackageKind::App);
        assert_eq!(app.reference.channel, "main");
        assert_eq!(app.dependencies.len(), 2);
        assert_eq!(app.dependencies[1].module, Module::DEVELOP);
        assert!(modules.contains_key(&Module::BINARY));

        let (runtime, modules) = entries
            .next()
            .unwrap()
            .into_package("main", Arch::X86_64)
            .unwrap();
        assert_eq!(runtime.kind, PackageKind::Runtime);
        assert_eq!(runtime.size, 2);
        assert_eq!(modules[&Module::BINARY].data, b"rt");
    }

    #[test]
    fn test_bad_dependency_is_rejected() {
        let catalogue = Catalogue::from_toml(
            r#"
[[package]]
name = "broken"
version = "1.0.0"
depends = ["not-a-reference"]
"#,
        )
        .unwrap();
        let entry = catalogue.packages.into_iter().next().unwrap();
        assert!(entry.into_package("main", Arch::X86_64).is_err());
    }
}
