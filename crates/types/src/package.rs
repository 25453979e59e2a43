//! Package-related type definitions

use crate::Version;
use pkgd_errors::PackageError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Channel assumed when a textual reference omits one
pub const DEFAULT_CHANNEL: &str = "main";

/// CPU architecture a package was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "loong64")]
    Loong64,
    #[serde(rename = "riscv64")]
    Riscv64,
}

impl Arch {
    /// Architecture of the running host, falling back to `x86_64`
    #[must_use]
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "aarch64" => Self::Arm64,
            "loongarch64" => Self::Loong64,
            "riscv64" => Self::Riscv64,
            _ => Self::X86_64,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X86_64 => write!(f, "x86_64"),
            Self::Arm64 => write!(f, "arm64"),
            Self::Loong64 => write!(f, "loong64"),
            Self::Riscv64 => write!(f, "riscv64"),
        }
    }
}

impl FromStr for Arch {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "loong64" | "loongarch64" => Ok(Self::Loong64),
            "riscv64" => Ok(Self::Riscv64),
            other => Err(PackageError::InvalidReference {
                input: other.to_string(),
                reason: "unknown architecture".to_string(),
            }),
        }
    }
}

/// Named payload variant of a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Module(Cow<'static, str>);

impl Module {
    /// Main runtime payload
    pub const BINARY: Self = Self(Cow::Borrowed("binary"));
    /// Headers, debug symbols and other development data
    pub const DEVELOP: Self = Self(Cow::Borrowed("develop"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::BINARY
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable identity of a package
///
/// Textual form is `channel:name/version/arch`; the channel prefix is
/// optional and defaults to [`DEFAULT_CHANNEL`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageReference {
    pub channel: String,
    pub name: String,
    pub version: Version,
    pub arch: Arch,
}

impl PackageReference {
    pub fn new(
        channel: impl Into<String>,
        name: impl Into<String>,
        version: Version,
        arch: Arch,
    ) -> Self {
        Self {
            channel: channel.into(),
            name: name.into(),
            version,
            arch,
        }
    }

    /// Whether both references name the same package, ignoring version
    #[must_use]
    pub fn same_package(&self, other: &Self) -> bool {
        self.name == other.name && self.channel == other.channel && self.arch == other.arch
    }

    /// Copy of this reference pointing at another version
    #[must_use]
    pub fn with_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}",
            self.channel, self.name, self.version, self.arch
        )
    }
}

impl FromStr for PackageReference {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| PackageError::InvalidReference {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (channel, rest) = match s.split_once(':') {
            Some((channel, rest)) if !channel.is_empty() => (channel, rest),
            Some(_) => return Err(invalid("empty channel")),
            None => (DEFAULT_CHANNEL, s),
        };

        let parts: Vec<&str> = rest.split('/').collect();
        let [name, version, arch] = parts.as_slice() else {
            return Err(invalid("expected name/version/arch"));
        };
        if name.is_empty() {
            return Err(invalid("empty name"));
        }

        let version = Version::parse(version).map_err(|e| invalid(&e.to_string()))?;
        let arch = arch.parse().map_err(|_| invalid("unknown architecture"))?;

        Ok(Self::new(channel, *name, version, arch))
    }
}

/// A reference paired with one of its modules: the unit of install/uninstall
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleRef {
    pub reference: PackageReference,
    #[serde(default)]
    pub module: Module,
}

impl ModuleRef {
    #[must_use]
    pub fn new(reference: PackageReference, module: Module) -> Self {
        Self { reference, module }
    }

    /// Whether `installed` satisfies this requirement (same package and
    /// module, at this version or newer)
    #[must_use]
    pub fn is_satisfied_by(&self, installed: &ModuleRef) -> bool {
        self.module == installed.module
            && self.reference.same_package(&installed.reference)
            && installed.reference.version >= self.reference.version
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.reference, self.module)
    }
}

/// Role a package plays in the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// User-facing application; never pruned automatically
    #[default]
    App,
    /// Shared runtime other packages build on
    Runtime,
    /// Base system image
    Base,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::Runtime => write!(f, "runtime"),
            Self::Base => write!(f, "base"),
        }
    }
}

/// Metadata for a resolved package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub reference: PackageReference,
    #[serde(default)]
    pub kind: PackageKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<ModuleRef>,
    /// Installed size in bytes
    #[serde(default)]
    pub size: u64,
    /// Content digest once the payload is known
    #[serde(default)]
    pub digest: Option<String>,
}

impl PackageInfo {
    #[must_use]
    pub fn new(reference: PackageReference, kind: PackageKind) -> Self {
        Self {
            reference,
            kind,
            description: None,
            dependencies: Vec::new(),
            size: 0,
            digest: None,
        }
    }

    #[must_use]
    pub fn with_dependency(mut self, reference: PackageReference, module: Module) -> Self {
        self.dependencies.push(ModuleRef::new(reference, module));
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
