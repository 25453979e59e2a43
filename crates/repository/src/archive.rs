//! Raw package archives

use crate::PackageContent;
use pkgd_errors::{Error, PackageError};
use pkgd_types::{Module, PackageInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Archive container kinds accepted by `install_from_archive`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// A single module of one package
    Layer,
    /// Several modules of one package
    Bundle,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer => write!(f, "layer"),
            Self::Bundle => write!(f, "bundle"),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "layer" => Ok(Self::Layer),
            "bundle" | "uab" => Ok(Self::Bundle),
            other => Err(PackageError::InvalidArchive {
                message: format!("unknown archive format {other}"),
            }),
        }
    }
}

/// Package metadata plus module payloads extracted from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArchive {
    pub info: PackageInfo,
    pub modules: BTreeMap<Module, PackageContent>,
}

/// Turns raw archive bytes into a [`ParsedArchive`]
pub trait ArchiveParser: Send + Sync {
    /// # Errors
    ///
    /// Returns `PackageError::InvalidArchive` if the bytes are not a valid
    /// archive of the requested format.
    fn parse(&self, format: ArchiveFormat, bytes: &[u8]) -> Result<ParsedArchive, Error>;
}

#[derive(Deserialize)]
struct Manifest {
    format: ArchiveFormat,
    info: PackageInfo,
    modules: BTreeMap<Module, String>,
}

/// Parser for JSON manifests carrying their module payloads inline
///
/// ```json
/// { "format": "layer",
///   "info": { "reference": { ... } },
///   "modules": { "binary": "..." } }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestArchiveParser;

impl ArchiveParser for ManifestArchiveParser {
    fn parse(&self, format: ArchiveFormat, bytes: &[u8]) -> Result<ParsedArchive, Error> {
        let invalid =
            |message: String| -> Error { PackageError::InvalidArchive { message }.into() };

        let manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;

        if manifest.format != format {
            return Err(invalid(format!(
                "expected a {format} archive, found {}",
                manifest.format
            )));
        }
        match (format, manifest.modules.len()) {
            (_, 0) => return Err(invalid("archive contains no modules".to_string())),
            (ArchiveFormat::Layer, n) if n > 1 => {
                return Err(invalid(format!("layer archive contains {n} modules")));
            }
            _ => {}
        }

        let modules = manifest
            .modules
            .into_iter()
            .map(|(module, payload)| (module, PackageContent::new(payload.into_bytes())))
            .collect();

        Ok(ParsedArchive {
            info: manifest.info,
            modules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYER: &str = r#"{
        "format": "layer",
        "info": {
            "reference": { "channel": "main", "name": "org.demo.hello", "version": "1.0.0", "arch": "x86_64" },
            "kind": "app"
        },
        "modules": { "binary": "hello world" }
    }"#;

    #[test]
    fn test_parse_layer() {
        let parsed = ManifestArchiveParser
            .parse(ArchiveFormat::Layer, LAYER.as_bytes())
            .unwrap();
        assert_eq!(parsed.info.reference.name, "org.demo.hello");
        assert_eq!(
            parsed.modules[&Module::BINARY],
            PackageContent::new(b"hello world".to_vec())
        );
    }

    #[test]
    fn test_format_mismatch_is_invalid_archive() {
        let err = ManifestArchiveParser
            .parse(ArchiveFormat::Bundle, LAYER.as_bytes())
            .unwrap_err();
        assert_eq!(err.kind(), pkgd_errors::ErrorKind::InvalidArchive);
    }

    #[test]
    fn test_garbage_is_invalid_archive() {
        let err = ManifestArchiveParser
            .parse(ArchiveFormat::Layer, b"\x00\x01not json")
            .unwrap_err();
        assert_eq!(err.kind(), pkgd_errors::ErrorKind::InvalidArchive);
    }

    #[test]
    fn test_layer_rejects_multiple_modules() {
        let doc = LAYER.replace(
            r#""binary": "hello world""#,
            r#""binary": "a", "develop": "b""#,
        );
        assert!(ManifestArchiveParser
            .parse(ArchiveFormat::Layer, doc.as_bytes())
            .is_err());
        assert!(ManifestArchiveParser
            .parse(ArchiveFormat::Bundle, doc.replace("layer", "bundle").as_bytes())
            .is_ok());
    }
}
