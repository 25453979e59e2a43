//! BLAKE3 content addressing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded BLAKE3 digest identifying a blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of one package module
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageContent {
    pub data: Vec<u8>,
}

impl PackageContent {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    #[must_use]
    pub fn id(&self) -> ContentId {
        ContentId::from_data(&self.data)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_data_shares_id() {
        let a = PackageContent::new(b"payload".to_vec());
        let b = PackageContent::new(b"payload".to_vec());
        let c = PackageContent::new(b"other".to_vec());
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id().as_str().len(), 64);
    }
}
