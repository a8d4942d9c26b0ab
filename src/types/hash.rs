use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Returned when a digest string is not 64 hex characters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid SHA-256 digest: expected 64 hex characters, got '{0}'")]
pub struct InvalidDigest(pub String);

/// A validated SHA-256 digest (64 lowercase hex characters).
///
/// Validation happens at construction and deserialization time, so invalid
/// hex strings never propagate into comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Create a new digest, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` prefix.
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidDigest> {
        let s = s.into();
        let hex = s.strip_prefix("sha256:").unwrap_or(&s);

        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidDigest(s.clone()));
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Build a digest from raw hash output bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Get the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_64_hex_chars() {
        let d = Sha256Digest::new("a".repeat(64)).unwrap();
        assert_eq!(d.as_str().len(), 64);
    }

    #[test]
    fn strips_prefix_and_lowercases() {
        let d = Sha256Digest::new(format!("sha256:{}", "AB".repeat(32))).unwrap();
        assert_eq!(d.as_str(), "ab".repeat(32));
    }

    #[test]
    fn rejects_short_and_non_hex() {
        assert!(Sha256Digest::new("abc").is_err());
        assert!(Sha256Digest::new("g".repeat(64)).is_err());
    }

    #[test]
    fn from_bytes_matches_hex_encoding() {
        let d = Sha256Digest::from_bytes(&[0xde; 32]);
        assert_eq!(d.as_str(), "de".repeat(32));
    }
}
