//! TOML package manifest parsing
//!
//! A manifest is a declarative description of one package: where its source
//! artifact comes from, how to verify it, the ordered steps that install it,
//! and which auxiliary paths a full removal should trash. Manifests carry no
//! control flow of their own; they parse into immutable value structs.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PackageName, Sha256Digest, Version};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("malformed manifest: {0}")]
    Malformed(String),
}

/// Package metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: PackageName,
    pub version: Version,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
}

/// Integrity policy for the source artifact.
///
/// Spelled in TOML as either a 64-hex digest or the literal `"no-check"`.
/// Skipping verification is allowed but never silent; the installer emits a
/// warning whenever a `no-check` artifact is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumPolicy {
    Verified(Sha256Digest),
    Skipped,
}

impl ChecksumPolicy {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl Serialize for ChecksumPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Verified(digest) => serializer.serialize_str(digest.as_str()),
            Self::Skipped => serializer.serialize_str("no-check"),
        }
    }
}

impl<'de> Deserialize<'de> for ChecksumPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.eq_ignore_ascii_case("no-check") {
            return Ok(Self::Skipped);
        }
        Sha256Digest::new(s)
            .map(Self::Verified)
            .map_err(serde::de::Error::custom)
    }
}

/// Package source artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub sha256: ChecksumPolicy,
}

/// A single install step.
///
/// Steps are idempotent-safe: re-running a completed install replaces what
/// the previous run placed rather than corrupting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Fetch the source artifact into the working directory.
    /// `url` overrides `[source] url` when present.
    Download {
        #[serde(default)]
        url: Option<String>,
    },
    /// Run an external build script (resolved relative to the manifest).
    RunScript { script: String },
    /// Copy a file or bundle from the working area into the install prefix.
    Copy { src: String, dest: String },
    /// Generate an executable launcher in the bin dir for an installed binary.
    Shim { target: String },
}

impl Action {
    /// Stable identifier used in error reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Download { .. } => "download",
            Self::RunScript { .. } => "run-script",
            Self::Copy { .. } => "copy",
            Self::Shim { .. } => "shim",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Auxiliary user-data paths removed on `remove --zap`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Zap {
    #[serde(default)]
    pub trash: Vec<String>,
}

/// Complete package manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub package: PackageInfo,
    pub source: Source,
    #[serde(rename = "step", default)]
    pub steps: Vec<Action>,
    #[serde(default)]
    pub zap: Zap,
}

impl Manifest {
    /// Parse and validate a manifest from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a manifest from a TOML string.
    ///
    /// Validation is fail-fast: it runs before any network or filesystem
    /// activity, so a malformed manifest has no side effects.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.package.name.is_empty() {
            return Err(ManifestError::Malformed("package name is empty".into()));
        }
        if self.package.version.is_empty() {
            return Err(ManifestError::Malformed("package version is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(ManifestError::Malformed(
                "manifest declares no install steps".into(),
            ));
        }

        Self::check_url(&self.source.url)?;

        for step in &self.steps {
            match step {
                Action::Download { url: Some(url) } => Self::check_url(url)?,
                Action::Download { url: None } => {}
                Action::RunScript { script } => {
                    if script.is_empty() {
                        return Err(ManifestError::Malformed(
                            "run-script step has an empty script path".into(),
                        ));
                    }
                }
                Action::Copy { src, dest } => {
                    if src.is_empty() || dest.is_empty() {
                        return Err(ManifestError::Malformed(
                            "copy step needs both src and dest".into(),
                        ));
                    }
                    Self::check_relative(dest)?;
                }
                Action::Shim { target } => {
                    if target.is_empty() {
                        return Err(ManifestError::Malformed(
                            "shim step has an empty target".into(),
                        ));
                    }
                    Self::check_relative(target)?;
                }
            }
        }

        Ok(())
    }

    fn check_url(url: &str) -> Result<(), ManifestError> {
        reqwest::Url::parse(url)
            .map_err(|e| ManifestError::Malformed(format!("invalid source url '{url}': {e}")))?;
        Ok(())
    }

    /// Prefix-relative paths must stay inside the prefix.
    fn check_relative(path: &str) -> Result<(), ManifestError> {
        let p = Path::new(path);
        if p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ManifestError::Malformed(format!(
                "path '{path}' must be relative and must not escape the install prefix"
            )));
        }
        Ok(())
    }

    /// Serialize back to TOML (authoring aid).
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl std::str::FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASK_STYLE: &str = r#"
[package]
name = "glow-term"
version = "1.2.0"
description = "Terminal emulator with a phosphor glow"
homepage = "https://example.com/glow-term"

[source]
url = "https://example.com/releases/v1.2.0/glow-term.dmg"
sha256 = "no-check"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "glow-term.app"
dest = "glow-term.app"

[zap]
trash = [
    "~/Library/Application Support/glow-term",
    "~/Library/Preferences/com.glow-term.plist",
]
"#;

    const FORMULA_STYLE: &str = r#"
[package]
name = "glow-term"
version = "1.2.0"

[source]
url = "https://example.com/glow-term-1.2.0.tar.gz"
sha256 = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"

[[step]]
action = "run-script"
script = "build.sh"

[[step]]
action = "copy"
src = "glow-term.app"
dest = "glow-term.app"

[[step]]
action = "shim"
target = "glow-term.app/Contents/MacOS/glow-term"
"#;

    #[test]
    fn parses_cask_style_manifest() {
        let m = Manifest::parse(CASK_STYLE).unwrap();
        assert_eq!(m.package.name, PackageName::new("glow-term"));
        assert_eq!(m.package.version.as_str(), "1.2.0");
        assert!(m.source.sha256.is_skipped());
        assert_eq!(m.steps.len(), 2);
        assert_eq!(m.zap.trash.len(), 2);
    }

    #[test]
    fn parses_formula_style_manifest() {
        let m = Manifest::parse(FORMULA_STYLE).unwrap();
        assert!(!m.source.sha256.is_skipped());
        assert!(matches!(m.steps[0], Action::RunScript { .. }));
        assert!(matches!(m.steps[2], Action::Shim { .. }));
    }

    #[test]
    fn rejects_invalid_toml() {
        assert!(Manifest::parse("this is not toml {{{").is_err());
    }

    #[test]
    fn rejects_missing_steps() {
        let no_steps = r#"
[package]
name = "x"
version = "1.0"

[source]
url = "https://example.com/x.tar.gz"
sha256 = "no-check"
"#;
        let err = Manifest::parse(no_steps).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn rejects_unparseable_url() {
        let bad = CASK_STYLE.replace("https://example.com/releases/v1.2.0/glow-term.dmg", "::");
        let err = Manifest::parse(&bad).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn rejects_bad_digest() {
        let bad = FORMULA_STYLE.replace(&"a".repeat(64), "zzzz");
        assert!(Manifest::parse(&bad).is_err());
    }

    #[test]
    fn rejects_escaping_dest() {
        let bad = CASK_STYLE.replace("dest = \"glow-term.app\"", "dest = \"../evil.app\"");
        let err = Manifest::parse(&bad).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn rejects_empty_name() {
        let bad = CASK_STYLE.replace("name = \"glow-term\"", "name = \"\"");
        let err = Manifest::parse(&bad).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn serialization_roundtrip() {
        let m = Manifest::parse(CASK_STYLE).unwrap();
        let toml_str = m.to_toml().unwrap();
        let reparsed = Manifest::parse(&toml_str).unwrap();
        assert_eq!(m.package.name, reparsed.package.name);
        assert_eq!(m.source.sha256, reparsed.source.sha256);
        assert_eq!(m.steps.len(), reparsed.steps.len());
    }
}
