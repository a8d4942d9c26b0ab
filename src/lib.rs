//! decant - a manifest-driven package installer
//!
//! # Overview
//!
//! Decant interprets declarative TOML manifests describing how to install a
//! package: where its source artifact lives, how to verify it, and the
//! ordered steps (download, run an external build script, copy a bundle,
//! generate a launcher) that place it. It records what each install created
//! so removal can undo it, including the auxiliary user-data paths a
//! `--zap` removal trashes.
//!
//! Two manifest flavors share the same machinery:
//!
//! - **formula-style**: fetch a source archive, run the project's own build
//!   script, copy the produced bundle into the prefix.
//! - **cask-style**: fetch a prebuilt disk image, copy the application
//!   bundle out of the mounted volume.
//!
//! # Architecture
//!
//! - Manifests are immutable value structs; all validation is fail-fast and
//!   happens before any network or filesystem activity.
//! - Build scripts are opaque collaborators behind the `ScriptRunner` trait;
//!   the installer sees only an exit code and combined output.
//! - Install state lives in SQLite behind `StateRecorder`, which serializes
//!   same-package operations with per-name locks.
//! - A failed install rolls back everything the run placed; the working
//!   directory is scoped and removed on every exit path.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.decant/
//! ├── apps/       # Installed bundles by name/version
//! ├── bin/        # Generated launchers
//! ├── tmp/        # Per-run working directories
//! ├── logs/       # Build script output
//! └── state.db    # SQLite install records
//! ```

pub mod core;
pub mod io;
pub mod ops;
pub mod store;
pub mod types;
pub mod ui;

// Re-exports for convenience
pub use crate::core::manifest::{Action, ChecksumPolicy, Manifest, ManifestError};
pub use crate::core::runner::{ScriptRunner, ShellRunner};
pub use crate::io::download::DownloadLimits;
pub use crate::ops::InstallError;
pub use crate::store::{InstallRecord, StateRecorder};

use std::path::{Path, PathBuf};

/// User Agent string
pub const USER_AGENT: &str = concat!("decant/", env!("CARGO_PKG_VERSION"));

/// Filesystem layout rooted at the decant home directory.
///
/// Injected everywhere paths are needed so tests can run against a
/// throwaway root; there is no process-wide singleton.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Resolve the layout from `DECANT_HOME` or fall back to `~/.decant`.
    pub fn discover() -> Option<Self> {
        if let Ok(val) = std::env::var("DECANT_HOME") {
            return Some(Self::at(val));
        }
        dirs::home_dir().map(|h| Self::at(h.join(".decant")))
    }

    /// Use an explicit root.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Installed bundles: `<root>/apps`
    pub fn apps_dir(&self) -> PathBuf {
        self.root.join("apps")
    }

    /// Generated launchers: `<root>/bin`
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Per-run working directories: `<root>/tmp` (same volume as apps)
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Build script output: `<root>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// SQLite database path: `<root>/state.db`
    pub fn state_db_path(&self) -> PathBuf {
        self.root.join("state.db")
    }

    /// Install prefix for one package version: `<root>/apps/<name>/<version>`
    pub fn prefix(
        &self,
        name: &types::PackageName,
        version: &types::Version,
    ) -> PathBuf {
        self.apps_dir().join(name.as_str()).join(version.as_str())
    }

    /// Timestamped log file for one build script run.
    pub fn script_log_path(
        &self,
        name: &types::PackageName,
        version: &types::Version,
    ) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.logs_dir()
            .join(format!("build-{name}-{version}-{timestamp}.log"))
    }

    /// Create the working directories this layout needs.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.apps_dir(), self.bin_dir(), self.tmp_dir(), self.logs_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Extract the filename from a URL.
///
/// # Example
///
/// ```
/// use decant::filename_from_url;
///
/// assert_eq!(filename_from_url("https://example.com/path/to/file.dmg"), "file.dmg");
/// assert_eq!(filename_from_url(""), "");
/// ```
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}
