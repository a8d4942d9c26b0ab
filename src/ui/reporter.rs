//! Reporter trait for dependency injection
//!
//! Core logic reports progress through this trait instead of printing, so
//! the CLI front end stays swappable and tests can observe what was said.

use crate::types::{PackageName, Version};

pub trait Reporter: Send + Sync {
    /// A download is starting for the named package.
    fn downloading(&self, name: &PackageName, version: &Version);

    /// Updates the state of a package to 'installing'.
    fn installing(&self, name: &PackageName, version: &Version);

    /// Updates the state of a package to 'removing'.
    fn removing(&self, name: &PackageName, version: &Version);

    /// Marks a package operation as successfully completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str);

    /// Marks a package operation as failed with a specific reason.
    fn failed(&self, name: &PackageName, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);
}

/// A `Reporter` that retains every message (test support).
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages of a given level ("warning", "info", ...).
    pub fn messages(&self, level: &str) -> Vec<String> {
        self.messages
            .lock()
            .expect("reporter log poisoned")
            .iter()
            .filter(|(l, _)| l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn record(&self, level: &str, msg: String) {
        self.messages
            .lock()
            .expect("reporter log poisoned")
            .push((level.to_string(), msg));
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Reporter for RecordingReporter {
    fn downloading(&self, name: &PackageName, version: &Version) {
        self.record("downloading", format!("{name} {version}"));
    }

    fn installing(&self, name: &PackageName, version: &Version) {
        self.record("installing", format!("{name} {version}"));
    }

    fn removing(&self, name: &PackageName, version: &Version) {
        self.record("removing", format!("{name} {version}"));
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        self.record("done", format!("{name} {version} {detail}"));
    }

    fn failed(&self, name: &PackageName, reason: &str) {
        self.record("failed", format!("{name}: {reason}"));
    }

    fn info(&self, msg: &str) {
        self.record("info", msg.to_string());
    }

    fn warning(&self, msg: &str) {
        self.record("warning", msg.to_string());
    }

    fn error(&self, msg: &str) {
        self.record("error", msg.to_string());
    }
}
