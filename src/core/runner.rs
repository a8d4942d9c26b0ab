//! External build script execution
//!
//! Build scripts are opaque collaborators: the installer hands one a working
//! directory and a fixed environment, then reads back only an exit code and
//! combined output. The `ScriptRunner` trait is the seam that keeps the core
//! independent of how scripts actually run, and lets tests substitute a stub.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Result of running an external script.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    /// Exit code, or None if the process was killed by a signal.
    pub code: Option<i32>,
    /// Combined stdout + stderr.
    pub output: String,
}

impl ScriptOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability interface for running an external script.
pub trait ScriptRunner: Send + Sync {
    /// Run `script` with `dir` as the working directory and `env` appended to
    /// the inherited environment. Never retried by callers; build scripts are
    /// not guaranteed idempotent.
    fn run(&self, dir: &Path, script: &Path, env: &[(String, String)]) -> io::Result<ScriptOutcome>;
}

/// Runs scripts through `/bin/sh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ScriptRunner for ShellRunner {
    fn run(&self, dir: &Path, script: &Path, env: &[(String, String)]) -> io::Result<ScriptOutcome> {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg(script).current_dir(dir);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let out = cmd.output()?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(ScriptOutcome {
            code: out.status.code(),
            output,
        })
    }
}

/// A recorded `ScriptRunner` invocation (test support).
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct StubCall {
    pub dir: PathBuf,
    pub script: PathBuf,
    pub env: Vec<(String, String)>,
}

/// A `ScriptRunner` that returns a canned outcome and optionally fabricates
/// build outputs in the working directory. Test support only.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct StubRunner {
    pub exit_code: i32,
    pub output: String,
    /// Relative paths created (with content) under the working dir on run,
    /// simulating what a real build script would leave behind.
    pub creates: Vec<(PathBuf, Vec<u8>)>,
    calls: std::sync::Mutex<Vec<StubCall>>,
}

#[cfg(any(test, feature = "test-support"))]
impl StubRunner {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            output: format!("stub script failed with {exit_code}"),
            ..Self::default()
        }
    }

    pub fn creating(files: Vec<(PathBuf, Vec<u8>)>) -> Self {
        Self {
            creates: files,
            ..Self::default()
        }
    }

    /// Invocations observed so far.
    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().expect("stub call log poisoned").clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ScriptRunner for StubRunner {
    fn run(&self, dir: &Path, script: &Path, env: &[(String, String)]) -> io::Result<ScriptOutcome> {
        self.calls.lock().expect("stub call log poisoned").push(StubCall {
            dir: dir.to_path_buf(),
            script: script.to_path_buf(),
            env: env.to_vec(),
        });

        if self.exit_code == 0 {
            for (rel, content) in &self.creates {
                let dest = dir.join(rel);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&dest, content)?;
            }
        }

        Ok(ScriptOutcome {
            code: Some(self.exit_code),
            output: self.output.clone(),
        })
    }
}
