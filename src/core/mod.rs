pub mod manifest;
pub mod runner;
pub mod verify;

pub use manifest::{Action, ChecksumPolicy, Manifest, ManifestError};
pub use runner::{ScriptOutcome, ScriptRunner, ShellRunner};
