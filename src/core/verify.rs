//! Provenance verification
//!
//! Compares a fetched artifact's SHA-256 digest against the manifest's
//! checksum policy. A `no-check` policy passes trivially but is surfaced to
//! the caller as `Verification::Bypassed` so it can be logged as a warning,
//! never silently.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::manifest::ChecksumPolicy;
use crate::types::Sha256Digest;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Digest matched the manifest's expected value.
    Verified,
    /// Policy was `no-check`; integrity was not established.
    Bypassed,
}

/// Compare an already-computed digest against the policy.
pub fn check(policy: &ChecksumPolicy, actual: &Sha256Digest) -> Result<Verification, VerifyError> {
    match policy {
        ChecksumPolicy::Skipped => Ok(Verification::Bypassed),
        ChecksumPolicy::Verified(expected) => {
            if expected == actual {
                Ok(Verification::Verified)
            } else {
                Err(VerifyError::Mismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                })
            }
        }
    }
}

/// Verify a file on disk against the policy.
pub fn verify_file(path: &Path, policy: &ChecksumPolicy) -> Result<Verification, VerifyError> {
    match policy {
        ChecksumPolicy::Skipped => Ok(Verification::Bypassed),
        ChecksumPolicy::Verified(_) => {
            let actual = hash_file(path)?;
            check(policy, &actual)
        }
    }
}

/// Compute the SHA-256 digest of a file (streaming, 64KB buffer).
pub fn hash_file(path: &Path) -> std::io::Result<Sha256Digest> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Sha256Digest::from_bytes(&hasher.finalize()))
}
