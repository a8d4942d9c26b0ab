//! Hash command

use std::path::PathBuf;

use anyhow::Result;

use decant::core::verify::hash_file;

/// Compute SHA-256 digests of files (manifest authoring aid).
pub fn hash(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let digest = hash_file(file)?;
        println!("{} {}", digest, file.display());
    }
    Ok(())
}
