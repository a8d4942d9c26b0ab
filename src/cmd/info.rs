//! Info command

use anyhow::{bail, Context, Result};

use decant::store::StateRecorder;
use decant::types::PackageName;

/// Show install state for a package.
pub async fn info(package: &str, json: bool) -> Result<()> {
    let layout = super::layout()?;
    let recorder = StateRecorder::open_at(&layout.state_db_path())
        .context("failed to open state store")?;

    let name = PackageName::new(package);
    let Some(record) = recorder.get(&name).await? else {
        bail!("package '{name}' is not installed");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("📦 {}", record.name);
    println!("  Version: {}", record.version);
    if !record.sha256.is_empty() {
        println!("  Artifact SHA-256: {}", record.sha256);
    }
    if !record.installed_files.is_empty() {
        println!("  Files:");
        for file in &record.installed_files {
            println!("    {}", file.display());
        }
    }
    if !record.zap_paths.is_empty() {
        println!("  Zap paths (removed with --zap):");
        for path in &record.zap_paths {
            println!("    {}", path.display());
        }
    }

    Ok(())
}
