//! Remove command

use anyhow::{Context, Result};

use decant::ops;
use decant::store::StateRecorder;
use decant::ui::ConsoleReporter;

/// Remove installed packages, optionally trashing zap paths.
pub async fn remove(packages: &[String], zap: bool, dry_run: bool, quiet: bool) -> Result<()> {
    let layout = super::layout()?;
    let recorder = StateRecorder::open_at(&layout.state_db_path())
        .context("failed to open state store")?;
    let reporter = ConsoleReporter::new(quiet);

    let removed = ops::remove_packages(&recorder, packages, zap, dry_run, &reporter).await?;

    if removed == 0 && !dry_run {
        anyhow::bail!("nothing removed");
    }
    Ok(())
}
