//! Install command

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;

use decant::core::runner::{ScriptRunner, ShellRunner};
use decant::io::download::DownloadLimits;
use decant::ops;
use decant::store::StateRecorder;
use decant::ui::{ConsoleReporter, Reporter};
use decant::Manifest;

/// Install packages from manifest files.
pub async fn install(manifests: &[PathBuf], dry_run: bool, quiet: bool) -> Result<()> {
    let layout = super::layout()?;
    let reporter = ConsoleReporter::new(quiet);

    // Parse everything up front: a malformed manifest must fail before any
    // network or filesystem activity, even when installing a batch.
    let mut parsed = Vec::with_capacity(manifests.len());
    for path in manifests {
        let manifest = Manifest::from_file(path)
            .with_context(|| format!("failed to load manifest {}", path.display()))?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        parsed.push((manifest, dir));
    }

    if dry_run {
        for (manifest, _) in &parsed {
            reporter.info(&format!(
                "would install {} {}",
                manifest.package.name, manifest.package.version
            ));
        }
        return Ok(());
    }

    let recorder = StateRecorder::open_at(&layout.state_db_path())
        .context("failed to open state store")?;
    let runner: Arc<dyn ScriptRunner> = Arc::new(ShellRunner);
    let client = Client::builder()
        .tcp_nodelay(true)
        .build()
        .context("failed to build HTTP client")?;
    let limits = DownloadLimits::default();

    let mut failures = 0usize;
    for (manifest, dir) in &parsed {
        match ops::install_manifest(
            manifest, dir, &layout, &recorder, &runner, &client, &limits, &reporter,
        )
        .await
        {
            Ok(record) => {
                ops::install::check_bin_on_path(&layout, &record, &reporter);
            }
            Err(e) => {
                tracing::error!(package = %manifest.package.name, error = %e, "install failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} package(s) failed to install");
    }
    Ok(())
}
