//! Check command - validate a manifest without installing

use std::path::Path;

use anyhow::{Context, Result};

use decant::core::manifest::Manifest;

/// Parse and validate a manifest file, reporting what it declares.
pub fn check(path: &Path) -> Result<()> {
    let manifest = Manifest::from_file(path)
        .with_context(|| format!("manifest {} is invalid", path.display()))?;

    println!(
        "✓ {} {} ({} step(s))",
        manifest.package.name,
        manifest.package.version,
        manifest.steps.len()
    );
    for step in &manifest.steps {
        println!("  - {step}");
    }
    if manifest.source.sha256.is_skipped() {
        eprintln!("warning: source checksum is \"no-check\"; installs will skip verification");
    }

    Ok(())
}
