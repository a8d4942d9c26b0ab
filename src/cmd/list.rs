//! List command

use anyhow::{Context, Result};

use decant::store::StateRecorder;

/// List all installed packages
pub async fn list() -> Result<()> {
    let layout = super::layout()?;
    let recorder = StateRecorder::open_at(&layout.state_db_path())
        .context("failed to open state store")?;

    let records = recorder.list().await?;

    if records.is_empty() {
        println!("No packages installed.");
        println!("Run 'decant install <manifest.toml>' to get started.");
        return Ok(());
    }

    println!("📦 Installed packages:");
    for record in records {
        let ago = format_relative_time(record.installed_at);
        println!(
            "  {} {} ({} file(s), installed {})",
            record.name,
            record.version,
            record.installed_files.len(),
            ago
        );
    }

    Ok(())
}

/// Format a timestamp as relative time
fn format_relative_time(unix_timestamp: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as i64;

    let diff = now - unix_timestamp;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
