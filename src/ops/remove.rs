//! Package removal

use crate::ops::InstallError;
use crate::store::{StateError, StateRecorder};
use crate::types::PackageName;
use crate::ui::Reporter;

/// Remove a set of packages, optionally trashing their declared zap paths.
///
/// Each package is handled independently; one missing package does not stop
/// the others. Returns the number of packages removed.
pub async fn remove_packages<R: Reporter>(
    recorder: &StateRecorder,
    packages: &[String],
    zap: bool,
    dry_run: bool,
    reporter: &R,
) -> Result<usize, InstallError> {
    let mut removed_count = 0;

    for pkg in packages {
        let name = PackageName::new(pkg);

        let record = match recorder.get(&name).await? {
            Some(record) => record,
            None => {
                reporter.failed(&name, "not installed");
                continue;
            }
        };

        reporter.removing(&name, &record.version);

        if dry_run {
            for path in &record.installed_files {
                reporter.info(&format!("would remove {}", path.display()));
            }
            if zap {
                for path in &record.zap_paths {
                    reporter.info(&format!("would trash {}", path.display()));
                }
            }
            reporter.done(&name, &record.version, "(dry run)");
            continue;
        }

        match recorder.remove(&name, zap).await {
            Ok(removed) => {
                reporter.done(
                    &name,
                    &record.version,
                    &format!("removed {} path(s)", removed.len()),
                );
                removed_count += 1;
            }
            Err(StateError::NotInstalled(_)) => {
                // Raced with a concurrent removal; report like any other miss.
                reporter.failed(&name, "not installed");
            }
            Err(e) => {
                reporter.failed(&name, &e.to_string());
                return Err(e.into());
            }
        }
    }

    Ok(removed_count)
}
