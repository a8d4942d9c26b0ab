//! Package installation
//!
//! Interprets a manifest's install steps in declared order. Every run gets
//! its own scoped working directory under the layout's tmp dir; it is
//! removed on all exit paths. On the first failing step, everything this run
//! placed under the prefix or bin dir is reverted before the error surfaces,
//! so a failed install leaves the system in its pre-install state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::{Client, Url};
use tempfile::TempDir;

use crate::core::manifest::{Action, Manifest};
use crate::core::runner::ScriptRunner;
use crate::core::verify::{self, Verification, VerifyError};
use crate::io::dmg::{self, DiskImage};
use crate::io::download::{self, DownloadLimits};
use crate::ops::InstallError;
use crate::store::{InstallRecord, StateRecorder};
use crate::types::Sha256Digest;
use crate::ui::Reporter;
use crate::{filename_from_url, Layout};

/// Mutable state threaded through one install run.
struct StepRun {
    workdir: TempDir,
    prefix: PathBuf,
    prefix_preexisted: bool,
    artifact: Option<PathBuf>,
    digest: Option<Sha256Digest>,
    mount: Option<DiskImage>,
    created: Vec<PathBuf>,
}

/// Execute a manifest's steps and, on success, commit an install record.
///
/// The executor only reports success or failure; the record itself is owned
/// by the [`StateRecorder`].
pub async fn install_manifest<R: Reporter>(
    manifest: &Manifest,
    manifest_dir: &Path,
    layout: &Layout,
    recorder: &StateRecorder,
    runner: &Arc<dyn ScriptRunner>,
    client: &Client,
    limits: &DownloadLimits,
    reporter: &R,
) -> Result<InstallRecord, InstallError> {
    let name = &manifest.package.name;
    let version = &manifest.package.version;

    layout.ensure_dirs()?;
    let workdir = tempfile::Builder::new()
        .prefix("decant-")
        .tempdir_in(layout.tmp_dir())?;

    let prefix = layout.prefix(name, version);
    let mut run = StepRun {
        workdir,
        prefix_preexisted: prefix.exists(),
        prefix,
        artifact: None,
        digest: None,
        mount: None,
        created: Vec::new(),
    };

    reporter.installing(name, version);

    for step in &manifest.steps {
        let result = run_step(
            step,
            manifest,
            manifest_dir,
            layout,
            &mut run,
            runner,
            client,
            limits,
            reporter,
        )
        .await;

        if let Err(err) = result {
            tracing::warn!(package = %name, step = step.kind(), error = %err, "install failed, rolling back");
            rollback(&mut run);
            reporter.failed(name, &err.to_string());
            return Err(err);
        }
    }

    // Detach any mounted image before the workdir goes away.
    run.mount = None;

    let record = recorder
        .commit(manifest, run.digest.as_ref(), run.created.clone())
        .await?;
    reporter.done(name, version, "installed");
    Ok(record)
}

async fn run_step<R: Reporter>(
    step: &Action,
    manifest: &Manifest,
    manifest_dir: &Path,
    layout: &Layout,
    run: &mut StepRun,
    runner: &Arc<dyn ScriptRunner>,
    client: &Client,
    limits: &DownloadLimits,
    reporter: &R,
) -> Result<(), InstallError> {
    match step {
        Action::Download { url } => {
            step_download(url.as_deref(), manifest, run, client, limits, reporter).await
        }
        Action::RunScript { script } => {
            step_run_script(script, manifest, manifest_dir, layout, run, runner).await
        }
        Action::Copy { src, dest } => step_copy(src, dest, manifest_dir, run),
        Action::Shim { target } => step_shim(target, layout, run),
    }
}

async fn step_download<R: Reporter>(
    url_override: Option<&str>,
    manifest: &Manifest,
    run: &mut StepRun,
    client: &Client,
    limits: &DownloadLimits,
    reporter: &R,
) -> Result<(), InstallError> {
    let url_str = url_override.unwrap_or(&manifest.source.url);
    let url = Url::parse(url_str).map_err(|e| InstallError::step("download", e))?;

    let mut filename = filename_from_url(url_str);
    if filename.is_empty() {
        filename = "artifact";
    }
    let dest = run.workdir.path().join(filename);

    reporter.downloading(&manifest.package.name, &manifest.package.version);
    let digest = download::fetch(client, &url, &dest, limits).await?;

    match verify::check(&manifest.source.sha256, &digest) {
        Ok(Verification::Verified) => {
            tracing::debug!(package = %manifest.package.name, sha256 = %digest, "artifact verified");
        }
        Ok(Verification::Bypassed) => {
            tracing::warn!(package = %manifest.package.name, "integrity check skipped by manifest policy");
            reporter.warning(&format!(
                "{}: integrity verification skipped (sha256 = \"no-check\")",
                manifest.package.name
            ));
        }
        Err(VerifyError::Mismatch { expected, actual }) => {
            let _ = std::fs::remove_file(&dest);
            return Err(InstallError::Checksum { expected, actual });
        }
        Err(VerifyError::Io(e)) => return Err(e.into()),
    }

    run.artifact = Some(dest);
    run.digest = Some(digest);
    Ok(())
}

async fn step_run_script(
    script: &str,
    manifest: &Manifest,
    manifest_dir: &Path,
    layout: &Layout,
    run: &mut StepRun,
    runner: &Arc<dyn ScriptRunner>,
) -> Result<(), InstallError> {
    let src = manifest_dir.join(script);
    if !src.exists() {
        return Err(InstallError::step(
            "run-script",
            format!("script not found: {}", src.display()),
        ));
    }

    // The script runs from a copy inside the workdir, like the rest of the
    // build inputs.
    let file_name = src
        .file_name()
        .ok_or_else(|| InstallError::step("run-script", "script path has no file name"))?;
    let staged = run.workdir.path().join(file_name);
    std::fs::copy(&src, &staged).map_err(|e| InstallError::step("run-script", e))?;
    set_executable(&staged).map_err(|e| InstallError::step("run-script", e))?;

    let env = vec![
        ("PREFIX".to_string(), run.prefix.display().to_string()),
        // Documented override: the packaging side-effect (disk image
        // creation) is the script's own release step, not ours.
        ("SKIP_DMG".to_string(), "1".to_string()),
        ("JOBS".to_string(), num_cpus::get().to_string()),
    ];

    let runner = Arc::clone(runner);
    let dir = run.workdir.path().to_path_buf();
    let script_path = staged.clone();
    let outcome = tokio::task::spawn_blocking(move || runner.run(&dir, &script_path, &env))
        .await
        .map_err(|e| InstallError::step("run-script", format!("task panic: {e}")))?
        .map_err(|e| InstallError::step("run-script", e))?;

    write_script_log(layout, manifest, &outcome.output);

    if !outcome.success() {
        let cause = match outcome.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        return Err(InstallError::step("run-script", cause));
    }

    Ok(())
}

fn step_copy(src: &str, dest: &str, manifest_dir: &Path, run: &mut StepRun) -> Result<(), InstallError> {
    let src_path = resolve_copy_src(run, manifest_dir, src)?;
    let dest_path = run.prefix.join(dest);

    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| InstallError::step("copy", e))?;
    }

    // Replace, don't merge: re-running a completed install must reproduce the
    // same tree.
    if dest_path.exists() {
        remove_path(&dest_path).map_err(|e| InstallError::step("copy", e))?;
    }

    if src_path.is_dir() {
        copy_dir_all(&src_path, &dest_path).map_err(|e| InstallError::step("copy", e))?;
    } else {
        std::fs::copy(&src_path, &dest_path).map_err(|e| InstallError::step("copy", e))?;
    }

    run.created.push(dest_path);
    Ok(())
}

fn step_shim(target: &str, layout: &Layout, run: &mut StepRun) -> Result<(), InstallError> {
    let target_abs = run.prefix.join(target);
    let shim_name = Path::new(target)
        .file_name()
        .ok_or_else(|| InstallError::step("shim", "target has no file name"))?;

    std::fs::create_dir_all(layout.bin_dir()).map_err(|e| InstallError::step("shim", e))?;
    let shim_path = layout.bin_dir().join(shim_name);
    write_shim(&shim_path, &target_abs).map_err(|e| InstallError::step("shim", e))?;

    run.created.push(shim_path);
    Ok(())
}

/// Generate a launcher whose content is fully determined by the target path.
/// Regenerated on every install so a changed prefix never leaves a stale
/// launcher behind.
pub fn write_shim(shim_path: &Path, target: &Path) -> std::io::Result<()> {
    let content = format!("#!/bin/sh\nexec \"{}\" \"$@\"\n", target.display());
    std::fs::write(shim_path, content)?;
    set_executable(shim_path)
}

fn resolve_copy_src(
    run: &mut StepRun,
    manifest_dir: &Path,
    src: &str,
) -> Result<PathBuf, InstallError> {
    let in_workdir = run.workdir.path().join(src);
    if in_workdir.exists() {
        return Ok(in_workdir);
    }

    // A disk-image artifact is searched through its mounted volume.
    if let Some(artifact) = run.artifact.clone() {
        if dmg::is_disk_image(&artifact) {
            if run.mount.is_none() {
                let image = DiskImage::attach(&artifact)
                    .map_err(|e| InstallError::step("copy", e))?;
                run.mount = Some(image);
            }
            if let Some(mount) = &run.mount {
                let volume = mount.mount_point();
                let candidate = volume.join(src);
                if candidate.exists() {
                    return Ok(candidate);
                }
                if let Some(found) = find_in_volume(volume, src) {
                    return Ok(found);
                }
            }
        }
    }

    // Files shipped beside the manifest (build scripts' support files).
    let beside_manifest = manifest_dir.join(src);
    if beside_manifest.exists() {
        return Ok(beside_manifest);
    }

    Err(InstallError::step(
        "copy",
        format!("source '{src}' not found in working area"),
    ))
}

/// Search a mounted volume for an entry matching the requested file name.
fn find_in_volume(volume: &Path, src: &str) -> Option<PathBuf> {
    let wanted = Path::new(src).file_name()?;
    walkdir::WalkDir::new(volume)
        .min_depth(1)
        .max_depth(3)
        .into_iter()
        .flatten()
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .find(|e| e.file_name() == wanted)
        .map(|e| e.path().to_path_buf())
}

fn rollback(run: &mut StepRun) {
    run.mount = None;

    for path in run.created.iter().rev() {
        if let Err(e) = remove_path(path) {
            tracing::warn!(path = %path.display(), error = %e, "rollback could not remove path");
        }
    }
    run.created.clear();

    if !run.prefix_preexisted && run.prefix.exists() {
        if let Err(e) = std::fs::remove_dir_all(&run.prefix) {
            tracing::warn!(prefix = %run.prefix.display(), error = %e, "rollback could not remove prefix");
        }
        // Prune the per-package parent if this was its only version.
        if let Some(parent) = run.prefix.parent() {
            let _ = std::fs::remove_dir(parent);
        }
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    fs_extra::dir::copy(
        src,
        dst,
        &fs_extra::dir::CopyOptions::new().content_only(true),
    )
    .map_err(std::io::Error::other)?;
    Ok(())
}

fn set_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn write_script_log(layout: &Layout, manifest: &Manifest, output: &str) {
    let log_path = layout.script_log_path(&manifest.package.name, &manifest.package.version);
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&log_path, output) {
        tracing::warn!(path = %log_path.display(), error = %e, "could not persist script log");
    } else {
        tracing::debug!(path = %log_path.display(), "script output logged");
    }
}

/// Post-install sanity checks: the bin dir should be on PATH, and freshly
/// created launchers should not be shadowed by system copies.
pub fn check_bin_on_path<R: Reporter>(layout: &Layout, record: &InstallRecord, reporter: &R) {
    let bin_dir = layout.bin_dir();
    let path_env = std::env::var_os("PATH").unwrap_or_default();
    let on_path = std::env::split_paths(&path_env).any(|p| p == bin_dir);

    if !on_path {
        reporter.warning(&format!("{} is not in your PATH", bin_dir.display()));
        reporter.info(&format!(
            "add this to your shell profile: export PATH=\"{}:$PATH\"",
            bin_dir.display()
        ));
    }

    for file in &record.installed_files {
        if file.parent() != Some(bin_dir.as_path()) {
            continue;
        }
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Ok(resolved) = which::which(name) {
            if resolved != *file {
                reporter.warning(&format!(
                    "'{name}' is shadowed by {}",
                    resolved.display()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shim_content_is_determined_by_target() {
        let dir = tempfile::tempdir().unwrap();
        let shim = dir.path().join("glow-term");
        let target = Path::new("/prefix/glow-term.app/Contents/MacOS/glow-term");

        write_shim(&shim, target).unwrap();
        let content = std::fs::read_to_string(&shim).unwrap();
        assert!(content.starts_with("#!/bin/sh\n"));
        assert!(content.contains("exec \"/prefix/glow-term.app/Contents/MacOS/glow-term\" \"$@\""));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&shim).unwrap().permissions().mode();
            assert_eq!(mode & 0o755, 0o755);
        }
    }

    #[test]
    fn shim_regenerates_for_new_target() {
        let dir = tempfile::tempdir().unwrap();
        let shim = dir.path().join("tool");

        write_shim(&shim, Path::new("/old/prefix/tool")).unwrap();
        write_shim(&shim, Path::new("/new/prefix/tool")).unwrap();

        let content = std::fs::read_to_string(&shim).unwrap();
        assert!(content.contains("/new/prefix/tool"));
        assert!(!content.contains("/old/prefix/tool"));
    }
}
