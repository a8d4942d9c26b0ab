//! Disk image handling via hdiutil

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

/// A mounted disk image. Dropping detaches the volume.
#[derive(Debug)]
pub struct DiskImage {
    mount_point: PathBuf,
}

impl DiskImage {
    /// Attach a disk image read-only and return a handle to its volume.
    pub fn attach(image: &Path) -> Result<Self> {
        let output = Command::new("hdiutil")
            .arg("attach")
            .arg("-nobrowse")
            .arg("-readonly")
            .arg(image)
            .output()
            .context("failed to execute hdiutil")?;

        if !output.status.success() {
            bail!(
                "hdiutil attach failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        // hdiutil prints one line per entry: /dev/diskXsY <TYPE> <MOUNTPOINT>
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if let Some(idx) = line.find("/Volumes/") {
                return Ok(Self {
                    mount_point: PathBuf::from(line[idx..].trim()),
                });
            }
        }

        bail!("no mount point in hdiutil output");
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

impl Drop for DiskImage {
    fn drop(&mut self) {
        let _ = detach(&self.mount_point);
    }
}

/// Detach a mounted volume, retrying while the resource is busy.
fn detach(mount_point: &Path) -> Result<()> {
    for _ in 0..3 {
        let status = Command::new("hdiutil")
            .arg("detach")
            .arg(mount_point)
            .arg("-force")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        if let Ok(s) = status {
            if s.success() {
                return Ok(());
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(500));
    }

    bail!("failed to detach {}", mount_point.display());
}

/// True when the artifact looks like a disk image.
pub fn is_disk_image(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("dmg"))
}
