//! End-to-end install/remove flows against a throwaway layout.
//!
//! Downloads use `file://` URLs so no network is involved; build scripts run
//! through `StubRunner`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use decant::core::runner::{ScriptRunner, StubRunner};
use decant::io::download::DownloadLimits;
use decant::ops::{self, InstallError};
use decant::store::{StateError, StateRecorder};
use decant::types::PackageName;
use decant::ui::RecordingReporter;
use decant::{Layout, Manifest};

struct Env {
    _tmp: TempDir,
    layout: Layout,
    recorder: StateRecorder,
    client: Client,
    limits: DownloadLimits,
    manifest_dir: PathBuf,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let layout = Layout::at(tmp.path().join("home"));
        let recorder =
            StateRecorder::open_at(&layout.state_db_path()).expect("failed to open state store");
        let manifest_dir = tmp.path().join("tap");
        std::fs::create_dir_all(&manifest_dir).expect("failed to create manifest dir");

        Self {
            _tmp: tmp,
            layout,
            recorder,
            client: Client::new(),
            limits: DownloadLimits::default(),
            manifest_dir,
        }
    }

    /// Stage an artifact file next to nothing in particular and return its
    /// file:// URL.
    fn stage_artifact(&self, name: &str, content: &[u8]) -> String {
        let path = self.manifest_dir.join(name);
        std::fs::write(&path, content).expect("failed to stage artifact");
        reqwest::Url::from_file_path(&path).expect("absolute path").to_string()
    }

    fn write_script(&self, name: &str) {
        std::fs::write(self.manifest_dir.join(name), "#!/bin/sh\nexit 0\n")
            .expect("failed to write script");
    }

    async fn install(
        &self,
        manifest: &Manifest,
        runner: &Arc<dyn ScriptRunner>,
        reporter: &RecordingReporter,
    ) -> Result<decant::InstallRecord, InstallError> {
        ops::install_manifest(
            manifest,
            &self.manifest_dir,
            &self.layout,
            &self.recorder,
            runner,
            &self.client,
            &self.limits,
            reporter,
        )
        .await
    }

    fn prefix(&self, manifest: &Manifest) -> PathBuf {
        self.layout
            .prefix(&manifest.package.name, &manifest.package.version)
    }

    /// Everything currently under the apps dir, for before/after comparisons.
    fn apps_entries(&self) -> Vec<PathBuf> {
        let apps = self.layout.apps_dir();
        if !apps.exists() {
            return Vec::new();
        }
        walkdir::WalkDir::new(&apps)
            .min_depth(1)
            .into_iter()
            .flatten()
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    fn tmp_is_clean(&self) -> bool {
        let tmp = self.layout.tmp_dir();
        !tmp.exists()
            || std::fs::read_dir(&tmp)
                .map(|mut d| d.next().is_none())
                .unwrap_or(true)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn shell_runner() -> Arc<dyn ScriptRunner> {
    Arc::new(decant::ShellRunner)
}

#[tokio::test]
async fn cask_flow_installs_and_records() {
    let env = Env::new();
    let url = env.stage_artifact("x.app", b"bundle bytes");
    let manifest = Manifest::parse(&format!(
        r#"
[package]
name = "x"
version = "1.0"

[source]
url = "{url}"
sha256 = "no-check"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "x.app"
dest = "x.app"
"#
    ))
    .unwrap();

    let reporter = RecordingReporter::new();
    let record = env.install(&manifest, &shell_runner(), &reporter).await.unwrap();

    let expected = env.prefix(&manifest).join("x.app");
    assert_eq!(record.installed_files, vec![expected.clone()]);
    assert_eq!(std::fs::read(&expected).unwrap(), b"bundle bytes");
    assert!(env.tmp_is_clean(), "workdir must be cleaned up");

    // Bypassed verification is loud, never silent.
    let warnings = reporter.messages("warning");
    assert!(
        warnings.iter().any(|w| w.contains("verification skipped")),
        "expected a skip warning, got {warnings:?}"
    );
}

#[tokio::test]
async fn verified_artifact_installs_quietly() {
    let env = Env::new();
    let payload = b"verified payload";
    let url = env.stage_artifact("tool.bin", payload);
    let manifest = Manifest::parse(&format!(
        r#"
[package]
name = "tool"
version = "2.0"

[source]
url = "{url}"
sha256 = "{}"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "tool.bin"
dest = "tool.bin"
"#,
        sha256_hex(payload)
    ))
    .unwrap();

    let reporter = RecordingReporter::new();
    let record = env.install(&manifest, &shell_runner(), &reporter).await.unwrap();

    assert_eq!(record.sha256, sha256_hex(payload));
    assert!(reporter.messages("warning").is_empty());
}

#[tokio::test]
async fn tampered_artifact_fails_closed() {
    let env = Env::new();
    let url = env.stage_artifact("pkg.bin", b"tampered content");
    let manifest = Manifest::parse(&format!(
        r#"
[package]
name = "pkg"
version = "1.0"

[source]
url = "{url}"
sha256 = "{}"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "pkg.bin"
dest = "pkg.bin"
"#,
        sha256_hex(b"expected content")
    ))
    .unwrap();

    let reporter = RecordingReporter::new();
    let err = env
        .install(&manifest, &shell_runner(), &reporter)
        .await
        .unwrap_err();

    assert!(matches!(err, InstallError::Checksum { .. }));
    assert!(env.apps_entries().is_empty(), "no prefix writes on mismatch");
    assert!(env.tmp_is_clean(), "no temp residue on mismatch");
    assert!(env
        .recorder
        .get(&manifest.package.name)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn failing_script_rolls_back_placed_files() {
    let env = Env::new();
    let url = env.stage_artifact("pkg.bin", b"payload");
    env.write_script("build.sh");
    let manifest = Manifest::parse(&format!(
        r#"
[package]
name = "pkg"
version = "1.0"

[source]
url = "{url}"
sha256 = "no-check"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "pkg.bin"
dest = "pkg.bin"

[[step]]
action = "run-script"
script = "build.sh"
"#
    ))
    .unwrap();

    let before = env.apps_entries();
    let runner: Arc<dyn ScriptRunner> = Arc::new(StubRunner::failing(1));
    let reporter = RecordingReporter::new();
    let err = env.install(&manifest, &runner, &reporter).await.unwrap_err();

    match err {
        InstallError::Step { step, cause } => {
            assert_eq!(step, "run-script");
            assert!(cause.contains("exit code 1"), "cause was: {cause}");
        }
        other => panic!("expected Step error, got {other}"),
    }
    assert_eq!(env.apps_entries(), before, "rollback must restore the prefix");
    assert!(env.tmp_is_clean(), "workdir must be removed after failure");
}

#[tokio::test]
async fn formula_flow_builds_through_script_runner() {
    let env = Env::new();
    env.write_script("build.sh");
    let manifest = Manifest::parse(
        r#"
[package]
name = "demo"
version = "1.2.0"

[source]
url = "https://example.com/demo-1.2.0.tar.gz"
sha256 = "no-check"

[[step]]
action = "run-script"
script = "build.sh"

[[step]]
action = "copy"
src = "demo.app"
dest = "demo.app"

[[step]]
action = "shim"
target = "demo.app/Contents/MacOS/demo"
"#,
    )
    .unwrap();

    let stub = Arc::new(StubRunner::creating(vec![(
        PathBuf::from("demo.app/Contents/MacOS/demo"),
        b"binary".to_vec(),
    )]));
    let runner: Arc<dyn ScriptRunner> = stub.clone();
    let reporter = RecordingReporter::new();
    let record = env.install(&manifest, &runner, &reporter).await.unwrap();

    // The script saw the documented environment.
    let calls = stub.calls();
    assert_eq!(calls.len(), 1);
    let env_vars = &calls[0].env;
    assert!(env_vars.iter().any(|(k, v)| k == "SKIP_DMG" && v == "1"));
    let prefix = env.prefix(&manifest);
    assert!(env_vars
        .iter()
        .any(|(k, v)| k == "PREFIX" && Path::new(v) == prefix));

    // Bundle landed in the prefix, launcher in bin.
    let bundle = prefix.join("demo.app");
    let shim = env.layout.bin_dir().join("demo");
    assert!(bundle.join("Contents/MacOS/demo").exists());
    let shim_content = std::fs::read_to_string(&shim).unwrap();
    assert!(shim_content.contains(&prefix.join("demo.app/Contents/MacOS/demo").display().to_string()));
    assert_eq!(record.installed_files, vec![bundle, shim]);
}

#[tokio::test]
async fn reinstall_after_remove_reproduces_file_set() {
    let env = Env::new();
    let url = env.stage_artifact("x.app", b"bundle");
    let toml = format!(
        r#"
[package]
name = "x"
version = "1.0"

[source]
url = "{url}"
sha256 = "no-check"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "x.app"
dest = "x.app"
"#
    );
    let manifest = Manifest::parse(&toml).unwrap();
    let reporter = RecordingReporter::new();

    let first = env.install(&manifest, &shell_runner(), &reporter).await.unwrap();
    env.recorder.remove(&manifest.package.name, false).await.unwrap();
    assert!(env.apps_entries().is_empty());

    let second = env.install(&manifest, &shell_runner(), &reporter).await.unwrap();
    assert_eq!(first.installed_files, second.installed_files);
    assert!(second.installed_files[0].exists());
}

#[tokio::test]
async fn remove_covers_zap_paths_then_reports_not_installed() {
    let env = Env::new();
    let url = env.stage_artifact("x.app", b"bundle");
    let prefs = env.manifest_dir.join("com.x.plist");
    std::fs::write(&prefs, b"prefs").unwrap();

    let manifest = Manifest::parse(&format!(
        r#"
[package]
name = "x"
version = "1.0"

[source]
url = "{url}"
sha256 = "no-check"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "x.app"
dest = "x.app"

[zap]
trash = ["{}"]
"#,
        prefs.display()
    ))
    .unwrap();

    let reporter = RecordingReporter::new();
    let record = env.install(&manifest, &shell_runner(), &reporter).await.unwrap();

    let removed = env.recorder.remove(&manifest.package.name, true).await.unwrap();
    assert!(removed.contains(&record.installed_files[0]));
    assert!(removed.contains(&prefs));
    assert!(!prefs.exists());

    let err = env
        .recorder
        .remove(&manifest.package.name, true)
        .await
        .unwrap_err();
    assert!(matches!(err, StateError::NotInstalled(_)));
}

#[tokio::test]
async fn remove_never_installed_deletes_nothing() {
    let env = Env::new();
    let decoy = env.manifest_dir.join("decoy.bin");
    std::fs::write(&decoy, b"keep me").unwrap();

    let err = env
        .recorder
        .remove(&PackageName::new("ghost"), true)
        .await
        .unwrap_err();

    assert!(matches!(err, StateError::NotInstalled(_)));
    assert!(decoy.exists());
}

#[tokio::test]
async fn http_install_verifies_streamed_digest() {
    let env = Env::new();
    let payload = b"remote bundle".to_vec();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/remote.app")
        .with_status(200)
        .with_body(payload.clone())
        .create_async()
        .await;

    let manifest = Manifest::parse(&format!(
        r#"
[package]
name = "remote"
version = "0.9"

[source]
url = "{}/remote.app"
sha256 = "{}"

[[step]]
action = "download"

[[step]]
action = "copy"
src = "remote.app"
dest = "remote.app"
"#,
        server.url(),
        sha256_hex(&payload)
    ))
    .unwrap();

    let reporter = RecordingReporter::new();
    let record = env.install(&manifest, &shell_runner(), &reporter).await.unwrap();

    assert_eq!(record.sha256, sha256_hex(&payload));
    assert_eq!(
        std::fs::read(&record.installed_files[0]).unwrap(),
        payload
    );
}
