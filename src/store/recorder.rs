//! State recorder
//!
//! Owns the installed-package records. The SQLite connection is not `Sync`,
//! so it lives in a dedicated worker thread reached over a channel, and a
//! per-package-name async mutex serializes commit/remove for the same name
//! while different names proceed independently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex as StdMutex};
use std::thread;

use tokio::sync::{oneshot, Mutex as AsyncMutex};

use super::db::{InstallRecord, StateDb, StateError};
use crate::core::manifest::Manifest;
use crate::types::{PackageName, Sha256Digest};

enum DbEvent {
    Commit {
        manifest: Box<Manifest>,
        sha256: String,
        files: Vec<PathBuf>,
        zap: Vec<PathBuf>,
        resp: oneshot::Sender<Result<InstallRecord, StateError>>,
    },
    Get {
        name: PackageName,
        resp: oneshot::Sender<Result<Option<InstallRecord>, StateError>>,
    },
    List {
        resp: oneshot::Sender<Result<Vec<InstallRecord>, StateError>>,
    },
    Forget {
        name: PackageName,
        resp: oneshot::Sender<Result<InstallRecord, StateError>>,
    },
}

/// Handle to the record store. Clone-cheap, `Send + Sync`.
#[derive(Clone)]
pub struct StateRecorder {
    sender: mpsc::Sender<DbEvent>,
    locks: Arc<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl std::fmt::Debug for StateRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRecorder").finish_non_exhaustive()
    }
}

impl StateRecorder {
    /// Open the record store at `path`, spawning the worker thread.
    pub fn open_at(path: &Path) -> Result<Self, StateError> {
        let db = StateDb::open_at(path)?;
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || run_db_event_loop(db, receiver));

        Ok(Self {
            sender,
            locks: Arc::new(StdMutex::new(HashMap::new())),
        })
    }

    /// Single-writer lock keyed by package name.
    fn name_lock(&self, name: &PackageName) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn request<T, F>(&self, f: F) -> Result<T, StateError>
    where
        F: FnOnce(oneshot::Sender<Result<T, StateError>>) -> DbEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| StateError::ActorDied)?;
        rx.await.map_err(|_| StateError::ActorDied)?
    }

    /// Record a completed installation.
    ///
    /// Called only after every install step has succeeded; the executor never
    /// writes records itself.
    pub async fn commit(
        &self,
        manifest: &Manifest,
        sha256: Option<&Sha256Digest>,
        files: Vec<PathBuf>,
    ) -> Result<InstallRecord, StateError> {
        let lock = self.name_lock(&manifest.package.name);
        let _guard = lock.lock().await;

        let zap = manifest.zap.trash.iter().map(|p| expand_tilde(p)).collect();
        self.request(|resp| DbEvent::Commit {
            manifest: Box::new(manifest.clone()),
            sha256: sha256.map(|d| d.to_string()).unwrap_or_default(),
            files,
            zap,
            resp,
        })
        .await
    }

    /// Fetch a package's install record.
    pub async fn get(&self, name: &PackageName) -> Result<Option<InstallRecord>, StateError> {
        let name = name.clone();
        self.request(|resp| DbEvent::Get { name, resp }).await
    }

    /// All install records, ordered by name.
    pub async fn list(&self) -> Result<Vec<InstallRecord>, StateError> {
        self.request(|resp| DbEvent::List { resp }).await
    }

    /// Remove an installed package.
    ///
    /// Deletes every recorded installed file and, when `zap` is set, every
    /// declared zap path, then drops the record. A package with no record
    /// fails with `NotInstalled` before any filesystem change. Returns the
    /// paths that were actually deleted.
    pub async fn remove(&self, name: &PackageName, zap: bool) -> Result<Vec<PathBuf>, StateError> {
        let lock = self.name_lock(name);
        let _guard = lock.lock().await;

        let record = self
            .get_unlocked(name)
            .await?
            .ok_or_else(|| StateError::NotInstalled(name.to_string()))?;

        let mut targets = record.installed_files.clone();
        if zap {
            targets.extend(record.zap_paths.iter().cloned());
        }

        let mut removed = Vec::new();
        for path in &targets {
            if !path.exists() {
                continue;
            }
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            match result {
                Ok(()) => {
                    prune_empty_parents(path);
                    removed.push(path.clone());
                }
                Err(source) => {
                    // Record stays; the caller can retry once the path is
                    // writable again.
                    return Err(StateError::Removal {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        let name_owned = name.clone();
        self.request(|resp| DbEvent::Forget {
            name: name_owned,
            resp,
        })
        .await?;

        tracing::info!(package = %name, files = removed.len(), zap, "package removed");
        Ok(removed)
    }

    async fn get_unlocked(
        &self,
        name: &PackageName,
    ) -> Result<Option<InstallRecord>, StateError> {
        let name = name.clone();
        self.request(|resp| DbEvent::Get { name, resp }).await
    }
}

fn run_db_event_loop(mut db: StateDb, receiver: mpsc::Receiver<DbEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            DbEvent::Commit {
                manifest,
                sha256,
                files,
                zap,
                resp,
            } => {
                let _ = resp.send(db.commit(
                    &manifest.package.name,
                    &manifest.package.version,
                    &sha256,
                    &files,
                    &zap,
                ));
            }
            DbEvent::Get { name, resp } => {
                let _ = resp.send(db.get(&name));
            }
            DbEvent::List { resp } => {
                let _ = resp.send(db.list());
            }
            DbEvent::Forget { name, resp } => {
                let _ = resp.send(db.forget(&name));
            }
        }
    }
}

/// Remove now-empty parent directories left behind by a deleted path, at
/// most two levels up (the version dir and the package dir of a prefix).
fn prune_empty_parents(path: &Path) {
    let mut current = path.parent();
    for _ in 0..2 {
        let Some(dir) = current else { break };
        // remove_dir refuses non-empty directories, which bounds the climb.
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
