//! SQLite state database
//!
//! Tracks which packages are installed, the exact files each one placed, and
//! the auxiliary zap paths its manifest declared. The store location is
//! injected at open time so tests run against a throwaway database.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::types::{PackageName, Version};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("package not installed: {0}")]
    NotInstalled(String),

    #[error("failed to remove {path}: {source}")]
    Removal {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state store worker terminated")]
    ActorDied,
}

/// Record of one completed installation.
///
/// Created only after every install step succeeded; removed as a unit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstallRecord {
    pub name: PackageName,
    pub version: Version,
    /// Digest of the fetched artifact, empty when the install had no
    /// download step.
    pub sha256: String,
    /// Paths this install placed, in placement order.
    pub installed_files: Vec<PathBuf>,
    /// Auxiliary user-data paths from the manifest's zap stanza.
    pub zap_paths: Vec<PathBuf>,
    pub installed_at: i64,
}

/// State database for tracking installations.
pub struct StateDb {
    conn: Connection,
}

impl std::fmt::Debug for StateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDb").finish_non_exhaustive()
    }
}

impl StateDb {
    /// Open or create the database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;

        // WAL keeps concurrent readers cheap
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StateError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS packages (
                name TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                installed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                package TEXT NOT NULL REFERENCES packages(name) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                path TEXT NOT NULL,
                PRIMARY KEY (package, seq)
            );

            CREATE TABLE IF NOT EXISTS zap_paths (
                package TEXT NOT NULL REFERENCES packages(name) ON DELETE CASCADE,
                path TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_zap_package ON zap_paths(package);
            ",
        )?;
        Ok(())
    }

    /// Persist a completed installation, replacing any prior record for the
    /// same name. Re-committing an identical install is a no-op in effect.
    pub fn commit(
        &mut self,
        name: &PackageName,
        version: &Version,
        sha256: &str,
        files: &[PathBuf],
        zap: &[PathBuf],
    ) -> Result<InstallRecord, StateError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0) as i64;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM files WHERE package = ?1", params![name.as_str()])?;
        tx.execute(
            "DELETE FROM zap_paths WHERE package = ?1",
            params![name.as_str()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO packages (name, version, sha256, installed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name.as_str(), version.as_str(), sha256, now],
        )?;
        for (seq, path) in files.iter().enumerate() {
            tx.execute(
                "INSERT INTO files (package, seq, path) VALUES (?1, ?2, ?3)",
                params![name.as_str(), seq as i64, path.to_string_lossy().into_owned()],
            )?;
        }
        for path in zap {
            tx.execute(
                "INSERT INTO zap_paths (package, path) VALUES (?1, ?2)",
                params![name.as_str(), path.to_string_lossy().into_owned()],
            )?;
        }
        tx.commit()?;

        Ok(InstallRecord {
            name: name.clone(),
            version: version.clone(),
            sha256: sha256.to_string(),
            installed_files: files.to_vec(),
            zap_paths: zap.to_vec(),
            installed_at: now,
        })
    }

    /// Fetch a package's record, if installed.
    pub fn get(&self, name: &PackageName) -> Result<Option<InstallRecord>, StateError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, version, sha256, installed_at FROM packages WHERE name = ?1",
        )?;
        let mut rows = stmt.query(params![name.as_str()])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let record_name: String = row.get(0)?;
        let version: String = row.get(1)?;
        let sha256: String = row.get(2)?;
        let installed_at: i64 = row.get(3)?;

        Ok(Some(InstallRecord {
            name: PackageName::new(&record_name),
            version: Version::new(&version),
            sha256,
            installed_files: self.package_files(name)?,
            zap_paths: self.package_zap_paths(name)?,
            installed_at,
        }))
    }

    /// All installed packages, ordered by name.
    pub fn list(&self) -> Result<Vec<InstallRecord>, StateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM packages ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            if let Some(record) = self.get(&PackageName::new(&name))? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Drop a package's record and return it. Fails with `NotInstalled` when
    /// there is no record, leaving the database untouched.
    pub fn forget(&mut self, name: &PackageName) -> Result<InstallRecord, StateError> {
        let record = self
            .get(name)?
            .ok_or_else(|| StateError::NotInstalled(name.to_string()))?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM files WHERE package = ?1", params![name.as_str()])?;
        tx.execute(
            "DELETE FROM zap_paths WHERE package = ?1",
            params![name.as_str()],
        )?;
        tx.execute(
            "DELETE FROM packages WHERE name = ?1",
            params![name.as_str()],
        )?;
        tx.commit()?;

        Ok(record)
    }

    fn package_files(&self, name: &PackageName) -> Result<Vec<PathBuf>, StateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM files WHERE package = ?1 ORDER BY seq")?;
        let paths = stmt
            .query_map(params![name.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }

    fn package_zap_paths(&self, name: &PackageName) -> Result<Vec<PathBuf>, StateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM zap_paths WHERE package = ?1")?;
        let paths = stmt
            .query_map(params![name.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }
}
