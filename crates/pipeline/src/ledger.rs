//! Ledger store for per-directory encode dispositions.
//!
//! Each directory carries two append-only, newline-delimited basename sets:
//! `encoded.list` (resolved, no further action) and `failed.list` (do not
//! retry). Appends are the crash-safety mechanism: a run interrupted
//! mid-batch leaves every prior disposition durable, and a restarted run
//! excludes resolved basenames during candidate filtering. All access goes
//! through this module; nothing else reads or writes the list files.
//!
//! Basenames are the only key. A file later replaced with different content
//! under the same name stays resolved; re-validating content would cost a
//! probe per file per run and the ledger is deliberately cheap.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// On-disk file name for the `encoded` set.
pub const ENCODED_LIST: &str = "encoded.list";
/// On-disk file name for the `failed` set.
pub const FAILED_LIST: &str = "failed.list";

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// IO error reading or appending a list file.
    #[error("Ledger IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Final outcome recorded for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Resolved: replaced, retained, or skipped as not worthwhile.
    Encoded,
    /// Permanently skip: estimation, encode, or validation failed.
    Failed,
}

impl Disposition {
    /// List file name for this disposition.
    pub fn list_name(&self) -> &'static str {
        match self {
            Disposition::Encoded => ENCODED_LIST,
            Disposition::Failed => FAILED_LIST,
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::Encoded => write!(f, "encoded"),
            Disposition::Failed => write!(f, "failed"),
        }
    }
}

/// Constructs the list file path for a directory and disposition.
pub fn list_path(dir: &Path, disposition: Disposition) -> PathBuf {
    dir.join(disposition.list_name())
}

/// In-memory view of the ledgers touched during one batch run.
///
/// Directories are loaded lazily on first access; writes append to disk
/// first, then update the cache, so a crash between the two never loses a
/// durable disposition. Duplicate lines on disk are tolerated (sets).
#[derive(Debug, Default)]
pub struct Ledger {
    cache: HashMap<(PathBuf, Disposition), HashSet<String>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-basename membership lookup in one directory's set.
    pub fn contains(
        &mut self,
        dir: &Path,
        basename: &str,
        disposition: Disposition,
    ) -> Result<bool, LedgerError> {
        let set = self.load(dir, disposition)?;
        Ok(set.contains(basename))
    }

    /// Records a basename as `encoded` in its directory's ledger.
    pub fn mark_encoded(&mut self, dir: &Path, basename: &str) -> Result<(), LedgerError> {
        self.mark(dir, basename, Disposition::Encoded)
    }

    /// Records a basename as `failed` in its directory's ledger.
    pub fn mark_failed(&mut self, dir: &Path, basename: &str) -> Result<(), LedgerError> {
        self.mark(dir, basename, Disposition::Failed)
    }

    /// Appends the basename to the directory's list file, creating it if
    /// absent. No deduplication on write; readers tolerate duplicates.
    pub fn mark(
        &mut self,
        dir: &Path,
        basename: &str,
        disposition: Disposition,
    ) -> Result<(), LedgerError> {
        let path = list_path(dir, disposition);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LedgerError::Io {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{}", basename).map_err(|source| LedgerError::Io {
            path: path.clone(),
            source,
        })?;

        // Cache update after the durable append.
        self.load(dir, disposition)?;
        self.cache
            .get_mut(&(dir.to_path_buf(), disposition))
            .map(|set| set.insert(basename.to_string()));
        Ok(())
    }

    fn load(
        &mut self,
        dir: &Path,
        disposition: Disposition,
    ) -> Result<&HashSet<String>, LedgerError> {
        let key = (dir.to_path_buf(), disposition);
        if !self.cache.contains_key(&key) {
            let path = list_path(dir, disposition);
            let set = match fs::read_to_string(&path) {
                Ok(content) => content
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
                Err(source) => return Err(LedgerError::Io { path, source }),
            };
            self.cache.insert(key.clone(), set);
        }
        Ok(&self.cache[&key])
    }
}
