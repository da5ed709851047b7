//! On-disk store for downloaded documents.
//!
//! Every fetched document is staged as a file in one artifact directory.
//! The store tracks those files and evicts the ones that have aged out.
//!
//! # Age
//!
//! Age is measured from the file's modification time, read fresh at sweep
//! time, not from an in-memory "last used" counter. Files therefore carry
//! their own timestamp across process restarts, and files dropped into the
//! directory by other writers are adopted on the next sweep.
//!
//! # Exclusion
//!
//! [`ArtifactStore::evict_older_than`] takes a closure returning the path
//! that must survive (the active document). The closure is called again
//! for every deletion decision, so a document published while a sweep is
//! running is never deleted by that sweep. Files staged by an in-progress
//! load are protected separately by [`PinGuard`].

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    /// Modification time observed when the file was registered.
    pub modified: SystemTime,
}

/// Outcome of one eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files deleted.
    pub removed: usize,
    /// Aged-out files spared because they back the active document or an
    /// in-progress load.
    pub protected: usize,
    /// Deletions that failed (permission denied, I/O error). Retried on the
    /// next sweep.
    pub failed: usize,
}

#[derive(Default)]
struct Tracked {
    records: HashMap<PathBuf, ArtifactRecord>,
    pinned: HashSet<PathBuf>,
}

/// Tracks and evicts staged document files in one directory.
pub struct ArtifactStore {
    dir: PathBuf,
    tracked: Arc<Mutex<Tracked>>,
}

impl ArtifactStore {
    /// Open (creating if needed) the artifact directory and adopt any files
    /// already in it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create artifact dir: {}", dir.display()))?;
        let store = Self {
            dir,
            tracked: Arc::new(Mutex::new(Tracked::default())),
        };
        store.adopt_untracked();
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A fresh, unused path inside the artifact directory.
    ///
    /// Nothing is created on disk; the caller writes the file and then
    /// calls [`register`](Self::register).
    pub fn allocate(&self, extension: &str) -> PathBuf {
        let name = uuid::Uuid::new_v4().to_string();
        let ext = extension.trim_start_matches('.');
        if ext.is_empty() {
            self.dir.join(name)
        } else {
            self.dir.join(format!("{}.{}", name, ext))
        }
    }

    /// Record a file's existence and timestamp. Idempotent per path: a
    /// second call returns the original record.
    pub fn register(&self, path: &Path) -> Result<ArtifactRecord> {
        let mut tracked = self.lock();
        if let Some(existing) = tracked.records.get(path) {
            return Ok(existing.clone());
        }
        let modified = file_mtime(path)
            .with_context(|| format!("Cannot register missing artifact: {}", path.display()))?;
        let record = ArtifactRecord {
            path: path.to_path_buf(),
            modified,
        };
        tracked.records.insert(path.to_path_buf(), record.clone());
        debug!(path = %path.display(), "registered artifact");
        Ok(record)
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.lock().records.contains_key(path)
    }

    /// All tracked records, sorted by path.
    pub fn records(&self) -> Vec<ArtifactRecord> {
        let mut records: Vec<ArtifactRecord> = self.lock().records.values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Protect `path` from eviction until the guard is dropped.
    pub fn pin(&self, path: &Path) -> PinGuard {
        self.lock().pinned.insert(path.to_path_buf());
        PinGuard {
            path: path.to_path_buf(),
            tracked: Arc::clone(&self.tracked),
        }
    }

    /// Delete a file unconditionally and stop tracking it. A file that is
    /// already gone is not an error.
    pub fn purge(&self, path: &Path) -> Result<()> {
        self.lock().records.remove(path);
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "purged artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to purge artifact: {}", path.display()))
            }
        }
    }

    /// Delete every tracked file older than `max_age`, except the one
    /// `excluding` names and any pinned file.
    ///
    /// `excluding` is re-evaluated immediately before each deletion.
    /// Failures are logged and counted, never returned.
    pub fn evict_older_than<F>(&self, max_age: Duration, excluding: F) -> SweepReport
    where
        F: Fn() -> Option<PathBuf>,
    {
        self.adopt_untracked();

        let candidates: Vec<PathBuf> = self.lock().records.keys().cloned().collect();
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        for path in candidates {
            let modified = match file_mtime(&path) {
                Ok(m) => m,
                Err(e) => {
                    if !path.exists() {
                        debug!(path = %path.display(), "artifact already gone");
                        self.lock().records.remove(&path);
                    } else {
                        warn!(path = %path.display(), error = %e, "cannot stat artifact, skipping");
                        report.failed += 1;
                    }
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= max_age {
                continue;
            }

            // Pin before exclusion: a load publishes and then unpins, so a
            // file found unpinned here is already visible to `excluding`.
            if self.is_pinned(&path)
                || excluding()
                    .as_deref()
                    .is_some_and(|a| same_file(a, &path))
            {
                debug!(path = %path.display(), "sparing active artifact");
                report.protected += 1;
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    self.lock().records.remove(&path);
                    debug!(path = %path.display(), age_secs = age.as_secs(), "evicted artifact");
                    report.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.lock().records.remove(&path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to evict artifact");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                removed = report.removed,
                protected = report.protected,
                failed = report.failed,
                "artifact sweep finished"
            );
        }
        report
    }

    /// Register files other writers left in the directory.
    fn adopt_untracked(&self) {
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "cannot list artifact dir");
                    return;
                }
            };
            if !entry.file_type().is_file() || self.is_tracked(entry.path()) {
                continue;
            }
            if let Err(e) = self.register(entry.path()) {
                debug!(error = %e, "skipping vanished artifact");
            }
        }
    }

    fn is_pinned(&self, path: &Path) -> bool {
        let tracked = self.lock();
        tracked.pinned.iter().any(|p| same_file(p, path))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tracked> {
        // A panic while holding the lock leaves only bookkeeping maps behind;
        // keep using them.
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps a staged file out of eviction sweeps while it is being loaded.
pub struct PinGuard {
    path: PathBuf,
    tracked: Arc<Mutex<Tracked>>,
}

impl PinGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let mut tracked = self.tracked.lock().unwrap_or_else(|e| e.into_inner());
        tracked.pinned.remove(&self.path);
    }
}

fn file_mtime(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
