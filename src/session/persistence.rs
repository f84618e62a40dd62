//! Snapshot persistence for seek sessions.
//!
//! Every save writes a new file; nothing is overwritten or pruned. File names
//! embed a UTC timestamp, the iteration count and a collision counter, so a
//! plain lexical sort lists snapshots oldest to newest:
//!
//! ```text
//! session-20261019T101530123Z-000003-000.json
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tracing::{debug, warn};

use super::SeekSession;
use crate::error::{Result, SeekError};

/// Snapshot file name prefix.
const SNAPSHOT_PREFIX: &str = "session-";

/// Snapshot file extension.
const SNAPSHOT_SUFFIX: &str = ".json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file guarding concurrent writers.
const LOCK_FILE: &str = ".lock";

/// A snapshot found on disk.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    /// Full path of the snapshot file.
    pub path: PathBuf,
    /// Parsed session.
    pub session: SeekSession,
}

impl SnapshotEntry {
    /// File name of the snapshot.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Directory of timestamp-named session snapshots.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the snapshots.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn lock_file_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Persist `session` as a new snapshot and return its path.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Persistence`] if the directory, lock or file
    /// cannot be written.
    pub fn save(&self, session: &SeekSession) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| self.error(&self.dir, e))?;

        let lock_path = self.lock_file_path();
        let lock_file = File::create(&lock_path).map_err(|e| self.error(&lock_path, e))?;
        FileExt::lock_exclusive(&lock_file).map_err(|e| self.error(&lock_path, e))?;

        let path = self.next_snapshot_path(session.iteration_count());
        let tmp_path = tmp_path_for(&path);
        let json = serde_json::to_string_pretty(session)?;

        let write = || -> std::io::Result<()> {
            let mut tmp_file = File::create(&tmp_path)?;
            tmp_file.write_all(json.as_bytes())?;
            tmp_file.sync_all()?;
            fs::rename(&tmp_path, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.error(&path, e));
        }

        debug!(
            "Saved session snapshot {} (iteration {})",
            path.display(),
            session.iteration_count()
        );
        Ok(path)
    }

    /// Load the most recent readable snapshot.
    ///
    /// Corrupt or incompatible snapshots are skipped with a warning and the
    /// next older one is tried. They are left on disk.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory exists but cannot be listed.
    pub fn load_latest(&self) -> Result<Option<SeekSession>> {
        let _guard = self.shared_lock()?;

        for path in self.snapshot_paths()?.into_iter().rev() {
            if let Some(session) = read_snapshot(&path) {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    /// All readable snapshots, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn list(&self) -> Result<Vec<SnapshotEntry>> {
        let _guard = self.shared_lock()?;

        Ok(self
            .snapshot_paths()?
            .into_iter()
            .filter_map(|path| read_snapshot(&path).map(|session| SnapshotEntry { path, session }))
            .collect())
    }

    /// Number of snapshot files, readable or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn count(&self) -> Result<usize> {
        Ok(self.snapshot_paths()?.len())
    }

    /// Snapshot file paths sorted lexically, which is oldest first.
    fn snapshot_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| self.error(&self.dir, e))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_snapshot_name)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn next_snapshot_path(&self, iteration: u32) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let mut seq = 0u32;
        loop {
            let path = self.dir.join(format!(
                "{SNAPSHOT_PREFIX}{stamp}-{iteration:06}-{seq:03}{SNAPSHOT_SUFFIX}"
            ));
            if !path.exists() {
                return path;
            }
            seq += 1;
        }
    }

    fn shared_lock(&self) -> Result<Option<File>> {
        let lock_path = self.lock_file_path();
        if !lock_path.exists() {
            return Ok(None);
        }
        let lock_file = File::open(&lock_path).map_err(|e| self.error(&lock_path, e))?;
        FileExt::lock_shared(&lock_file).map_err(|e| self.error(&lock_path, e))?;
        Ok(Some(lock_file))
    }

    fn error(&self, path: &Path, e: std::io::Error) -> SeekError {
        SeekError::persistence(path, e.to_string())
    }
}

fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(SNAPSHOT_SUFFIX)
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

fn read_snapshot(path: &Path) -> Option<SeekSession> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Skipping unreadable snapshot {}: {}", path.display(), e);
            return None;
        }
    };

    let session: SeekSession = match serde_json::from_str(&contents) {
        Ok(s) => s,
        Err(e) => {
            warn!("Skipping corrupted snapshot {}: {}", path.display(), e);
            return None;
        }
    };

    if !session.is_version_compatible() {
        warn!(
            "Skipping snapshot {} with incompatible version {} (supported: {})",
            path.display(),
            session.metadata.version,
            super::SESSION_STATE_VERSION
        );
        return None;
    }

    if let Err(reason) = session.check_invariants() {
        warn!("Skipping inconsistent snapshot {}: {}", path.display(), reason);
        return None;
    }

    Some(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::Attempt;
    use tempfile::TempDir;

    fn test_store() -> (SessionStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SessionStore::new(temp_dir.path().join(".seekloop/history"));
        (store, temp_dir)
    }

    fn session_with_failures(n: u32) -> SeekSession {
        let mut session = SeekSession::new("orig", "goal", "true");
        for _ in 0..n {
            let i = session.begin_iteration();
            session.record(Attempt::new(i, format!("code {i}"), "error", Some(1), false));
        }
        session
    }

    #[test]
    fn test_load_latest_returns_none_when_missing() {
        let (store, _temp_dir) = test_store();
        assert!(store.load_latest().expect("load").is_none());
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn test_save_creates_directory_and_file() {
        let (store, _temp_dir) = test_store();
        let path = store.save(&session_with_failures(1)).expect("save");

        assert!(path.exists());
        assert!(path.starts_with(store.dir()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("session-"));
        assert!(name.ends_with("-000001-000.json"));
    }

    #[test]
    fn test_save_never_overwrites() {
        let (store, _temp_dir) = test_store();
        let session = session_with_failures(1);

        let first = store.save(&session).expect("first save");
        let second = store.save(&session).expect("second save");
        let third = store.save(&session).expect("third save");

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_load_latest_returns_most_recent() {
        let (store, _temp_dir) = test_store();
        for n in 1..=3 {
            store.save(&session_with_failures(n)).expect("save");
        }

        let loaded = store.load_latest().expect("load").expect("some snapshot");
        assert_eq!(loaded.iteration_count(), 3);
        assert_eq!(loaded.attempts().len(), 3);
    }

    #[test]
    fn test_roundtrip_preserves_session() {
        let (store, _temp_dir) = test_store();
        let mut session = session_with_failures(2);
        let i = session.begin_iteration();
        session.record(Attempt::new(i, "fixed", "All tests passed", Some(0), true));

        store.save(&session).expect("save");
        let loaded = store.load_latest().expect("load").expect("snapshot");
        assert_eq!(loaded, session);
        assert_eq!(loaded.last_successful().unwrap().code, "fixed");
    }

    #[test]
    fn test_no_tmp_file_left_after_save() {
        let (store, _temp_dir) = test_store();
        store.save(&session_with_failures(1)).expect("save");

        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(TMP_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupted_latest_falls_back_to_previous() {
        let (store, _temp_dir) = test_store();
        store.save(&session_with_failures(1)).expect("save");

        let corrupt = store.dir().join("session-99999999T999999999Z-000009-000.json");
        fs::write(&corrupt, "not valid json {{{").unwrap();

        let loaded = store.load_latest().expect("load").expect("older snapshot");
        assert_eq!(loaded.iteration_count(), 1);
        // History is never deleted, even when unreadable.
        assert!(corrupt.exists());
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_incompatible_version_skipped() {
        let (store, _temp_dir) = test_store();
        let mut session = session_with_failures(1);
        session.metadata.version = 999;
        store.save(&session).expect("save");

        assert!(store.load_latest().expect("load").is_none());
    }

    #[test]
    fn test_unrelated_files_ignored() {
        let (store, _temp_dir) = test_store();
        store.save(&session_with_failures(2)).expect("save");
        fs::write(store.dir().join("notes.txt"), "hello").unwrap();
        fs::write(store.dir().join("zzz.json"), "{}").unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].file_name().starts_with("session-"));
    }

    #[test]
    fn test_list_is_oldest_first() {
        let (store, _temp_dir) = test_store();
        for n in 1..=3 {
            store.save(&session_with_failures(n)).expect("save");
        }
        let counts: Vec<u32> = store
            .list()
            .unwrap()
            .iter()
            .map(|e| e.session.iteration_count())
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }
}
