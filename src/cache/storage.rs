//! Cache storage implementation

use crate::error::{PipelineError, Result};
use crate::fingerprint::Fingerprint;
use crate::stage::State;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

/// File extension for cache entries; files without it are ignored
pub const CACHE_EXTENSION: &str = "cache";

/// Serialized form of a cached state snapshot
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    /// Snapshot format version
    version: u32,
    /// The post-stage state
    state: State,
}

/// Fingerprint-keyed store of state snapshots under a cache directory
#[derive(Debug)]
pub struct CacheStore {
    /// Directory where cache files are stored; created lazily on first write
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `cache_dir`.
    ///
    /// The directory is not created until the first `store` call, so probing
    /// a cold cache never touches the filesystem.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// The directory this store reads and writes
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the cache file path for a fingerprint
    pub fn entry_path(&self, fp: &Fingerprint) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", fp.as_str(), CACHE_EXTENSION))
    }

    /// Check if an entry exists for a fingerprint
    pub fn exists(&self, fp: &Fingerprint) -> bool {
        self.entry_path(fp).exists()
    }

    /// Load the snapshot stored for a fingerprint.
    ///
    /// Fails with `CacheCorrupt` when the entry cannot be decoded (including
    /// a version mismatch) and with `CacheIo` when the medium fails.
    pub fn load(&self, fp: &Fingerprint) -> Result<State> {
        let path = self.entry_path(fp);

        let bytes = fs::read(&path).map_err(|e| PipelineError::CacheIo {
            path: path.clone(),
            source: e,
        })?;

        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| PipelineError::CacheCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PipelineError::CacheCorrupt {
                path,
                reason: format!(
                    "snapshot version {} is not supported (expected {})",
                    snapshot.version, SNAPSHOT_VERSION
                ),
            });
        }

        debug!(fingerprint = %fp, "loaded cache entry");
        Ok(snapshot.state)
    }

    /// Persist a snapshot for a fingerprint, overwriting any existing entry.
    ///
    /// The write goes to a temp file in the cache directory and is renamed
    /// over the final path, so a concurrent reader never observes a
    /// partially written entry.
    pub fn store(&self, fp: &Fingerprint, state: &State) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).map_err(|e| PipelineError::CacheIo {
                path: self.cache_dir.clone(),
                source: e,
            })?;
        }

        let path = self.entry_path(fp);
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            state: state.clone(),
        };

        let io_err = |e: std::io::Error| PipelineError::CacheIo {
            path: path.clone(),
            source: e,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir).map_err(io_err)?;
        serde_json::to_writer(&mut tmp, &snapshot).map_err(|e| PipelineError::CacheIo {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&path)
            .map_err(|e| PipelineError::CacheIo {
                path: path.clone(),
                source: e.error,
            })?;

        debug!(fingerprint = %fp, "stored cache entry");
        Ok(())
    }

    /// Delete the entry for a fingerprint. Absence is not an error.
    pub fn delete(&self, fp: &Fingerprint) -> Result<()> {
        let path = self.entry_path(fp);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::CacheIo { path, source: e }),
        }
    }

    /// List the fingerprints of all entries currently present.
    ///
    /// Derived from file names; anything without the cache extension is
    /// ignored. A missing cache directory reads as empty.
    pub fn list_all(&self) -> Result<HashSet<Fingerprint>> {
        let mut found = HashSet::new();

        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == CACHE_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    found.insert(Fingerprint::from_file_stem(stem));
                }
            }
        }

        Ok(found)
    }

    /// Delete every entry whose fingerprint is not in `active`.
    ///
    /// Entries with the cache extension but unrelated provenance are
    /// indistinguishable from orphans and are removed too. Returns the
    /// number of entries deleted.
    pub fn sweep(&self, active: &HashSet<Fingerprint>) -> Result<usize> {
        let mut removed = 0;

        for fp in self.list_all()? {
            if !active.contains(&fp) {
                self.delete(&fp)?;
                debug!(fingerprint = %fp, "swept orphaned cache entry");
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn fp(name: &str) -> Fingerprint {
        Fingerprint::derive(name, 0, None)
    }

    fn sample_state() -> State {
        let mut state = State::new();
        state.insert("rows".to_string(), json!(42));
        state.insert("label".to_string(), json!("weiß"));
        state.insert("nested".to_string(), json!({"values": [1, 2, 3]}));
        state
    }

    #[test]
    fn test_store_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache"));
        let fingerprint = fp("load");

        let state = sample_state();
        store.store(&fingerprint, &state).unwrap();

        let loaded = store.load(&fingerprint).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_roundtrip_preserves_insertion_order() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let fingerprint = fp("ordered");

        let mut state = State::new();
        state.insert("zulu".to_string(), json!(1));
        state.insert("alpha".to_string(), json!(2));
        state.insert("mike".to_string(), json!(3));
        store.store(&fingerprint, &state).unwrap();

        let loaded = store.load(&fingerprint).unwrap();
        let keys: Vec<&String> = loaded.keys().collect();
        assert_eq!(keys, ["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_roundtrip_unicode() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let fingerprint = fp("unicode");

        let mut state = State::new();
        state.insert("text".to_string(), json!("ßäœ — 試験"));
        store.store(&fingerprint, &state).unwrap();

        let loaded = store.load(&fingerprint).unwrap();
        assert_eq!(loaded.get("text"), Some(&json!("ßäœ — 試験")));
    }

    #[test]
    fn test_store_creates_directory_lazily() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("deep").join("cache");
        let store = CacheStore::new(&cache_dir);

        assert!(!cache_dir.exists());
        assert!(!store.exists(&fp("load")));
        assert!(store.list_all().unwrap().is_empty());

        store.store(&fp("load"), &sample_state()).unwrap();
        assert!(cache_dir.exists());
    }

    #[test]
    fn test_exists_tracks_store_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let fingerprint = fp("load");

        assert!(!store.exists(&fingerprint));
        store.store(&fingerprint, &sample_state()).unwrap();
        assert!(store.exists(&fingerprint));

        store.delete(&fingerprint).unwrap();
        assert!(!store.exists(&fingerprint));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());

        // Never stored; both deletes succeed
        store.delete(&fp("ghost")).unwrap();
        store.delete(&fp("ghost")).unwrap();
    }

    #[test]
    fn test_load_corrupt_entry() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let fingerprint = fp("load");

        fs::write(store.entry_path(&fingerprint), b"not json at all").unwrap();

        let err = store.load(&fingerprint).unwrap_err();
        assert!(matches!(err, PipelineError::CacheCorrupt { .. }));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let fingerprint = fp("load");

        fs::write(
            store.entry_path(&fingerprint),
            br#"{"version": 99, "state": {}}"#,
        )
        .unwrap();

        let err = store.load(&fingerprint).unwrap_err();
        assert!(matches!(err, PipelineError::CacheCorrupt { .. }));
    }

    #[test]
    fn test_load_missing_entry_is_io_error() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());

        let err = store.load(&fp("ghost")).unwrap_err();
        assert!(matches!(err, PipelineError::CacheIo { .. }));
    }

    #[test]
    fn test_list_all_ignores_foreign_files() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());

        store.store(&fp("load"), &sample_state()).unwrap();
        store.store(&fp("clean"), &sample_state()).unwrap();
        fs::write(temp.path().join("notes.txt"), b"unrelated").unwrap();
        fs::write(temp.path().join("snapshot.json"), b"{}").unwrap();

        let listed = store.list_all().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&fp("load")));
        assert!(listed.contains(&fp("clean")));
    }

    #[test]
    fn test_sweep_removes_only_inactive_entries() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());

        store.store(&fp("load"), &sample_state()).unwrap();
        store.store(&fp("clean"), &sample_state()).unwrap();
        store.store(&fp("stale"), &sample_state()).unwrap();

        let active: HashSet<Fingerprint> = [fp("load"), fp("clean")].into_iter().collect();
        let removed = store.sweep(&active).unwrap();

        assert_eq!(removed, 1);
        assert!(store.exists(&fp("load")));
        assert!(store.exists(&fp("clean")));
        assert!(!store.exists(&fp("stale")));
    }

    #[test]
    fn test_sweep_leaves_foreign_files_alone() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());

        store.store(&fp("load"), &sample_state()).unwrap();
        fs::write(temp.path().join("notes.txt"), b"unrelated").unwrap();

        let removed = store.sweep(&HashSet::new()).unwrap();
        assert_eq!(removed, 1);
        assert!(temp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_store_overwrites_existing_entry() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let fingerprint = fp("load");

        store.store(&fingerprint, &sample_state()).unwrap();

        let mut updated = State::new();
        updated.insert("rows".to_string(), json!(7));
        store.store(&fingerprint, &updated).unwrap();

        let loaded = store.load(&fingerprint).unwrap();
        assert_eq!(loaded, updated);
    }
}
