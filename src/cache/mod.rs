//! Content-addressed fragment cache.
//!
//! One directory per project: `manifest.json` records the analyzer version
//! and project identity, and each cached file fragment lives in
//! `<sha1(relative path)>.bin`, postcard-encoded. A cached fragment is
//! only served when its stored content hash matches the file's current
//! content, so the cache can never go stale silently.
//!
//! The directory may be shared by several processes working on the same
//! project; entry writes take an advisory lock and are atomic
//! (temp sibling + rename). The cache is an optimization, never
//! authoritative: every failure path falls back to re-analysis.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::{CacheError, CacheResult};
use crate::semantic::FileFragment;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Manifest {
    analyzer_version: String,
    project_id: String,
    created_at: u64,
}

/// Per-project fragment cache directory.
pub struct FragmentCache {
    dir: PathBuf,
    analyzer_version: String,
    /// Set after the one-shot wholesale rebuild a corrupt entry triggers.
    rebuilt: AtomicBool,
}

impl FragmentCache {
    /// Open the cache, creating the directory as needed. A missing,
    /// unreadable, or version-mismatched manifest invalidates the whole
    /// directory; any inequality of `analyzer_version` counts, no
    /// compatibility rules are inferred.
    pub fn open(
        dir: impl Into<PathBuf>,
        project_id: &str,
        analyzer_version: &str,
    ) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let cache = Self {
            dir,
            analyzer_version: analyzer_version.to_string(),
            rebuilt: AtomicBool::new(false),
        };

        let manifest_path = cache.dir.join(MANIFEST_FILE);
        let valid = fs::read_to_string(&manifest_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Manifest>(&raw).ok())
            .is_some_and(|m| {
                m.analyzer_version == analyzer_version && m.project_id == project_id
            });

        if !valid {
            crate::debug_event!("cache", "invalidating", "{}", cache.dir.display());
            cache.clear()?;
            let manifest = Manifest {
                analyzer_version: analyzer_version.to_string(),
                project_id: project_id.to_string(),
                created_at: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            };
            let raw = serde_json::to_string_pretty(&manifest).map_err(|e| {
                CacheError::CorruptManifest {
                    reason: e.to_string(),
                }
            })?;
            fs::write(&manifest_path, raw).map_err(|e| CacheError::Io {
                path: manifest_path,
                source: e,
            })?;
        }

        Ok(cache)
    }

    /// Load the fragment for `rel_path` if one is cached and its stored
    /// content hash matches `content_hash`. Every failure is a miss.
    pub fn load(&self, rel_path: &str, content_hash: &str) -> Option<FileFragment> {
        let path = self.entry_path(rel_path);
        let bytes = fs::read(&path).ok()?;
        match postcard::from_bytes::<FileFragment>(&bytes) {
            Ok(fragment) if fragment.content_hash == content_hash => Some(fragment),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    "[cache] corrupt entry {}: {e}, falling back to analysis",
                    path.display()
                );
                self.rebuild_once();
                None
            }
        }
    }

    /// Persist a fragment. Atomic replace; the advisory per-entry lock
    /// serializes concurrent writers, and a loser retries once then skips.
    pub fn store(&self, fragment: &FileFragment) -> CacheResult<()> {
        let path = self.entry_path(&fragment.path);
        let lock_path = path.with_extension("lock");

        let lock = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| CacheError::Io {
                path: lock_path.clone(),
                source: e,
            })?;

        let mut locked = lock.try_lock_exclusive().is_ok();
        if !locked {
            std::thread::sleep(Duration::from_millis(20));
            locked = lock.try_lock_exclusive().is_ok();
        }
        if !locked {
            crate::debug_event!("cache", "lock contended, skipping write", "{}", path.display());
            return Ok(());
        }

        let result = self.write_entry(&path, fragment);
        let _ = fs2::FileExt::unlock(&lock);
        result
    }

    fn write_entry(&self, path: &Path, fragment: &FileFragment) -> CacheResult<()> {
        let bytes = postcard::to_allocvec(fragment).map_err(|e| CacheError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        fs::write(temp.path(), &bytes).map_err(|e| CacheError::Io {
            path: temp.path().to_path_buf(),
            source: e,
        })?;
        temp.persist(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }

    /// Drop the entry for a removed file.
    pub fn remove(&self, rel_path: &str) {
        let _ = fs::remove_file(self.entry_path(rel_path));
    }

    /// Delete every cached entry (manifest stays).
    pub fn clear(&self) -> CacheResult<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_entry = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "bin" || e == "lock");
            if is_entry {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    fn rebuild_once(&self) {
        if !self.rebuilt.swap(true, Ordering::SeqCst) {
            crate::log_event!("cache", "corruption detected, rebuilding");
            if let Err(e) = self.clear() {
                tracing::warn!("[cache] rebuild failed: {e}");
            }
        }
    }

    fn entry_path(&self, rel_path: &str) -> PathBuf {
        let mut hasher = Sha1::new();
        hasher.update(rel_path.as_bytes());
        self.dir.join(format!("{:x}.bin", hasher.finalize()))
    }
}
