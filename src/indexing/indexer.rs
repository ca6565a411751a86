//! Per-package incremental indexer.
//!
//! Owns the package's semantic index and reconciles filesystem change
//! events into it: subtract the prior fragment, analyze (or cache-load)
//! the new content, add the new fragment, emit an update. The relational
//! store is not touched here; rebuilds are explicit and happen above.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use parking_lot::Mutex;
use rayon::prelude::*;
use tokio::sync::{broadcast, mpsc};

use crate::binding::Binding;
use crate::cache::FragmentCache;
use crate::config::Settings;
use crate::semantic::{content_hash, SemanticIndex};
use crate::types::{ChangeKind, FileChange};
use crate::watcher::WatchSignal;

use super::{ChangeDebouncer, FileWalker, IndexUpdate};

/// Callback for initial-index progress: (processed, total, current file).
pub type ProgressFn = dyn Fn(usize, usize, &str) + Send + Sync;

/// Outcome of an initial indexing pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub files: usize,
    pub symbols: usize,
    pub cache_hits: usize,
    pub analyzed: usize,
    pub failed: usize,
}

pub struct PackageIndexer {
    package: String,
    root: PathBuf,
    binding: Arc<dyn Binding>,
    walker: FileWalker,
    cache: FragmentCache,
    index: SemanticIndex,
    updates: broadcast::Sender<IndexUpdate>,
}

impl PackageIndexer {
    pub fn new(
        package: impl Into<String>,
        version: Option<String>,
        root: impl Into<PathBuf>,
        binding: Arc<dyn Binding>,
        settings: Arc<Settings>,
        cache: FragmentCache,
        updates: broadcast::Sender<IndexUpdate>,
    ) -> Self {
        let package = package.into();
        Self {
            index: SemanticIndex::new(&package, version),
            package,
            root: root.into(),
            binding,
            walker: FileWalker::new(settings),
            cache,
            updates,
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// Enumerate all source files, load what the cache can serve, analyze
    /// the rest on the CPU pool, and merge everything. Emits one
    /// `Initial` update at completion.
    pub fn initial_index(&mut self, progress: Option<&ProgressFn>) -> IndexStats {
        let files = self.walker.collect_sorted(&self.root, self.binding.as_ref());
        let total = files.len();
        let done = AtomicUsize::new(0);
        let mut stats = IndexStats::default();

        let mut misses: Vec<(String, String, u64)> = Vec::new();
        for path in &files {
            let Some(rel) = self.rel_path(path) else {
                continue;
            };
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let hash = content_hash(&content);
                    if let Some(fragment) = self.cache.load(&rel, &hash) {
                        stats.cache_hits += 1;
                        self.index.insert_fragment(fragment);
                        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(cb) = progress {
                            cb(n, total, &rel);
                        }
                    } else {
                        misses.push((rel, content, file_mtime(path)));
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    done.fetch_add(1, Ordering::Relaxed);
                    self.emit_error(Some(rel), "read", e.to_string());
                }
            }
        }

        let binding = self.binding.clone();
        let package = self.package.clone();
        let analyzed: Vec<_> = misses
            .into_par_iter()
            .map(|(rel, content, mtime)| {
                let result = binding.analyze(&package, &rel, &content).map(|mut fragment| {
                    fragment.content_hash = content_hash(&content);
                    fragment.mtime = mtime;
                    fragment
                });
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = progress {
                    cb(n, total, &rel);
                }
                (rel, result)
            })
            .collect();

        for (rel, result) in analyzed {
            match result {
                Ok(fragment) => {
                    if let Err(e) = self.cache.store(&fragment) {
                        tracing::warn!("[indexer] cache write failed for {rel}: {e}");
                    }
                    self.index.insert_fragment(fragment);
                    stats.analyzed += 1;
                }
                Err(e) => {
                    stats.failed += 1;
                    self.emit_error(Some(rel), "analyze", e.to_string());
                }
            }
        }

        stats.files = self.index.file_count();
        stats.symbols = self.index.symbol_count();
        self.emit(IndexUpdate::Initial {
            package: self.package.clone(),
            fragment_count: self.index.file_count(),
        });
        crate::log_event!(
            "indexer",
            "initial index complete",
            "{}: {} files, {} symbols ({} cached, {} analyzed)",
            self.package,
            stats.files,
            stats.symbols,
            stats.cache_hits,
            stats.analyzed
        );
        stats
    }

    /// Apply one debounced change.
    pub fn reconcile(&mut self, change: FileChange) {
        let Some(rel) = self.rel_path(&change.path) else {
            return;
        };
        match change.kind {
            ChangeKind::Deleted => self.remove_file(&rel),
            ChangeKind::Created | ChangeKind::Modified => self.update_file(&change.path, &rel),
        }
    }

    fn update_file(&mut self, path: &Path, rel: &str) {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) if !path.exists() => {
                // Rename-as-modify: the path vanished between the event and
                // now, treat as a deletion.
                self.remove_file(rel);
                return;
            }
            Err(e) => {
                self.emit_error(Some(rel.to_string()), "read", e.to_string());
                return;
            }
        };

        let hash = content_hash(&content);
        if self
            .index
            .fragment(rel)
            .is_some_and(|f| f.content_hash == hash)
        {
            crate::debug_event!("indexer", "unchanged (hash match)", "{rel}");
            return;
        }

        let fragment = match self.cache.load(rel, &hash) {
            Some(hit) => hit,
            None => match self.binding.analyze(&self.package, rel, &content) {
                Ok(mut fragment) => {
                    fragment.content_hash = hash;
                    fragment.mtime = file_mtime(path);
                    if let Err(e) = self.cache.store(&fragment) {
                        tracing::warn!("[indexer] cache write failed for {rel}: {e}");
                    }
                    fragment
                }
                Err(e) => {
                    // Prior fragment (if any) stays in place.
                    self.emit_error(Some(rel.to_string()), "analyze", e.to_string());
                    return;
                }
            },
        };

        let diff = self.index.insert_fragment(fragment);
        crate::log_event!("indexer", "reindexed", "{rel}");
        self.emit(IndexUpdate::FileUpdated {
            package: self.package.clone(),
            path: rel.to_string(),
            added_symbols: diff.added_symbols,
            removed_symbols: diff.removed_symbols,
        });
    }

    fn remove_file(&mut self, rel: &str) {
        if self.index.remove_file(rel).is_some() {
            self.cache.remove(rel);
            crate::log_event!("indexer", "removed", "{rel}");
            self.emit(IndexUpdate::FileRemoved {
                package: self.package.clone(),
                path: rel.to_string(),
            });
        } else {
            crate::debug_event!("indexer", "delete for untracked file", "{rel}");
        }
    }

    /// Full reconciliation sweep of the root: re-probe every file on disk
    /// (the hash gate skips unchanged ones) and drop fragments whose file
    /// is gone. Used after watcher overflow.
    pub fn rescan(&mut self) {
        crate::log_event!("indexer", "rescanning", "{}", self.root.display());
        let on_disk = self.walker.collect_sorted(&self.root, self.binding.as_ref());

        let mut disk_rels: HashSet<String> = HashSet::new();
        for path in &on_disk {
            if let Some(rel) = self.rel_path(path) {
                disk_rels.insert(rel.clone());
                self.update_file(path, &rel);
            }
        }

        let stale: Vec<String> = self
            .index
            .fragments()
            .map(|f| f.path.clone())
            .filter(|p| !disk_rels.contains(p))
            .collect();
        for rel in stale {
            self.remove_file(&rel);
        }
    }

    pub fn emit_watch_error(&self, message: String) {
        self.emit_error(None, "watch", message);
    }

    pub fn emit_watch_overflow(&self) {
        self.emit_error(
            None,
            "watch-overflow",
            format!("event queue overflowed for {}", self.root.display()),
        );
    }

    fn emit_error(&self, path: Option<String>, kind: &str, message: String) {
        tracing::warn!(
            "[indexer] {kind} error{}: {message}",
            path.as_deref()
                .map(|p| format!(" for {p}"))
                .unwrap_or_default()
        );
        self.emit(IndexUpdate::IndexError {
            package: self.package.clone(),
            path,
            kind: kind.to_string(),
            message,
        });
    }

    fn emit(&self, update: IndexUpdate) {
        // No receivers just means nobody is listening yet.
        let _ = self.updates.send(update);
    }

    /// Package-relative path with forward slashes, or None for paths
    /// outside the root.
    fn rel_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

fn file_mtime(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Drive one package's reconciliation loop: drain watcher signals into the
/// debouncer and apply changes once they have been quiet for the window.
/// Reconciliation itself runs on the blocking pool; the loop task stays
/// cooperative.
pub fn spawn_reconciler(
    indexer: Arc<Mutex<PackageIndexer>>,
    mut signals: mpsc::Receiver<WatchSignal>,
    overflow: Arc<AtomicBool>,
    debounce_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut debouncer = ChangeDebouncer::new(debounce_ms);
        let tick = Duration::from_millis((debounce_ms / 4).clamp(10, 50));

        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(WatchSignal::Change(change)) => debouncer.record(change),
                    Some(WatchSignal::Error(message)) => {
                        indexer.lock().emit_watch_error(message);
                    }
                    Some(WatchSignal::Overflow { .. }) => {
                        rescan_after_overflow(&indexer).await;
                    }
                    Some(WatchSignal::Shutdown) | None => break,
                },
                _ = tokio::time::sleep(tick) => {
                    if overflow.swap(false, Ordering::SeqCst) {
                        rescan_after_overflow(&indexer).await;
                    }
                    let ready = debouncer.take_ready();
                    if !ready.is_empty() {
                        let indexer = indexer.clone();
                        let _ = tokio::task::spawn_blocking(move || {
                            let mut guard = indexer.lock();
                            for change in ready {
                                guard.reconcile(change);
                            }
                        })
                        .await;
                    }
                }
            }
        }
        crate::debug_event!("indexer", "reconciler stopped");
    })
}

async fn rescan_after_overflow(indexer: &Arc<Mutex<PackageIndexer>>) {
    let indexer = indexer.clone();
    let _ = tokio::task::spawn_blocking(move || {
        let mut guard = indexer.lock();
        guard.emit_watch_overflow();
        guard.rescan();
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::PlainBinding;
    use std::fs;
    use tempfile::TempDir;

    fn indexer_for(temp: &TempDir) -> (PackageIndexer, broadcast::Receiver<IndexUpdate>) {
        let (tx, rx) = broadcast::channel(64);
        let cache_dir = temp.path().join(".cache");
        let binding: Arc<dyn Binding> = Arc::new(PlainBinding::new());
        let cache = FragmentCache::open(cache_dir, "test", binding.analyzer_version()).unwrap();
        let indexer = PackageIndexer::new(
            "app",
            None,
            temp.path(),
            binding,
            Arc::new(Settings::default()),
            cache,
            tx,
        );
        (indexer, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<IndexUpdate>) -> Vec<IndexUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    #[test]
    fn initial_index_then_cache_hits() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.src"), "class Foo {\n}\n").unwrap();
        fs::write(temp.path().join("b.src"), "fn main() {\n}\n").unwrap();

        let (mut indexer, mut rx) = indexer_for(&temp);
        let stats = indexer.initial_index(None);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.analyzed, 2);
        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.symbols, 2);

        let updates = drain(&mut rx);
        assert!(matches!(
            updates.last(),
            Some(IndexUpdate::Initial { fragment_count: 2, .. })
        ));

        // A fresh indexer over the same tree is served from cache.
        let (mut second, _rx) = indexer_for(&temp);
        let stats = second.initial_index(None);
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.analyzed, 0);
    }

    #[test]
    fn progress_reports_every_file() {
        let temp = TempDir::new().unwrap();
        for name in ["a.src", "b.src", "c.src"] {
            fs::write(temp.path().join(name), "class X {\n}\n").unwrap();
        }

        let (mut indexer, _rx) = indexer_for(&temp);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let progress = move |processed: usize, total: usize, file: &str| {
            seen_clone.lock().unwrap().push((processed, total, file.to_string()));
        };
        indexer.initial_index(Some(&progress));

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, total, _)| *total == 3));
        let mut processed: Vec<usize> = seen.iter().map(|(p, _, _)| *p).collect();
        processed.sort();
        assert_eq!(processed, vec![1, 2, 3]);
    }

    #[test]
    fn modify_emits_added_and_removed() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.src");
        fs::write(&file, "class Foo {\n}\n").unwrap();

        let (mut indexer, mut rx) = indexer_for(&temp);
        indexer.initial_index(None);
        drain(&mut rx);

        fs::write(&file, "class Bar {\n}\n").unwrap();
        indexer.reconcile(FileChange::new(&file, ChangeKind::Modified));

        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 1);
        match &updates[0] {
            IndexUpdate::FileUpdated {
                path,
                added_symbols,
                removed_symbols,
                ..
            } => {
                assert_eq!(path, "a.src");
                assert_eq!(added_symbols.len(), 1);
                assert!(added_symbols[0].ends_with("Bar"));
                assert_eq!(removed_symbols.len(), 1);
                assert!(removed_symbols[0].ends_with("Foo"));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn unchanged_content_is_a_noop() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.src");
        fs::write(&file, "class Foo {\n}\n").unwrap();

        let (mut indexer, mut rx) = indexer_for(&temp);
        indexer.initial_index(None);
        drain(&mut rx);

        indexer.reconcile(FileChange::new(&file, ChangeKind::Modified));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn delete_removes_fragment() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.src");
        fs::write(&file, "class Foo {\n}\n").unwrap();

        let (mut indexer, mut rx) = indexer_for(&temp);
        indexer.initial_index(None);
        drain(&mut rx);

        fs::remove_file(&file).unwrap();
        indexer.reconcile(FileChange::new(&file, ChangeKind::Deleted));

        let updates = drain(&mut rx);
        assert!(matches!(&updates[0], IndexUpdate::FileRemoved { path, .. } if path == "a.src"));
        assert_eq!(indexer.index().file_count(), 0);
    }

    #[test]
    fn analyzer_failure_keeps_prior_fragment() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.src");
        fs::write(&file, "class Foo {\n}\n").unwrap();

        let (mut indexer, mut rx) = indexer_for(&temp);
        indexer.initial_index(None);
        drain(&mut rx);

        // Unbalanced brace makes the plain binding fail.
        fs::write(&file, "}\n").unwrap();
        indexer.reconcile(FileChange::new(&file, ChangeKind::Modified));

        let updates = drain(&mut rx);
        assert!(matches!(
            &updates[0],
            IndexUpdate::IndexError { kind, .. } if kind == "analyze"
        ));
        // Prior fragment retained.
        assert_eq!(indexer.index().file_count(), 1);
        assert!(indexer.index().fragment("a.src").is_some());
    }

    #[test]
    fn rescan_reconciles_disk_state() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.src"), "class Foo {\n}\n").unwrap();
        fs::write(temp.path().join("b.src"), "class Gone {\n}\n").unwrap();

        let (mut indexer, mut rx) = indexer_for(&temp);
        indexer.initial_index(None);
        drain(&mut rx);

        // Mutate the tree behind the indexer's back.
        fs::remove_file(temp.path().join("b.src")).unwrap();
        fs::write(temp.path().join("c.src"), "class New {\n}\n").unwrap();

        indexer.rescan();
        assert!(indexer.index().fragment("b.src").is_none());
        assert!(indexer.index().fragment("c.src").is_some());
        assert!(indexer.index().fragment("a.src").is_some());
    }

    #[test]
    fn events_outside_root_are_ignored() {
        let temp = TempDir::new().unwrap();
        let (mut indexer, mut rx) = indexer_for(&temp);
        indexer.reconcile(FileChange::new("/elsewhere/x.src", ChangeKind::Modified));
        assert!(drain(&mut rx).is_empty());
    }
}
