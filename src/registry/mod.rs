//! Package registry: the root of the indexed universe.
//!
//! Local packages discovered under the project root each get an
//! incremental indexer and a watcher. External dependency indexes are
//! loaded lazily on demand, from a pre-built artifact when one exists,
//! otherwise synthesized by a one-shot pass over the dependency source;
//! either way they are immutable after load. Updates from every local
//! indexer interleave on one broadcast stream with per-package order
//! preserved.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::binding::{Binding, DependencySpec, PackageSpec};
use crate::cache::FragmentCache;
use crate::config::Settings;
use crate::error::{ConfigError, ConfigResult, SqlResult, WatchResult};
use crate::indexing::{
    spawn_reconciler, IndexStats, IndexUpdate, PackageIndexer, ProgressFn,
};
use crate::semantic::{content_hash, SemanticIndex};
use crate::store::{RebuildStats, SymbolStore};
use crate::types::QueryScope;
use crate::watcher::{SourceWatcher, WatchSignal};

/// Public view of one registered package.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    pub version: Option<String>,
    pub root: PathBuf,
    pub local: bool,
}

struct LocalPackage {
    spec: PackageSpec,
    indexer: Arc<Mutex<PackageIndexer>>,
    signals_tx: mpsc::Sender<WatchSignal>,
    signals_rx: Option<mpsc::Receiver<WatchSignal>>,
    overflow: Arc<AtomicBool>,
    watcher: SourceWatcher,
    reconciler: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for PackageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageRegistry").finish_non_exhaustive()
    }
}

/// Frozen snapshot of a dependency's semantic index.
struct ExternalPackage {
    name: String,
    version: Option<String>,
    root: Option<PathBuf>,
    index: SemanticIndex,
}

pub struct PackageRegistry {
    settings: Arc<Settings>,
    binding: Arc<dyn Binding>,
    project_root: PathBuf,
    locals: Vec<LocalPackage>,
    externals: Vec<ExternalPackage>,
    updates: broadcast::Sender<IndexUpdate>,
    scope: QueryScope,
}

impl PackageRegistry {
    /// Discover local packages and wire an indexer and watcher for each.
    /// Nothing is indexed or watched yet.
    pub fn open(
        project_root: &Path,
        binding: Arc<dyn Binding>,
        settings: Arc<Settings>,
    ) -> ConfigResult<Self> {
        let specs = binding.discover(project_root)?;
        let (updates, _) = broadcast::channel(1024);

        let cache_root = resolve_cache_root(project_root, &settings);
        let mut locals = Vec::with_capacity(specs.len());
        for spec in specs {
            let cache_dir = cache_root.join(&spec.name);
            let cache = FragmentCache::open(cache_dir, &spec.name, binding.analyzer_version())
                .map_err(|e| ConfigError::Invalid {
                    reason: format!("cannot open cache for '{}': {e}", spec.name),
                })?;

            let (signals_tx, signals_rx) =
                mpsc::channel(settings.indexing.watch_channel_capacity);
            let overflow = Arc::new(AtomicBool::new(false));
            let indexer = Arc::new(Mutex::new(PackageIndexer::new(
                &spec.name,
                spec.version.clone(),
                &spec.root,
                binding.clone(),
                settings.clone(),
                cache,
                updates.clone(),
            )));
            let watcher = SourceWatcher::new(
                &spec.root,
                binding.clone(),
                signals_tx.clone(),
                overflow.clone(),
            );

            locals.push(LocalPackage {
                spec,
                indexer,
                signals_tx,
                signals_rx: Some(signals_rx),
                overflow,
                watcher,
                reconciler: None,
            });
        }

        Ok(Self {
            settings,
            binding,
            project_root: project_root.to_path_buf(),
            locals,
            externals: Vec::new(),
            updates,
            scope: QueryScope::default(),
        })
    }

    /// Subscribe to the merged update stream.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.updates.subscribe()
    }

    /// Run startup indexing for every local package. Blocking; callers on
    /// the event loop dispatch through the blocking pool.
    pub fn initial_index_all(&self, progress: Option<&ProgressFn>) -> IndexStats {
        let mut total = IndexStats::default();
        for local in &self.locals {
            let stats = local.indexer.lock().initial_index(progress);
            total.files += stats.files;
            total.symbols += stats.symbols;
            total.cache_hits += stats.cache_hits;
            total.analyzed += stats.analyzed;
            total.failed += stats.failed;
        }
        total
    }

    /// Start watchers and reconciliation loops. Requires a tokio runtime.
    pub fn start_watching(&mut self) -> WatchResult<()> {
        let debounce_ms = self.settings.indexing.debounce_ms;
        for local in &mut self.locals {
            if let Some(signals_rx) = local.signals_rx.take() {
                local.reconciler = Some(spawn_reconciler(
                    local.indexer.clone(),
                    signals_rx,
                    local.overflow.clone(),
                    debounce_ms,
                ));
            }
            local.watcher.start()?;
        }
        Ok(())
    }

    /// Stop watchers and reconcilers. In-flight analysis completes on the
    /// blocking pool but its results are discarded with the tasks.
    pub fn stop(&mut self) {
        for local in &mut self.locals {
            local.watcher.stop();
            let _ = local.signals_tx.try_send(WatchSignal::Shutdown);
            if let Some(handle) = local.reconciler.take() {
                handle.abort();
            }
        }
    }

    /// Route a forced refresh to the package owning `path`.
    pub fn refresh(&self, path: &Path) {
        for local in &self.locals {
            if path.starts_with(&local.spec.root) {
                local.watcher.refresh(path);
                return;
            }
        }
        crate::debug_event!("registry", "refresh outside any package", "{}", path.display());
    }

    /// Load external dependency indexes. Blocking and potentially slow;
    /// idempotent per dependency.
    pub fn load_dependencies(&mut self) -> usize {
        let deps: Vec<DependencySpec> = self
            .locals
            .iter()
            .flat_map(|l| l.spec.dependencies.iter().cloned())
            .collect();

        let artifacts_dir = resolve_cache_root(&self.project_root, &self.settings).join("deps");
        let mut loaded = 0;
        for dep in deps {
            if self.externals.iter().any(|e| e.name == dep.name) {
                continue;
            }
            match self.load_external(&dep, &artifacts_dir) {
                Some(index) => {
                    crate::log_event!(
                        "registry",
                        "dependency loaded",
                        "{} ({} files, {} symbols)",
                        dep.name,
                        index.file_count(),
                        index.symbol_count()
                    );
                    self.externals.push(ExternalPackage {
                        name: dep.name,
                        version: dep.version,
                        root: dep.source_root,
                        index,
                    });
                    loaded += 1;
                }
                None => {
                    tracing::warn!(
                        "[registry] no artifact or source for dependency '{}', skipping",
                        dep.name
                    );
                }
            }
        }
        loaded
    }

    fn load_external(&self, dep: &DependencySpec, artifacts_dir: &Path) -> Option<SemanticIndex> {
        let artifact = artifacts_dir.join(format!(
            "{}-{}.idx",
            dep.name,
            dep.version.as_deref().unwrap_or("0")
        ));

        if let Ok(bytes) = std::fs::read(&artifact) {
            match postcard::from_bytes::<SemanticIndex>(&bytes) {
                Ok(index) => {
                    crate::debug_event!("registry", "artifact hit", "{}", artifact.display());
                    return Some(index);
                }
                Err(e) => {
                    tracing::warn!(
                        "[registry] corrupt artifact {}: {e}, re-synthesizing",
                        artifact.display()
                    );
                }
            }
        }

        let source_root = dep.source_root.as_deref()?;
        let index = self.synthesize(dep, source_root)?;

        if let Ok(bytes) = postcard::to_allocvec(&index) {
            if std::fs::create_dir_all(artifacts_dir).is_ok() {
                if let Err(e) = std::fs::write(&artifact, bytes) {
                    tracing::warn!("[registry] cannot write artifact: {e}");
                }
            }
        }
        Some(index)
    }

    /// One-shot index of a dependency's source tree: no cache, no watcher,
    /// frozen after this pass.
    fn synthesize(&self, dep: &DependencySpec, source_root: &Path) -> Option<SemanticIndex> {
        if !source_root.is_dir() {
            return None;
        }
        let walker = crate::indexing::FileWalker::new(self.settings.clone());
        let mut index = SemanticIndex::new(&dep.name, dep.version.clone());

        for path in walker.collect_sorted(source_root, self.binding.as_ref()) {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(stripped) = path.strip_prefix(source_root) else {
                continue;
            };
            let rel: String = stripped
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            match self.binding.analyze(&dep.name, &rel, &content) {
                Ok(mut fragment) => {
                    fragment.content_hash = content_hash(&content);
                    index.insert_fragment(fragment);
                }
                Err(e) => {
                    tracing::warn!("[registry] analysis failed in dependency '{}': {e}", dep.name);
                }
            }
        }
        Some(index)
    }

    pub fn packages(&self) -> Vec<PackageInfo> {
        let mut out: Vec<PackageInfo> = self
            .locals
            .iter()
            .map(|l| PackageInfo {
                name: l.spec.name.clone(),
                version: l.spec.version.clone(),
                root: l.spec.root.clone(),
                local: true,
            })
            .collect();
        out.extend(self.externals.iter().map(|e| PackageInfo {
            name: e.name.clone(),
            version: e.version.clone(),
            root: e.root.clone().unwrap_or_default(),
            local: false,
        }));
        out
    }

    pub fn all_external_indexes(&self) -> impl Iterator<Item = &SemanticIndex> {
        self.externals.iter().map(|e| &e.index)
    }

    pub fn set_scope(&mut self, scope: QueryScope) {
        self.scope = scope;
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    /// Atomically project the current fragment union of all in-scope
    /// packages into the store.
    pub fn rebuild_store(&self, store: &SymbolStore) -> SqlResult<RebuildStats> {
        let guards: Vec<parking_lot::MutexGuard<'_, PackageIndexer>> = self
            .locals
            .iter()
            .filter(|l| self.scope.includes(&l.spec.name, true))
            .map(|l| l.indexer.lock())
            .collect();

        let mut indexes: Vec<&SemanticIndex> = guards.iter().map(|g| g.index()).collect();
        for external in &self.externals {
            if self.scope.includes(&external.name, false) {
                indexes.push(&external.index);
            }
        }
        let stats = store.rebuild(indexes)?;
        crate::debug_event!(
            "registry",
            "store rebuilt",
            "{} symbols, {} occurrences, {} relationships",
            stats.symbols,
            stats.occurrences,
            stats.relationships
        );
        Ok(stats)
    }

    /// Local workspace totals, for `initialize`/`status` results.
    pub fn file_count(&self) -> usize {
        self.locals
            .iter()
            .map(|l| l.indexer.lock().index().file_count())
            .sum()
    }

    pub fn symbol_count(&self) -> usize {
        self.locals
            .iter()
            .map(|l| l.indexer.lock().index().symbol_count())
            .sum()
    }

    pub fn project_name(&self) -> String {
        self.locals
            .first()
            .map(|l| l.spec.name.clone())
            .unwrap_or_else(|| {
                self.project_root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("project")
                    .to_string()
            })
    }
}

impl Drop for PackageRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_cache_root(project_root: &Path, settings: &Settings) -> PathBuf {
    if settings.cache_path.is_absolute() {
        settings.cache_path.clone()
    } else {
        project_root.join(&settings.cache_path)
    }
}
