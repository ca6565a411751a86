//! Filesystem watching.
//!
//! Wraps the platform notify backend and forwards source-file events into
//! a bounded channel read by the reconciliation loop. The contract is
//! at-least-once: duplicates and spurious events are fine, the indexer's
//! content-hash gate absorbs them. When the channel is full the event is
//! dropped and an overflow flag is raised instead; the reconciler answers
//! with a full rescan of the root, so nothing is lost.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::binding::Binding;
use crate::error::WatchResult;
use crate::types::{ChangeKind, FileChange};

/// What the watcher feeds the reconciliation loop.
#[derive(Debug)]
pub enum WatchSignal {
    Change(FileChange),
    /// The backend lost events; the whole root needs a rescan.
    Overflow { root: PathBuf },
    Error(String),
    Shutdown,
}

/// Debounce-free event source for one package root. Coalescing happens
/// downstream in the reconciler's debouncer.
pub struct SourceWatcher {
    root: PathBuf,
    binding: Arc<dyn Binding>,
    tx: mpsc::Sender<WatchSignal>,
    overflow: Arc<AtomicBool>,
    watcher: Option<notify::RecommendedWatcher>,
}

impl SourceWatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        binding: Arc<dyn Binding>,
        tx: mpsc::Sender<WatchSignal>,
        overflow: Arc<AtomicBool>,
    ) -> Self {
        Self {
            root: root.into(),
            binding,
            tx,
            overflow,
            watcher: None,
        }
    }

    /// Begin watching the root recursively.
    pub fn start(&mut self) -> WatchResult<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let tx = self.tx.clone();
        let binding = self.binding.clone();
        let overflow = self.overflow.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if event.need_rescan() {
                        overflow.store(true, Ordering::SeqCst);
                        return;
                    }
                    let kind = match event.kind {
                        EventKind::Create(_) => ChangeKind::Created,
                        EventKind::Modify(_) => ChangeKind::Modified,
                        EventKind::Remove(_) => ChangeKind::Deleted,
                        _ => return,
                    };
                    for path in event.paths {
                        if !binding.matches(&path) {
                            continue;
                        }
                        let signal = WatchSignal::Change(FileChange::new(path, kind));
                        if tx.try_send(signal).is_err() {
                            overflow.store(true, Ordering::SeqCst);
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.try_send(WatchSignal::Error(e.to_string()));
                }
            }
        })?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        self.watcher = Some(watcher);
        crate::log_event!("watcher", "started", "{}", self.root.display());
        Ok(())
    }

    /// Stop watching. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            let _ = watcher.unwatch(&self.root);
            crate::log_event!("watcher", "stopped", "{}", self.root.display());
        }
    }

    /// Force-emit a modified event for one path, used after explicit
    /// writes (`file/didChange`). Goes through the same channel as backend
    /// events so per-path ordering is preserved.
    pub fn refresh(&self, path: &Path) {
        let change = FileChange::new(path, ChangeKind::Modified);
        if self.tx.try_send(WatchSignal::Change(change)).is_err() {
            self.overflow.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
