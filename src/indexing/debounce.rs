//! Change coalescing under a quiescence window.
//!
//! Bursts of events on one path collapse into a single pending change.
//! The latest kind wins, with one exception: a file that was created and
//! then deleted inside the window cancels out entirely.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::types::{ChangeKind, FileChange};

#[derive(Debug)]
struct Pending {
    last_seen: Instant,
    kind: ChangeKind,
    /// First event inside the window was `created`.
    born: bool,
}

/// Coalesces per-path file change events until they have been quiet for
/// the configured window.
#[derive(Debug)]
pub struct ChangeDebouncer {
    pending: HashMap<PathBuf, Pending>,
    window: Duration,
}

impl ChangeDebouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            window: Duration::from_millis(window_ms),
        }
    }

    /// Record one event, coalescing with anything already pending for the
    /// same path.
    pub fn record(&mut self, change: FileChange) {
        let now = Instant::now();
        match self.pending.get_mut(&change.path) {
            None => {
                self.pending.insert(
                    change.path,
                    Pending {
                        last_seen: now,
                        kind: change.kind,
                        born: change.kind == ChangeKind::Created,
                    },
                );
            }
            Some(pending) => {
                if change.kind == ChangeKind::Deleted && pending.born {
                    // Created then deleted inside the window: net nothing.
                    self.pending.remove(&change.path);
                } else {
                    pending.last_seen = now;
                    pending.kind = change.kind;
                }
            }
        }
    }

    /// Changes that have been quiet for the whole window, removed from the
    /// pending set.
    pub fn take_ready(&mut self) -> Vec<FileChange> {
        let now = Instant::now();
        let window = self.window;
        let mut ready = Vec::new();
        self.pending.retain(|path, pending| {
            if now.duration_since(pending.last_seen) >= window {
                ready.push(FileChange::new(path.clone(), pending.kind));
                false
            } else {
                true
            }
        });
        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
