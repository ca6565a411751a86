//! Incremental indexing: file discovery, change debouncing, and the
//! per-package indexer that reconciles filesystem events into the
//! semantic index.

mod debounce;
mod indexer;
mod walker;

pub use debounce::ChangeDebouncer;
pub use indexer::{spawn_reconciler, IndexStats, PackageIndexer, ProgressFn};
pub use walker::FileWalker;

/// One entry on the merged update stream.
///
/// Every update names the package it came from; per-package ordering on the
/// stream is monotonic.
#[derive(Debug, Clone)]
pub enum IndexUpdate {
    /// Startup indexing finished for a package.
    Initial {
        package: String,
        fragment_count: usize,
    },
    /// A file was created or modified and its fragment replaced.
    FileUpdated {
        package: String,
        path: String,
        added_symbols: Vec<String>,
        removed_symbols: Vec<String>,
    },
    /// A file was deleted and its fragment dropped.
    FileRemoved { package: String, path: String },
    /// Something went wrong; the affected file (if any) keeps its prior
    /// fragment. `kind` is one of `analyze`, `read`, `cache`, `watch`,
    /// `watch-overflow`.
    IndexError {
        package: String,
        path: Option<String>,
        kind: String,
        message: String,
    },
}

impl IndexUpdate {
    /// Whether this update changes what a store rebuild would produce.
    pub fn dirties_store(&self) -> bool {
        matches!(
            self,
            Self::Initial { .. } | Self::FileUpdated { .. } | Self::FileRemoved { .. }
        )
    }
}
