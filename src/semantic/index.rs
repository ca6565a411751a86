//! Per-package semantic index: a map from relative file path to the
//! fragment that file contributed.
//!
//! Keeping fragments whole (rather than flattening into global sets) makes
//! remove-by-file and replace-by-file trivial, and keeps relationship
//! contributions per file so removing one file never drops an edge another
//! file still asserts. Deduplication happens when the union is projected
//! into the relational store.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::records::FileFragment;

/// Symbol-id delta produced when a file's fragment is replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentDiff {
    pub added_symbols: Vec<String>,
    pub removed_symbols: Vec<String>,
}

/// All fragments for one package, keyed by relative path.
///
/// Mutated only by the owning indexer's reconciliation task; every other
/// component reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticIndex {
    package: String,
    version: Option<String>,
    docs: BTreeMap<String, FileFragment>,
}

impl SemanticIndex {
    pub fn new(package: impl Into<String>, version: Option<String>) -> Self {
        Self {
            package: package.into(),
            version,
            docs: BTreeMap::new(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Replace (or insert) the fragment for a file, returning which symbol
    /// ids appeared and which disappeared relative to the prior fragment.
    pub fn insert_fragment(&mut self, fragment: FileFragment) -> FragmentDiff {
        let new_ids: HashSet<String> = fragment.symbol_ids().map(str::to_string).collect();
        let old = self.docs.insert(fragment.path.clone(), fragment);
        let old_ids: HashSet<String> = old
            .as_ref()
            .map(|f| f.symbol_ids().map(str::to_string).collect())
            .unwrap_or_default();

        let mut added: Vec<String> = new_ids.difference(&old_ids).cloned().collect();
        let mut removed: Vec<String> = old_ids.difference(&new_ids).cloned().collect();
        added.sort();
        removed.sort();
        FragmentDiff {
            added_symbols: added,
            removed_symbols: removed,
        }
    }

    /// Drop a file's contribution entirely.
    pub fn remove_file(&mut self, path: &str) -> Option<FileFragment> {
        self.docs.remove(path)
    }

    pub fn fragment(&self, path: &str) -> Option<&FileFragment> {
        self.docs.get(path)
    }

    /// Fragments in sorted path order. Conversion relies on this order for
    /// deterministic output.
    pub fn fragments(&self) -> impl Iterator<Item = &FileFragment> {
        self.docs.values()
    }

    /// Union with another index; on a shared path the other side wins.
    /// Used when loading bulk cache contents and external snapshots.
    pub fn merge(&mut self, other: SemanticIndex) {
        for (path, fragment) in other.docs {
            self.docs.insert(path, fragment);
        }
    }

    pub fn file_count(&self) -> usize {
        self.docs.len()
    }

    /// Distinct symbol ids across all fragments.
    pub fn symbol_count(&self) -> usize {
        let mut seen = HashSet::new();
        for fragment in self.docs.values() {
            for id in fragment.symbol_ids() {
                seen.insert(id);
            }
        }
        seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
