//! Language bindings: the pluggable analyzer seam.
//!
//! A binding is everything the core needs from a language: how to find
//! packages under a project root, which files to look at, and how to turn
//! one file's content into a semantic fragment. Analysis is a pure function
//! of the file content, which is what makes content-hash caching sound.
//!
//! Bindings live in an explicit [`BindingRegistry`] handed to the session at
//! construction. There is no process-wide registration.

mod plain;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use plain::PlainBinding;

use crate::error::{AnalyzerResult, ConfigResult};
use crate::semantic::FileFragment;

/// A package found under the project root.
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub name: String,
    pub version: Option<String>,
    pub root: PathBuf,
    pub dependencies: Vec<DependencySpec>,
}

/// A dependency declared by a package manifest.
#[derive(Debug, Clone)]
pub struct DependencySpec {
    pub name: String,
    pub version: Option<String>,
    /// Where the dependency's source lives, when known. Used to synthesize
    /// an index when no pre-built artifact exists.
    pub source_root: Option<PathBuf>,
}

/// Language-specific analysis capability.
///
/// Implementations must be thread-safe: analysis runs on a CPU worker pool.
pub trait Binding: Send + Sync {
    /// Identifier used for registry dispatch and the `language` column.
    fn language_id(&self) -> &str;

    /// Manifest file name that marks a package root.
    fn package_file(&self) -> &str;

    /// File extensions (without dot) this binding analyzes.
    fn extensions(&self) -> &[&str];

    /// Version string folded into the cache key. Any inequality with the
    /// cached value invalidates the whole cache; no compatibility rules are
    /// inferred from its shape.
    fn analyzer_version(&self) -> &str;

    /// Locate packages under a project root.
    fn discover(&self, root: &Path) -> ConfigResult<Vec<PackageSpec>>;

    /// Analyze one file. `package` is the owning package name (folded into
    /// symbol ids for global uniqueness), `rel_path` is relative to the
    /// package root with forward slashes. Must be a pure function of its
    /// arguments.
    fn analyze(&self, package: &str, rel_path: &str, content: &str)
    -> AnalyzerResult<FileFragment>;

    /// Whether a path looks like a source file for this binding.
    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions().contains(&ext))
    }
}

/// Dispatch table from language id to binding.
#[derive(Clone, Default)]
pub struct BindingRegistry {
    bindings: HashMap<String, Arc<dyn Binding>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bindings this build ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainBinding::new()));
        registry
    }

    pub fn register(&mut self, binding: Arc<dyn Binding>) {
        self.bindings
            .insert(binding.language_id().to_string(), binding);
    }

    pub fn get(&self, language_id: &str) -> Option<Arc<dyn Binding>> {
        self.bindings.get(language_id).cloned()
    }

    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        ids.sort();
        ids
    }
}
