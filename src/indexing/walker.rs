//! Source file discovery.
//!
//! Walks a package root honoring gitignore rules plus configured ignore
//! patterns, yielding only files the binding claims.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;

use crate::binding::Binding;
use crate::config::Settings;

pub struct FileWalker {
    settings: Arc<Settings>,
}

impl FileWalker {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Files under `root` that `binding` would analyze, in walk order.
    pub fn walk<'a>(
        &self,
        root: &Path,
        binding: &'a dyn Binding,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false);

        let mut overrides = ignore::overrides::OverrideBuilder::new(root);
        for pattern in &self.settings.indexing.ignore_patterns {
            if let Err(e) = overrides.add(&format!("!{pattern}")) {
                tracing::warn!("[walker] invalid ignore pattern '{pattern}': {e}");
            }
        }
        if let Ok(overrides) = overrides.build() {
            builder.overrides(overrides);
        }

        builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(move |path| binding.matches(path))
    }

    /// Sorted snapshot, used when determinism matters (initial indexing,
    /// rescans).
    pub fn collect_sorted(&self, root: &Path, binding: &dyn Binding) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.walk(root, binding).collect();
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingRegistry, PlainBinding};
    use std::fs;
    use tempfile::TempDir;

    fn walker() -> FileWalker {
        FileWalker::new(Arc::new(Settings::default()))
    }

    #[test]
    fn finds_only_matching_extensions() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.src"), "class A {}").unwrap();
        fs::write(temp.path().join("b.src"), "class B {}").unwrap();
        fs::write(temp.path().join("README.md"), "# hi").unwrap();

        let binding = PlainBinding::new();
        let files = walker().collect_sorted(temp.path(), &binding);
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.src"));
        assert!(files[1].ends_with("b.src"));
    }

    #[test]
    fn respects_gitignore() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".gitignore"), "skipped.src\n").unwrap();
        fs::write(temp.path().join("skipped.src"), "class S {}").unwrap();
        fs::write(temp.path().join("kept.src"), "class K {}").unwrap();

        let binding = PlainBinding::new();
        let files = walker().collect_sorted(temp.path(), &binding);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("kept.src"));
    }

    #[test]
    fn respects_configured_ignore_patterns() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("gen")).unwrap();
        fs::write(temp.path().join("gen/out.src"), "class G {}").unwrap();
        fs::write(temp.path().join("main.src"), "class M {}").unwrap();

        let mut settings = Settings::default();
        settings.indexing.ignore_patterns.push("gen/**".to_string());
        let walker = FileWalker::new(Arc::new(settings));

        let registry = BindingRegistry::with_builtin();
        let binding = registry.get("plain").unwrap();
        let files = walker.collect_sorted(temp.path(), binding.as_ref());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.src"));
    }
}
