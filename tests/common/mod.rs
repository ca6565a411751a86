//! Shared scaffolding for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use symdex::binding::BindingRegistry;
use symdex::config::Settings;
use symdex::registry::PackageRegistry;
use symdex::rpc::Session;

/// A throwaway project with a `pkg.toml` manifest.
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("pkg.toml"),
        "[package]\nname = \"app\"\nversion = \"0.1.0\"\n",
    )
    .unwrap();
    for (rel, content) in files {
        write_file(temp.path(), rel, content);
    }
    temp
}

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Settings tuned for fast tests: a short debounce window.
pub fn fast_settings() -> Arc<Settings> {
    let mut settings = Settings::default();
    settings.indexing.debounce_ms = 50;
    Arc::new(settings)
}

pub fn open_registry(root: &Path) -> PackageRegistry {
    let bindings = BindingRegistry::with_builtin();
    let binding = bindings.get("plain").unwrap();
    PackageRegistry::open(root, binding, fast_settings()).unwrap()
}

pub fn session() -> Session {
    Session::new(fast_settings(), BindingRegistry::with_builtin())
}
