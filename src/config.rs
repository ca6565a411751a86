//! Layered configuration.
//!
//! Sources, later layers winning:
//! - built-in defaults
//! - `.symdex/settings.toml` (found by walking ancestors of the cwd)
//! - `SYMDEX_`-prefixed environment variables, double underscore for
//!   nesting: `SYMDEX_INDEXING__PARALLEL_THREADS=8` sets
//!   `indexing.parallel_threads`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Configuration schema version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Root of the per-project cache directory.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Worker threads for analyzer calls. Analysis is CPU-bound.
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Quiescence window for file change coalescing, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Glob patterns excluded from indexing, on top of gitignore rules.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Capacity of the watcher-to-indexer event channel.
    #[serde(default = "default_watch_capacity")]
    pub watch_channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Upper bound on the prepared statement cache, entries per connection.
    #[serde(default = "default_prepared_cache")]
    pub prepared_statement_cache: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter (`error`..`trace`).
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `indexer = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_cache_path() -> PathBuf {
    PathBuf::from(".symdex/cache")
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_debounce_ms() -> u64 {
    200
}
fn default_watch_capacity() -> usize {
    256
}
fn default_prepared_cache() -> usize {
    64
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            cache_path: default_cache_path(),
            indexing: IndexingConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            debounce_ms: default_debounce_ms(),
            ignore_patterns: vec![
                "target/**".to_string(),
                "node_modules/**".to_string(),
                ".git/**".to_string(),
            ],
            watch_channel_capacity: default_watch_capacity(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prepared_statement_cache: default_prepared_cache(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load from all sources, starting at the workspace config if one exists.
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".symdex/settings.toml"));
        Self::load_from(config_path)
    }

    /// Load from a specific settings file plus env overrides.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SYMDEX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(|e| ConfigError::Settings(Box::new(e)))
    }

    /// Walk ancestors of the cwd looking for a `.symdex` directory.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let dir = ancestor.join(".symdex");
            if dir.is_dir() {
                return Some(dir.join("settings.toml"));
            }
        }
        None
    }

    /// Workspace root, i.e. the directory holding `.symdex`.
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|a| a.join(".symdex").is_dir())
            .map(Path::to_path_buf)
    }

    /// Persist the current settings as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
                reason: format!("cannot create '{}': {e}", parent.display()),
            })?;
        }
        let rendered = toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        std::fs::write(path, rendered).map_err(|e| ConfigError::Invalid {
            reason: format!("cannot write '{}': {e}", path.display()),
        })
    }

    /// Create a default settings file under `.symdex/`.
    pub fn init_config_file(root: &Path, force: bool) -> ConfigResult<PathBuf> {
        let config_path = root.join(".symdex/settings.toml");
        if !force && config_path.exists() {
            return Err(ConfigError::Invalid {
                reason: format!("'{}' already exists (use --force)", config_path.display()),
            });
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.indexing.debounce_ms, 200);
        assert!(settings.indexing.parallel_threads > 0);
        assert_eq!(settings.store.prepared_statement_cache, 64);
    }

    #[test]
    fn load_from_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");
        fs::write(
            &path,
            r#"
version = 2

[indexing]
parallel_threads = 4
debounce_ms = 50
ignore_patterns = ["gen/**"]

[logging]
default = "info"

[logging.modules]
indexer = "debug"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.indexing.parallel_threads, 4);
        assert_eq!(settings.indexing.debounce_ms, 50);
        assert_eq!(settings.indexing.ignore_patterns, vec!["gen/**"]);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["indexer"], "debug");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");
        fs::write(&path, "[indexing]\nparallel_threads = 16\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.indexing.parallel_threads, 16);
        assert_eq!(settings.indexing.debounce_ms, 200);
        assert_eq!(settings.version, 1);
    }

    #[test]
    fn save_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.indexing.debounce_ms = 75;
        settings.save(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.indexing.debounce_ms, 75);
    }
}
