//! Error taxonomy for the index server.
//!
//! Each failure domain gets its own enum so callers can route recovery:
//! file-scoped errors stay isolated to the file, session-scoped errors
//! produce an error response but keep the session alive.

use std::path::PathBuf;

use thiserror::Error;

/// Project setup and configuration failures. Surfaced as `initialize` failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no package manifest found under '{root}'")]
    MissingManifest { root: PathBuf },

    #[error("no binding registered for language '{language_id}'")]
    UnsupportedLanguage { language_id: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("failed to load settings: {0}")]
    Settings(#[from] Box<figment::Error>),
}

/// Per-file analysis failures. Never fatal: the file keeps its prior
/// fragment (if any) and the error is surfaced on the update stream.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to analyze '{path}': {reason}")]
    Analysis { path: PathBuf, reason: String },
}

impl AnalyzerError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::FileRead { path, .. } | Self::Analysis { path, .. } => path,
        }
    }
}

/// Fragment cache failures. The cache is an optimization, never
/// authoritative: all of these fall back to re-analysis.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache entry '{path}' failed to decode: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("cache manifest is corrupt: {reason}")]
    CorruptManifest { reason: String },

    #[error("cache lock at '{path}' held by another process")]
    LockContended { path: PathBuf },
}

/// Filesystem watcher failures. Overflow triggers a full rescan of the
/// affected root.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch backend error: {0}")]
    Backend(#[from] notify::Error),

    #[error("watch event queue overflowed for root '{root}'")]
    Overflow { root: PathBuf },

    #[error("watch channel closed")]
    ChannelClosed,
}

/// Read-channel query failures. Raised synchronously to the caller and
/// never crash the process.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("only SELECT and WITH statements are allowed, got '{keyword}'")]
    NotReadOnly { keyword: String },

    #[error("empty query")]
    Empty,

    #[error("unsupported parameter type at position {position}")]
    BadParameter { position: usize },

    #[error("{0}")]
    Engine(String),
}

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Engine(e.to_string())
    }
}

/// Operation invoked in the wrong lifecycle state.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("not initialized")]
    NotInitialized,

    #[error("'{operation}' is not valid in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("session has shut down")]
    ShutDown,
}

/// Malformed JSON-RPC traffic.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("invalid params for '{method}': {reason}")]
    InvalidParams { method: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type WatchResult<T> = Result<T, WatchError>;
pub type SqlResult<T> = Result<T, QueryError>;
