//! Shared value types used across the index, store, and RPC layers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Classification of a symbol, as produced by a language binding.
///
/// Serialized in kebab-case; this is also the exact string stored in the
/// `symbols.kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    Class,
    Interface,
    Method,
    Function,
    Field,
    Variable,
    Module,
    Parameter,
    TypeParameter,
    Enum,
    EnumMember,
    Constructor,
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Method => "method",
            Self::Function => "function",
            Self::Field => "field",
            Self::Variable => "variable",
            Self::Module => "module",
            Self::Parameter => "parameter",
            Self::TypeParameter => "type-parameter",
            Self::Enum => "enum",
            Self::EnumMember => "enum-member",
            Self::Constructor => "constructor",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed directed edge between two symbols.
///
/// Serialized in snake_case; also the exact string stored in the
/// `relationships.kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Implements,
    Extends,
    Calls,
    References,
    TypeDefinition,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Implements => "implements",
            Self::Extends => "extends",
            Self::Calls => "calls",
            Self::References => "references",
            Self::TypeDefinition => "type_definition",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A single filesystem change event, as emitted by the watcher.
///
/// Events are at-least-once: duplicates and spurious notifications are
/// permitted and the indexer must tolerate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Which packages contribute rows when the store is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryScope {
    /// Local workspace packages only.
    Local,
    /// Local packages plus all loaded external dependency indexes.
    #[default]
    All,
    /// An explicit subset of package names.
    Packages(Vec<String>),
}

impl QueryScope {
    /// Whether a package with the given name and locality contributes rows.
    pub fn includes(&self, name: &str, is_local: bool) -> bool {
        match self {
            Self::Local => is_local,
            Self::All => true,
            Self::Packages(names) => names.iter().any(|n| n == name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_kind_strings_match_serde() {
        for kind in [
            SymbolKind::Class,
            SymbolKind::TypeParameter,
            SymbolKind::EnumMember,
            SymbolKind::Other,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn relation_kind_strings_match_serde() {
        for kind in [
            RelationKind::Implements,
            RelationKind::Calls,
            RelationKind::TypeDefinition,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn scope_filtering() {
        assert!(QueryScope::Local.includes("app", true));
        assert!(!QueryScope::Local.includes("dep", false));
        assert!(QueryScope::All.includes("dep", false));

        let subset = QueryScope::Packages(vec!["app".to_string()]);
        assert!(subset.includes("app", false));
        assert!(!subset.includes("dep", true));
    }
}
