//! Record types produced by language bindings.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{RelationKind, SymbolKind};

/// One symbol definition, keyed by its opaque globally-unique `scip_id`.
///
/// `file` is `None` for symbols that live in another package (externals);
/// such symbols still get a row so relationships can point at them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub scip_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub package: Option<String>,
    pub version: Option<String>,
    /// `scip_id` of the enclosing symbol. May reference a symbol from
    /// another package that was never inserted; no referential integrity is
    /// enforced across packages.
    pub container_id: Option<String>,
    pub display_name: Option<String>,
    pub documentation: Option<String>,
    pub language: Option<String>,
}

impl Symbol {
    pub fn new(scip_id: impl Into<String>, name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            scip_id: scip_id.into(),
            name: name.into(),
            kind,
            file: None,
            line: None,
            column: None,
            package: None,
            version: None,
            container_id: None,
            display_name: None,
            documentation: None,
            language: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn in_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    pub fn in_package(mut self, package: impl Into<String>, version: Option<String>) -> Self {
        self.package = Some(package.into());
        self.version = version;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }
}

/// One appearance of a symbol in source, definition or reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub symbol_id: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
    pub is_definition: bool,
    /// Last line of the enclosing definition body, when known.
    pub enclosing_end_line: Option<u32>,
}

impl Occurrence {
    pub fn definition(symbol_id: impl Into<String>, file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            symbol_id: symbol_id.into(),
            file: file.into(),
            line,
            column,
            end_line: None,
            end_column: None,
            is_definition: true,
            enclosing_end_line: None,
        }
    }

    pub fn reference(symbol_id: impl Into<String>, file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            is_definition: false,
            ..Self::definition(symbol_id, file, line, column)
        }
    }

    pub fn spanning(mut self, end_line: u32, end_column: u32) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }

    pub fn enclosed_to(mut self, end_line: u32) -> Self {
        self.enclosing_end_line = Some(end_line);
        self
    }

    /// Identity under which duplicate occurrences are merged.
    pub fn dedup_key(&self) -> (&str, &str, u32, u32, bool) {
        (
            self.symbol_id.as_str(),
            self.file.as_str(),
            self.line,
            self.column,
            self.is_definition,
        )
    }
}

/// Directed typed edge between two symbols. The triple is a set: duplicate
/// edges merge idempotently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from_symbol: String,
    pub to_symbol: String,
    pub kind: RelationKind,
}

impl Relationship {
    pub fn new(
        from_symbol: impl Into<String>,
        to_symbol: impl Into<String>,
        kind: RelationKind,
    ) -> Self {
        Self {
            from_symbol: from_symbol.into(),
            to_symbol: to_symbol.into(),
            kind,
        }
    }
}

/// Semantic output for one source file: everything the file contributed,
/// replaced atomically when the file is re-analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFragment {
    /// Path relative to the package root, forward slashes.
    pub path: String,
    pub language: String,
    /// SHA-256 of the file content, lowercase hex.
    pub content_hash: String,
    /// Modification time, seconds since the epoch.
    pub mtime: u64,
    pub symbols: Vec<Symbol>,
    pub occurrences: Vec<Occurrence>,
    pub relationships: Vec<Relationship>,
    /// Symbol ids referenced by this file's relationships but defined in
    /// some other package. Relationship endpoints must either resolve in
    /// the symbols table or be listed here.
    pub external_symbols: Vec<String>,
}

impl FileFragment {
    pub fn new(path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            content_hash: String::new(),
            mtime: 0,
            symbols: Vec::new(),
            occurrences: Vec::new(),
            relationships: Vec::new(),
            external_symbols: Vec::new(),
        }
    }

    /// Ids of the symbols this fragment defines.
    pub fn symbol_ids(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.scip_id.as_str())
    }
}

/// SHA-256 of file content, lowercase hex. The cache hit test compares
/// this against the hash stored alongside the fragment.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
