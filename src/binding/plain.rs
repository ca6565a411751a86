//! Built-in binding for `.src` files: a small brace-scoped language with
//! `class`/`interface`/`enum` containers, `fn` members, and
//! `extends`/`implements` clauses.
//!
//! It exists so the server runs and the test suite has a real analyzer to
//! drive; production deployments register richer bindings alongside it.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use super::{Binding, DependencySpec, PackageSpec};
use crate::error::{AnalyzerError, AnalyzerResult, ConfigError, ConfigResult};
use crate::semantic::{FileFragment, Occurrence, Relationship, Symbol};
use crate::types::{RelationKind, SymbolKind};

const MANIFEST: &str = "pkg.toml";
const ANALYZER_VERSION: &str = "plain-1";

pub struct PlainBinding {
    extensions: [&'static str; 1],
}

impl PlainBinding {
    pub fn new() -> Self {
        Self { extensions: ["src"] }
    }
}

impl Default for PlainBinding {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct Manifest {
    package: ManifestPackage,
    #[serde(default)]
    dependencies: HashMap<String, ManifestDep>,
}

#[derive(Deserialize)]
struct ManifestPackage {
    name: String,
    version: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestDep {
    Version(String),
    Detailed {
        version: Option<String>,
        path: Option<String>,
    },
}

/// An open `{ ... }` scope awaiting its closing brace.
struct Scope {
    occ_index: usize,
    depth_before: usize,
    /// Set for class-like scopes: (name, scip_id, kind).
    container: Option<(String, String, SymbolKind)>,
}

impl Binding for PlainBinding {
    fn language_id(&self) -> &str {
        "plain"
    }

    fn package_file(&self) -> &str {
        MANIFEST
    }

    fn extensions(&self) -> &[&str] {
        &self.extensions
    }

    fn analyzer_version(&self) -> &str {
        ANALYZER_VERSION
    }

    fn discover(&self, root: &Path) -> ConfigResult<Vec<PackageSpec>> {
        let manifest_path = root.join(MANIFEST);
        let raw = std::fs::read_to_string(&manifest_path).map_err(|_| {
            ConfigError::MissingManifest {
                root: root.to_path_buf(),
            }
        })?;
        let manifest: Manifest = toml::from_str(&raw).map_err(|e| ConfigError::Invalid {
            reason: format!("malformed '{}': {e}", manifest_path.display()),
        })?;

        let dependencies = manifest
            .dependencies
            .into_iter()
            .map(|(name, dep)| {
                let (version, path) = match dep {
                    ManifestDep::Version(v) => (Some(v), None),
                    ManifestDep::Detailed { version, path } => (version, path),
                };
                DependencySpec {
                    name,
                    version,
                    source_root: path.map(|p| root.join(p)),
                }
            })
            .collect();

        Ok(vec![PackageSpec {
            name: manifest.package.name,
            version: manifest.package.version,
            root: root.to_path_buf(),
            dependencies,
        }])
    }

    fn analyze(&self, package: &str, rel_path: &str, content: &str) -> AnalyzerResult<FileFragment> {
        analyze_source(package, rel_path, content)
    }
}

fn analyze_source(package: &str, rel_path: &str, content: &str) -> AnalyzerResult<FileFragment> {
    let mut fragment = FileFragment::new(rel_path, "plain");
    let mut open: Vec<Scope> = Vec::new();
    let mut depth: usize = 0;
    let mut docs: Vec<String> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    // class-like name -> scip_id, for resolving extends/implements in-file
    let mut defined: HashMap<String, String> = HashMap::new();
    // (from_id, target_name, kind, line, column)
    let mut pending: Vec<(String, String, RelationKind, u32, u32)> = Vec::new();

    for (i, raw) in content.lines().enumerate() {
        let line_no = (i + 1) as u32;
        let trimmed = raw.trim();

        if let Some(doc) = trimmed.strip_prefix("///") {
            docs.push(doc.trim().to_string());
            continue;
        }

        let container = current_container(&open);
        let mut words = trimmed.split_whitespace();
        match words.next() {
            Some(kw @ ("class" | "interface" | "enum")) => {
                let kind = match kw {
                    "class" => SymbolKind::Class,
                    "interface" => SymbolKind::Interface,
                    _ => SymbolKind::Enum,
                };
                let name = words.next().map(clean_ident).filter(|n| !n.is_empty());
                if let Some(name) = name {
                    let scip_id = symbol_id(package, rel_path, None, &name);
                    let column = column_of(raw, &name);
                    if seen_ids.insert(scip_id.clone()) {
                        let mut symbol = Symbol::new(&scip_id, &name, kind)
                            .at(rel_path, line_no, column)
                            .with_language("plain");
                        symbol.display_name = Some(name.clone());
                        attach_docs(&mut symbol, &mut docs);
                        fragment.symbols.push(symbol);
                        fragment
                            .occurrences
                            .push(definition_at(&scip_id, rel_path, line_no, column, &name));
                        defined.insert(name.clone(), scip_id.clone());

                        for (target, rel_kind) in parse_supertypes(trimmed) {
                            let column = column_of(raw, &target);
                            pending.push((scip_id.clone(), target, rel_kind, line_no, column));
                        }

                        open.push(Scope {
                            occ_index: fragment.occurrences.len() - 1,
                            depth_before: depth,
                            container: Some((name, scip_id, kind)),
                        });
                    } else {
                        tracing::debug!("[plain] duplicate definition of '{name}' in {rel_path}:{line_no}");
                    }
                }
            }
            Some("fn" | "function" | "def") => {
                let name = words
                    .next()
                    .map(|w| clean_ident(w.split('(').next().unwrap_or(w)))
                    .filter(|n| !n.is_empty());
                if let Some(name) = name {
                    let kind = if container.is_some() {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    let qualifier = container.map(|(n, _, _)| n.to_string());
                    let scip_id = symbol_id(package, rel_path, qualifier.as_deref(), &name);
                    let column = column_of(raw, &name);
                    if seen_ids.insert(scip_id.clone()) {
                        let mut symbol = Symbol::new(&scip_id, &name, kind)
                            .at(rel_path, line_no, column)
                            .with_language("plain");
                        symbol.display_name = Some(match &qualifier {
                            Some(q) => format!("{q}.{name}"),
                            None => name.clone(),
                        });
                        if let Some((_, container_id, _)) = current_container(&open) {
                            symbol.container_id = Some(container_id.to_string());
                        }
                        attach_docs(&mut symbol, &mut docs);
                        fragment.symbols.push(symbol);
                        fragment
                            .occurrences
                            .push(definition_at(&scip_id, rel_path, line_no, column, &name));
                        open.push(Scope {
                            occ_index: fragment.occurrences.len() - 1,
                            depth_before: depth,
                            container: None,
                        });
                    } else {
                        tracing::debug!("[plain] duplicate definition of '{name}' in {rel_path}:{line_no}");
                    }
                }
            }
            Some(kw @ ("field" | "let" | "var")) => {
                let name = words.next().map(clean_ident).filter(|n| !n.is_empty());
                if let Some(name) = name {
                    let kind = if kw == "field" {
                        SymbolKind::Field
                    } else {
                        SymbolKind::Variable
                    };
                    let qualifier = container.map(|(n, _, _)| n.to_string());
                    let scip_id = symbol_id(package, rel_path, qualifier.as_deref(), &name);
                    let column = column_of(raw, &name);
                    if seen_ids.insert(scip_id.clone()) {
                        let mut symbol = Symbol::new(&scip_id, &name, kind)
                            .at(rel_path, line_no, column)
                            .with_language("plain");
                        symbol.display_name = Some(name.clone());
                        if let Some((_, container_id, _)) = current_container(&open) {
                            symbol.container_id = Some(container_id.to_string());
                        }
                        attach_docs(&mut symbol, &mut docs);
                        fragment.symbols.push(symbol);
                        fragment
                            .occurrences
                            .push(definition_at(&scip_id, rel_path, line_no, column, &name));
                    }
                }
            }
            Some(word) => {
                // Bare identifiers inside an enum body are members.
                if let Some((container_name, container_id, SymbolKind::Enum)) = container {
                    let name = clean_ident(word);
                    if !name.is_empty() && is_ident(&name) && words.next().is_none() {
                        let scip_id = symbol_id(package, rel_path, Some(container_name), &name);
                        let column = column_of(raw, &name);
                        if seen_ids.insert(scip_id.clone()) {
                            let mut symbol = Symbol::new(&scip_id, &name, SymbolKind::EnumMember)
                                .at(rel_path, line_no, column)
                                .with_language("plain");
                            symbol.display_name = Some(format!("{container_name}.{name}"));
                            symbol.container_id = Some(container_id.to_string());
                            attach_docs(&mut symbol, &mut docs);
                            fragment.symbols.push(symbol);
                            fragment
                                .occurrences
                                .push(definition_at(&scip_id, rel_path, line_no, column, &name));
                        }
                    }
                }
                docs.clear();
            }
            None => docs.clear(),
        }

        // Brace bookkeeping closes scopes and back-patches enclosing spans.
        for ch in raw.chars() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth = depth.checked_sub(1).ok_or_else(|| AnalyzerError::Analysis {
                        path: rel_path.into(),
                        reason: format!("unbalanced '}}' at line {line_no}"),
                    })?;
                    while let Some(top) = open.last() {
                        if depth > top.depth_before {
                            break;
                        }
                        if let Some(top) = open.pop() {
                            fragment.occurrences[top.occ_index].enclosing_end_line = Some(line_no);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    for (from_id, target, kind, line, column) in pending {
        match defined.get(&target) {
            Some(to_id) => {
                fragment
                    .relationships
                    .push(Relationship::new(&from_id, to_id, kind));
                fragment
                    .occurrences
                    .push(Occurrence::reference(to_id, rel_path, line, column));
            }
            None => {
                let to_id = format!("{package}::<ext>::{target}");
                fragment
                    .relationships
                    .push(Relationship::new(&from_id, &to_id, kind));
                if !fragment.external_symbols.contains(&to_id) {
                    fragment.external_symbols.push(to_id);
                }
            }
        }
    }

    Ok(fragment)
}

fn current_container(open: &[Scope]) -> Option<(&str, &str, SymbolKind)> {
    open.iter()
        .rev()
        .find_map(|s| s.container.as_ref())
        .map(|(name, id, kind)| (name.as_str(), id.as_str(), *kind))
}

fn symbol_id(package: &str, rel_path: &str, qualifier: Option<&str>, name: &str) -> String {
    match qualifier {
        Some(q) => format!("{package}::{rel_path}::{q}.{name}"),
        None => format!("{package}::{rel_path}::{name}"),
    }
}

fn definition_at(scip_id: &str, rel_path: &str, line: u32, column: u32, name: &str) -> Occurrence {
    Occurrence::definition(scip_id, rel_path, line, column)
        .spanning(line, column + name.len() as u32)
}

fn attach_docs(symbol: &mut Symbol, docs: &mut Vec<String>) {
    if !docs.is_empty() {
        symbol.documentation = Some(docs.join("\n"));
        docs.clear();
    }
}

/// Targets of `extends`/`implements` clauses in a container header.
fn parse_supertypes(header: &str) -> Vec<(String, RelationKind)> {
    let mut out = Vec::new();
    let mut mode: Option<RelationKind> = None;
    for word in header.trim_end_matches('{').split_whitespace().skip(2) {
        match word {
            "extends" => mode = Some(RelationKind::Extends),
            "implements" => mode = Some(RelationKind::Implements),
            w => {
                if let Some(kind) = mode {
                    let target = clean_ident(w);
                    if !target.is_empty() {
                        out.push((target, kind));
                    }
                }
            }
        }
    }
    out
}

fn clean_ident(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_string()
}

fn is_ident(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// 1-based column of the first occurrence of `name` in `raw`.
fn column_of(raw: &str, name: &str) -> u32 {
    raw.find(name).map(|i| i as u32 + 1).unwrap_or(1)
}
