//! Semantic-to-relational conversion.
//!
//! Stateless and deterministic: identical input produces byte-identical
//! rows. Packages are visited in the order the caller supplies, documents
//! in sorted path order, rows in fragment order. Deduplication happens
//! here, at projection time: symbols collapse by `scip_id` (later write
//! wins, counted as a collision), occurrences by their identity tuple,
//! relationships by the full triple.

use std::collections::HashSet;

use rusqlite::{params, Connection};

use crate::error::SqlResult;
use crate::semantic::SemanticIndex;

/// Row counts for one rebuild, plus the number of symbol-id collisions
/// that were resolved later-write-wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub symbols: usize,
    pub occurrences: usize,
    pub relationships: usize,
    pub symbol_collisions: usize,
}

/// Two-phase store rebuild: delete everything, re-insert the union of the
/// given indexes' fragments, all in one transaction.
pub(crate) fn rebuild<'a>(
    conn: &mut Connection,
    indexes: impl IntoIterator<Item = &'a SemanticIndex>,
) -> SqlResult<RebuildStats> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "DELETE FROM relationships; DELETE FROM occurrences; DELETE FROM symbols;",
    )?;

    let mut stats = RebuildStats::default();
    let mut seen_symbols: HashSet<String> = HashSet::new();
    let mut seen_occurrences: HashSet<(String, String, u32, u32, bool)> = HashSet::new();
    let mut seen_relationships: HashSet<(String, String, &'static str)> = HashSet::new();

    {
        let mut insert_symbol = tx.prepare_cached(
            "INSERT OR REPLACE INTO symbols \
             (scip_id, name, kind, file, line, column_num, package, version, \
              container_id, display_name, documentation, language) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        let mut insert_occurrence = tx.prepare_cached(
            "INSERT INTO occurrences \
             (symbol_id, file, line, column_num, end_line, end_column, \
              is_definition, enclosing_end_line) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        let mut insert_relationship = tx.prepare_cached(
            "INSERT INTO relationships (from_symbol, to_symbol, kind) VALUES (?1, ?2, ?3)",
        )?;

        for index in indexes {
            for fragment in index.fragments() {
                for symbol in &fragment.symbols {
                    if !seen_symbols.insert(symbol.scip_id.clone()) {
                        stats.symbol_collisions += 1;
                        tracing::warn!(
                            "[convert] symbol id collision, later definition wins: {}",
                            symbol.scip_id
                        );
                    }
                    let package = symbol.package.as_deref().or(Some(index.package()));
                    let version = symbol.version.as_deref().or(index.version());
                    insert_symbol.execute(params![
                        symbol.scip_id,
                        symbol.name,
                        symbol.kind.as_str(),
                        symbol.file,
                        symbol.line,
                        symbol.column,
                        package,
                        version,
                        symbol.container_id,
                        symbol.display_name,
                        symbol.documentation,
                        symbol.language,
                    ])?;
                }

                for occurrence in &fragment.occurrences {
                    let key = (
                        occurrence.symbol_id.clone(),
                        occurrence.file.clone(),
                        occurrence.line,
                        occurrence.column,
                        occurrence.is_definition,
                    );
                    if !seen_occurrences.insert(key) {
                        continue;
                    }
                    insert_occurrence.execute(params![
                        occurrence.symbol_id,
                        occurrence.file,
                        occurrence.line,
                        occurrence.column,
                        occurrence.end_line,
                        occurrence.end_column,
                        occurrence.is_definition,
                        occurrence.enclosing_end_line,
                    ])?;
                    stats.occurrences += 1;
                }

                for relationship in &fragment.relationships {
                    let key = (
                        relationship.from_symbol.clone(),
                        relationship.to_symbol.clone(),
                        relationship.kind.as_str(),
                    );
                    if !seen_relationships.insert(key) {
                        continue;
                    }
                    insert_relationship.execute(params![
                        relationship.from_symbol,
                        relationship.to_symbol,
                        relationship.kind.as_str(),
                    ])?;
                    stats.relationships += 1;
                }
            }
        }
    }

    tx.commit()?;
    stats.symbols = seen_symbols.len();
    Ok(stats)
}
