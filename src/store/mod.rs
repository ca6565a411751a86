//! Embedded relational store.
//!
//! A single in-memory SQLite database with a fixed schema. Two channels:
//! the write channel is the converter's [`SymbolStore::rebuild`], the only
//! code path that mutates tables; the read channel is [`SymbolStore::query`],
//! which refuses anything that is not a SELECT/WITH statement before the
//! engine ever sees it.

mod convert;
mod query;

use parking_lot::Mutex;
use rusqlite::Connection;

pub use convert::RebuildStats;
pub use query::QueryResult;

use crate::config::StoreConfig;
use crate::error::SqlResult;
use crate::semantic::SemanticIndex;

/// Fixed schema. Column names and types are part of the external contract.
const SCHEMA: &str = r#"
CREATE TABLE symbols (
  scip_id       TEXT PRIMARY KEY,
  name          TEXT NOT NULL,
  kind          TEXT NOT NULL,
  file          TEXT,
  line          INTEGER,
  column_num    INTEGER,
  package       TEXT,
  version       TEXT,
  container_id  TEXT,
  display_name  TEXT,
  documentation TEXT,
  language      TEXT
);

CREATE TABLE occurrences (
  id                  INTEGER PRIMARY KEY AUTOINCREMENT,
  symbol_id           TEXT NOT NULL,
  file                TEXT NOT NULL,
  line                INTEGER NOT NULL,
  column_num          INTEGER NOT NULL,
  end_line            INTEGER,
  end_column          INTEGER,
  is_definition       INTEGER NOT NULL,
  enclosing_end_line  INTEGER
);

CREATE TABLE relationships (
  from_symbol TEXT NOT NULL,
  to_symbol   TEXT NOT NULL,
  kind        TEXT NOT NULL
);

CREATE INDEX idx_symbols_name ON symbols(name);
CREATE INDEX idx_symbols_kind ON symbols(kind);
CREATE INDEX idx_symbols_file ON symbols(file);
CREATE INDEX idx_symbols_container ON symbols(container_id);
CREATE INDEX idx_occurrences_symbol ON occurrences(symbol_id);
CREATE INDEX idx_occurrences_file ON occurrences(file);
CREATE INDEX idx_relationships_from ON relationships(from_symbol);
CREATE INDEX idx_relationships_to ON relationships(to_symbol);
"#;

/// The queryable projection of all fragments across all packages.
///
/// One writer (rebuild), many readers. The connection lock is held for the
/// whole rebuild transaction, so a read observes either the pre-rebuild or
/// the post-rebuild snapshot, never a partial one.
pub struct SymbolStore {
    conn: Mutex<Connection>,
}

impl SymbolStore {
    pub fn in_memory(config: &StoreConfig) -> SqlResult<Self> {
        let conn = Connection::open_in_memory().map_err(crate::error::QueryError::from)?;
        conn.set_prepared_statement_cache_capacity(config.prepared_statement_cache);
        conn.execute_batch(SCHEMA)
            .map_err(crate::error::QueryError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read channel. Rejects non-SELECT/WITH statements with a typed error
    /// before touching the engine. Parameters bind positionally.
    pub fn query(&self, sql: &str, params: &[serde_json::Value]) -> SqlResult<QueryResult> {
        query::enforce_read_only(sql)?;
        let conn = self.conn.lock();
        query::run_select(&conn, sql, params)
    }

    /// Write channel, reserved to the converter: atomically replace the
    /// store contents with the union of the given indexes' fragments.
    pub fn rebuild<'a>(
        &self,
        indexes: impl IntoIterator<Item = &'a SemanticIndex>,
    ) -> SqlResult<RebuildStats> {
        let mut conn = self.conn.lock();
        convert::rebuild(&mut conn, indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{FileFragment, Occurrence, Symbol};
    use crate::types::SymbolKind;

    fn store_with_one_symbol() -> SymbolStore {
        let store = SymbolStore::in_memory(&StoreConfig::default()).unwrap();
        let mut index = SemanticIndex::new("app", None);
        let mut fragment = FileFragment::new("lib/a.src", "plain");
        fragment.symbols.push(
            Symbol::new("app::lib/a.src::AuthService", "AuthService", SymbolKind::Class)
                .at("lib/a.src", 10, 1),
        );
        fragment.occurrences.push(Occurrence::definition(
            "app::lib/a.src::AuthService",
            "lib/a.src",
            10,
            1,
        ));
        index.insert_fragment(fragment);
        store.rebuild([&index]).unwrap();
        store
    }

    #[test]
    fn query_by_name() {
        let store = store_with_one_symbol();
        let result = store
            .query(
                "SELECT name, kind, line FROM symbols WHERE name = 'AuthService'",
                &[],
            )
            .unwrap();
        assert_eq!(result.columns, vec!["name", "kind", "line"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], serde_json::json!("AuthService"));
        assert_eq!(result.rows[0][1], serde_json::json!("class"));
        assert_eq!(result.rows[0][2], serde_json::json!(10));
    }

    #[test]
    fn write_statements_are_rejected_without_side_effects() {
        let store = store_with_one_symbol();
        let err = store.query("DELETE FROM symbols", &[]).unwrap_err();
        assert!(matches!(err, crate::error::QueryError::NotReadOnly { .. }));

        let count = store
            .query("SELECT COUNT(*) AS n FROM symbols", &[])
            .unwrap();
        assert_eq!(count.rows[0][0], serde_json::json!(1));
    }

    #[test]
    fn positional_parameters_bind() {
        let store = store_with_one_symbol();
        let result = store
            .query(
                "SELECT line FROM symbols WHERE name = ?1",
                &[serde_json::json!("AuthService")],
            )
            .unwrap();
        assert_eq!(result.rows[0][0], serde_json::json!(10));
    }

    #[test]
    fn rebuild_replaces_previous_contents() {
        let store = store_with_one_symbol();

        let mut index = SemanticIndex::new("app", None);
        let mut fragment = FileFragment::new("lib/b.src", "plain");
        fragment
            .symbols
            .push(Symbol::new("app::lib/b.src::Other", "Other", SymbolKind::Class));
        index.insert_fragment(fragment);
        store.rebuild([&index]).unwrap();

        let gone = store
            .query("SELECT COUNT(*) FROM symbols WHERE name = 'AuthService'", &[])
            .unwrap();
        assert_eq!(gone.rows[0][0], serde_json::json!(0));
        let there = store
            .query("SELECT COUNT(*) FROM symbols WHERE name = 'Other'", &[])
            .unwrap();
        assert_eq!(there.rows[0][0], serde_json::json!(1));
    }
}
