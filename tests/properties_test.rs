//! Invariant tests over the store, indexer, cache, and debouncer.

mod common;

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::sync::broadcast;

use symdex::binding::{Binding, BindingRegistry, PlainBinding};
use symdex::cache::FragmentCache;
use symdex::config::{Settings, StoreConfig};
use symdex::error::QueryError;
use symdex::indexing::{ChangeDebouncer, PackageIndexer};
use symdex::semantic::content_hash;
use symdex::store::SymbolStore;
use symdex::types::{ChangeKind, FileChange};

fn empty_store() -> SymbolStore {
    SymbolStore::in_memory(&StoreConfig::default()).unwrap()
}

proptest! {
    /// Invariant 1: everything the read channel accepts starts (after
    /// comments and whitespace) with SELECT or WITH.
    #[test]
    fn read_gate_accepts_only_select_and_with(
        prefix in prop::sample::select(vec!["", "  ", "\n\t ", "-- comment\n", "/* block */ ", "/* a */ -- b\n"]),
        keyword in prop::sample::select(vec![
            "SELECT", "select", "Select", "WITH", "with",
            "DELETE", "UPDATE", "INSERT", "DROP", "CREATE", "PRAGMA", "ATTACH", "VACUUM",
        ]),
        tail in "[ a-zA-Z0-9*,='_]{0,40}",
    ) {
        let store = empty_store();
        let sql = format!("{prefix}{keyword} {tail}");
        let should_pass = keyword.eq_ignore_ascii_case("select") || keyword.eq_ignore_ascii_case("with");

        match store.query(&sql, &[]) {
            Err(QueryError::NotReadOnly { .. }) => prop_assert!(!should_pass, "gated: {sql}"),
            // Ok, or a syntax/engine error: either way the gate let it through.
            _ => prop_assert!(should_pass, "passed the gate: {sql}"),
        }
    }
}

fn indexer_over(root: &std::path::Path) -> PackageIndexer {
    let (updates, _) = broadcast::channel(256);
    let binding: Arc<dyn Binding> = Arc::new(PlainBinding::new());
    let cache = FragmentCache::open(
        root.join(".cache"),
        "app",
        binding.analyzer_version(),
    )
    .unwrap();
    PackageIndexer::new(
        "app",
        None,
        root,
        binding,
        Arc::new(Settings::default()),
        cache,
        updates,
    )
}

/// Invariant 2: after an arbitrary change sequence plus rebuild, store rows
/// equal the union of fragments derivable from the current files on disk.
#[test]
fn store_matches_disk_after_change_sequence() {
    let temp = common::project(&[
        ("a.src", "class Alpha {\n}\n"),
        ("b.src", "class Beta {\n  fn run() {\n  }\n}\n"),
    ]);
    let root = temp.path();
    let mut indexer = indexer_over(root);
    indexer.initial_index(None);

    // Churn: modify, create, delete, re-create.
    fs::write(root.join("a.src"), "class AlphaPrime {\n}\n").unwrap();
    indexer.reconcile(FileChange::new(root.join("a.src"), ChangeKind::Modified));

    common::write_file(root, "c.src", "fn free() {\n}\n");
    indexer.reconcile(FileChange::new(root.join("c.src"), ChangeKind::Created));

    fs::remove_file(root.join("b.src")).unwrap();
    indexer.reconcile(FileChange::new(root.join("b.src"), ChangeKind::Deleted));

    common::write_file(root, "b.src", "class BetaTwo {\n}\n");
    indexer.reconcile(FileChange::new(root.join("b.src"), ChangeKind::Created));

    let store = empty_store();
    store.rebuild([indexer.index()]).unwrap();

    // Reference: analyze every on-disk source file from scratch.
    let binding = PlainBinding::new();
    let mut expected: HashSet<String> = HashSet::new();
    for name in ["a.src", "b.src", "c.src"] {
        let content = fs::read_to_string(root.join(name)).unwrap();
        let fragment = binding.analyze("app", name, &content).unwrap();
        expected.extend(fragment.symbols.iter().map(|s| s.scip_id.clone()));
    }

    let rows = store.query("SELECT scip_id FROM symbols", &[]).unwrap();
    let actual: HashSet<String> = rows
        .rows
        .iter()
        .map(|r| r[0].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actual, expected);
}

/// Invariant 3: every symbol with a file has exactly one definition
/// occurrence.
#[test]
fn exactly_one_definition_per_local_symbol() {
    let temp = common::project(&[
        ("a.src", "class A {\n  field x\n  fn m() {\n  }\n}\n"),
        ("b.src", "enum E {\n  One,\n  Two\n}\nfn top() {\n}\n"),
    ]);
    let registry = common::open_registry(temp.path());
    registry.initial_index_all(None);

    let store = empty_store();
    registry.rebuild_store(&store).unwrap();

    let result = store
        .query(
            "SELECT s.scip_id, \
                    (SELECT COUNT(*) FROM occurrences o \
                     WHERE o.symbol_id = s.scip_id AND o.is_definition = 1) AS defs \
             FROM symbols s WHERE s.file IS NOT NULL",
            &[],
        )
        .unwrap();
    assert!(!result.rows.is_empty());
    for row in &result.rows {
        assert_eq!(
            row[1],
            serde_json::json!(1),
            "symbol {} has {} definitions",
            row[0],
            row[1]
        );
    }
}

/// Invariant 4: every relationship endpoint resolves in the symbols table
/// or is explicitly marked external by its source fragment.
#[test]
fn relationship_endpoints_resolve_or_are_external() {
    let temp = common::project(&[(
        "a.src",
        "interface Clock {\n}\nclass Timer extends RemoteBase implements Clock {\n}\n",
    )]);
    let mut indexer = indexer_over(temp.path());
    indexer.initial_index(None);

    let store = empty_store();
    store.rebuild([indexer.index()]).unwrap();

    let known: HashSet<String> = store
        .query("SELECT scip_id FROM symbols", &[])
        .unwrap()
        .rows
        .iter()
        .map(|r| r[0].as_str().unwrap().to_string())
        .collect();
    let external: HashSet<String> = indexer
        .index()
        .fragments()
        .flat_map(|f| f.external_symbols.iter().cloned())
        .collect();

    let relationships = store
        .query("SELECT from_symbol, to_symbol FROM relationships", &[])
        .unwrap();
    assert!(!relationships.rows.is_empty());
    for row in &relationships.rows {
        for endpoint in [&row[0], &row[1]] {
            let id = endpoint.as_str().unwrap();
            assert!(
                known.contains(id) || external.contains(id),
                "dangling endpoint: {id}"
            );
        }
    }
}

/// Invariant 5: cache round-trip preserves the fragment, and an unchanged
/// content hash hits.
#[test]
fn cache_round_trip_and_hit() {
    let temp = tempfile::TempDir::new().unwrap();
    let binding = PlainBinding::new();
    let cache = FragmentCache::open(temp.path(), "app", binding.analyzer_version()).unwrap();

    let content = "class Foo {\n  fn m() {\n  }\n}\n";
    let mut fragment = binding.analyze("app", "lib/foo.src", content).unwrap();
    fragment.content_hash = content_hash(content);
    fragment.mtime = 42;

    cache.store(&fragment).unwrap();
    let loaded = cache.load("lib/foo.src", &content_hash(content));
    assert_eq!(loaded, Some(fragment));
}

/// Invariant 6: a burst of N modified events inside the window collapses
/// to exactly one reconciliation.
#[test]
fn debouncer_collapses_bursts() {
    let mut debouncer = ChangeDebouncer::new(40);
    for _ in 0..100 {
        debouncer.record(FileChange::new("/p/hot.src", ChangeKind::Modified));
    }
    assert_eq!(debouncer.pending_count(), 1);
    assert!(debouncer.take_ready().is_empty());

    std::thread::sleep(Duration::from_millis(50));
    let ready = debouncer.take_ready();
    assert_eq!(ready.len(), 1);
    assert!(debouncer.take_ready().is_empty());
}

/// The registry round-trips symbols through every layer with the builtin
/// binding registry, no globals involved.
#[test]
fn binding_registry_is_explicit() {
    let registry = BindingRegistry::with_builtin();
    assert!(registry.get("plain").is_some());

    let mut custom = BindingRegistry::new();
    assert!(custom.get("plain").is_none());
    custom.register(registry.get("plain").unwrap());
    assert!(custom.get("plain").is_some());
}
