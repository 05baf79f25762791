//! End-to-end indexing scenarios against fresh temporary project roots.

use std::path::PathBuf;

use gildash::{EngineConfig, Gildash};
use tempfile::TempDir;

fn write(root: &TempDir, rel: &str, content: &str) -> PathBuf {
    let path = root.path().join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn open(root: &TempDir) -> Gildash {
    Gildash::open(EngineConfig::new(root.path())).unwrap()
}

#[test]
fn clean_index_produces_files_symbols_and_relations() {
    let root = TempDir::new().unwrap();
    write(&root, "a.ts", "export const A = 1;");
    write(&root, "b.ts", "import { A } from './a';\nexport const B = A + 1;");

    let mut engine = open(&root);
    let report = engine.full_index().unwrap();

    assert_eq!(report.files_seen, 2);
    assert_eq!(report.changed, vec!["a.ts", "b.ts"]);
    assert!(report.failures.is_empty());

    let a_symbols = engine.symbols_in_file("root", "a.ts").unwrap();
    assert_eq!(a_symbols.len(), 1);
    assert_eq!(a_symbols[0].name, "A");
    assert!(a_symbols[0].is_exported);

    let b_symbols = engine.symbols_in_file("root", "b.ts").unwrap();
    assert!(b_symbols.iter().any(|s| s.name == "B"));

    let deps = engine.dependencies(None, "b.ts", None).unwrap();
    assert_eq!(deps, vec!["a.ts"]);
}

#[test]
fn relation_rows_satisfy_foreign_keys() {
    let root = TempDir::new().unwrap();
    write(&root, "a.ts", "export const A = 1;");
    write(&root, "b.ts", "import { A } from './a';");

    let mut engine = open(&root);
    engine.full_index().unwrap();
    engine.close().unwrap();

    // Re-open: the open sequence runs a foreign-key integrity check and
    // aborts on any violation.
    let engine = open(&root);
    let stats = engine.stats().unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.relations, 1);
}

#[test]
fn barrel_import_resolves_to_directory_index() {
    let root = TempDir::new().unwrap();
    write(&root, "store/index.ts", "export const X = 1;");
    write(&root, "main.ts", "import { X } from './store';");

    let mut engine = open(&root);
    engine.full_index().unwrap();

    let deps = engine.dependencies(None, "main.ts", None).unwrap();
    assert_eq!(deps, vec!["store/index.ts"]);
}

#[test]
fn unresolved_import_is_filtered_not_inserted() {
    let root = TempDir::new().unwrap();
    write(&root, "config.json", "{\"x\": 1}");
    write(&root, "main.ts", "import data from './config.json';");

    let mut engine = open(&root);
    let report = engine.full_index().unwrap();

    // JSON is not indexed; the known-file filter drops the relation and no
    // foreign-key violation can occur.
    assert_eq!(report.files_seen, 1);
    assert_eq!(engine.stats().unwrap().relations, 0);
}

#[test]
fn reindex_with_unchanged_content_changes_nothing() {
    let root = TempDir::new().unwrap();
    write(&root, "a.ts", "export const A = 1;");

    let mut engine = open(&root);
    engine.full_index().unwrap();
    let before = engine.symbols_in_file("root", "a.ts").unwrap();

    let report = engine.full_index().unwrap();
    assert!(report.changed.is_empty());
    assert!(report.is_empty());

    let after = engine.symbols_in_file("root", "a.ts").unwrap();
    assert_eq!(before, after, "symbol rows (including ids) must be stable");
}

#[test]
fn cycle_detection_end_to_end() {
    let root = TempDir::new().unwrap();
    write(&root, "a.ts", "import { B } from './b';\nexport const A = 1;");
    write(&root, "b.ts", "import { C } from './c';\nexport const B = 2;");
    write(&root, "c.ts", "import { A } from './a';\nexport const C = 3;");

    let mut engine = open(&root);
    engine.full_index().unwrap();

    assert!(engine.has_cycle(None).unwrap());
    let cycles = engine.cycle_paths(None, Default::default()).unwrap();
    assert!(!cycles.is_empty());
    let cycle = &cycles[0];
    assert_eq!(cycle.len(), 3);
    for member in ["a.ts", "b.ts", "c.ts"] {
        assert!(cycle.iter().any(|f| f == member), "missing {member}");
    }
}

#[test]
fn incremental_batch_with_mutually_referencing_new_files() {
    let root = TempDir::new().unwrap();
    write(&root, "seed.ts", "export const SEED = 0;");

    let mut engine = open(&root);
    engine.full_index().unwrap();

    // Two new files appear at once, each importing the other. The two-pass
    // structure upserts both file rows before either relation row.
    let x = write(&root, "x.ts", "import { Y } from './y';\nexport const X = 1;");
    let y = write(&root, "y.ts", "import { X } from './x';\nexport const Y = 2;");

    let report = engine.incremental(&[x, y]).unwrap();
    assert_eq!(report.changed, vec!["x.ts", "y.ts"]);
    assert_eq!(report.created, vec!["x.ts", "y.ts"]);

    assert_eq!(engine.dependencies(None, "x.ts", None).unwrap(), vec!["y.ts"]);
    assert_eq!(engine.dependencies(None, "y.ts", None).unwrap(), vec!["x.ts"]);
}

#[test]
fn incremental_delete_cascades() {
    let root = TempDir::new().unwrap();
    let a = write(&root, "a.ts", "export const A = 1;");
    write(&root, "b.ts", "import { A } from './a';");

    let mut engine = open(&root);
    engine.full_index().unwrap();
    assert_eq!(engine.stats().unwrap().relations, 1);

    std::fs::remove_file(&a).unwrap();
    let report = engine.incremental(&[a]).unwrap();
    assert_eq!(report.deleted, vec!["a.ts"]);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.files, 1);
    // The relation from b.ts died with its destination.
    assert_eq!(stats.relations, 0);
    assert!(engine.dependencies(None, "b.ts", None).unwrap().is_empty());
}

#[test]
fn empty_change_set_produces_no_writes() {
    let root = TempDir::new().unwrap();
    write(&root, "a.ts", "export const A = 1;");

    let mut engine = open(&root);
    engine.full_index().unwrap();
    let version_before = engine.stats().unwrap().index_version;

    let report = engine.incremental(&[]).unwrap();
    assert!(report.is_empty());
    assert_eq!(engine.stats().unwrap().index_version, version_before);
}

#[test]
fn modified_content_is_reindexed() {
    let root = TempDir::new().unwrap();
    let a = write(&root, "a.ts", "export const A = 1;");

    let mut engine = open(&root);
    engine.full_index().unwrap();

    write(&root, "a.ts", "export const A = 1;\nexport function go() {}");
    let report = engine.incremental(&[a]).unwrap();
    assert_eq!(report.changed, vec!["a.ts"]);
    assert!(report.created.is_empty());

    let symbols = engine.symbols_in_file("root", "a.ts").unwrap();
    assert!(symbols.iter().any(|s| s.name == "go" && s.kind == "function"));
}

#[test]
fn renamed_export_retargets_incoming_relations() {
    let root = TempDir::new().unwrap();
    let a = write(&root, "a.ts", "export function helper(x: number) {}");
    write(
        &root,
        "b.ts",
        "import { helper } from './a';\nexport function use() { helper(1); }",
    );

    let mut engine = open(&root);
    engine.full_index().unwrap();

    // Rename helper → assist, same kind and signature.
    write(&root, "a.ts", "export function assist(x: number) {}");
    engine.incremental(&[a]).unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.files, 2);

    let exact = engine
        .search_symbols_exact("assist", Some("function"), None)
        .unwrap();
    assert_eq!(exact.len(), 1);

    // b.ts still depends on a.ts; its stale binding followed the rename.
    assert_eq!(engine.dependencies(None, "b.ts", None).unwrap(), vec!["a.ts"]);
}

#[test]
fn symbol_search_via_fts() {
    let root = TempDir::new().unwrap();
    write(
        &root,
        "api.ts",
        "export function fetchUser() {}\nexport function fetchPost() {}\nexport class Cache {}",
    );

    let mut engine = open(&root);
    engine.full_index().unwrap();

    let hits = engine.search_symbols("fetch", None, None).unwrap();
    assert_eq!(hits.len(), 2);

    let hits = engine
        .search_symbols("fetch", Some("function"), Some("root"))
        .unwrap();
    assert_eq!(hits.len(), 2);

    let hits = engine.search_symbols("Cac", None, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Cache");
}

#[test]
fn multi_project_boundaries_assign_destinations() {
    let root = TempDir::new().unwrap();
    write(&root, "package.json", r#"{"name": "workspace"}"#);
    write(&root, "packages/lib/package.json", r#"{"name": "lib"}"#);
    write(&root, "packages/lib/util.ts", "export const U = 1;");
    write(
        &root,
        "main.ts",
        "import { U } from './packages/lib/util';\nexport const M = U;",
    );

    let mut engine = open(&root);
    let report = engine.full_index().unwrap();
    assert!(report.projects.contains(&"workspace".to_string()));
    assert!(report.projects.contains(&"lib".to_string()));

    let symbols = engine.symbols_in_file("lib", "packages/lib/util.ts").unwrap();
    assert_eq!(symbols.len(), 1);

    let deps = engine.dependencies(None, "main.ts", None).unwrap();
    assert_eq!(deps, vec!["packages/lib/util.ts"]);
}

#[test]
fn closed_engine_fails_fast() {
    let root = TempDir::new().unwrap();
    write(&root, "a.ts", "export const A = 1;");

    let mut engine = open(&root);
    engine.full_index().unwrap();
    engine.close().unwrap();
    // Second close is a no-op.
    engine.close().unwrap();

    let err = engine.full_index().unwrap_err();
    assert!(matches!(err, gildash::EngineError::Closed));
    assert!(engine.stats().is_err());
}

#[test]
fn indexed_event_fires_with_change_sets() {
    use std::sync::{Arc, Mutex};

    let root = TempDir::new().unwrap();
    write(&root, "a.ts", "export const A = 1;");

    let mut engine = open(&root);
    let seen: Arc<Mutex<Vec<(Vec<String>, Vec<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    engine.on_event(move |event| {
        if let gildash::EngineEvent::Indexed { changed, deleted } = event {
            seen_clone
                .lock()
                .unwrap()
                .push((changed.clone(), deleted.clone()));
        }
    });

    engine.full_index().unwrap();

    let events = seen.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, vec!["a.ts"]);
    assert!(events[0].1.is_empty());
}
