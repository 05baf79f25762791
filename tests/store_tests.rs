//! Store-level behavior: open sequence, integrity enforcement, busy
//! retries, and the index-version counter.

use gildash::store::Store;
use gildash::EngineError;
use tempfile::TempDir;

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join(".gildash/gildash.db")
}

#[test]
fn open_creates_store_directory_and_wal() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&db_path(&dir)).unwrap();
    drop(store);

    assert!(db_path(&dir).exists());
}

#[test]
fn integrity_violation_aborts_open() {
    let dir = TempDir::new().unwrap();
    drop(Store::open(&db_path(&dir)).unwrap());

    // Corrupt the store behind the engine's back: an orphan relation row
    // written with enforcement off.
    let conn = rusqlite::Connection::open(db_path(&dir)).unwrap();
    conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
    conn.execute(
        "INSERT INTO relations
             (project, type, src_file_path, src_symbol_name,
              dst_project, dst_file_path, dst_symbol_name, meta_json)
         VALUES ('app', 'imports', 'ghost.ts', NULL, 'app', 'also-ghost.ts', NULL, NULL)",
        [],
    )
    .unwrap();
    drop(conn);

    let err = Store::open(&db_path(&dir)).unwrap_err();
    assert!(matches!(err, EngineError::StoreIntegrity(_)), "got: {err}");
}

#[test]
fn busy_retries_are_bounded() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&db_path(&dir)).unwrap();

    let mut attempts = 0;
    let result: Result<(), _> = store.retry_on_busy(|| {
        attempts += 1;
        Err(EngineError::StoreBusy {
            attempts: 1,
            message: "database is locked".to_string(),
        })
    });

    assert_eq!(attempts, 5);
    match result.unwrap_err() {
        EngineError::StoreBusy { attempts, .. } => assert_eq!(attempts, 5),
        other => panic!("expected StoreBusy, got {other}"),
    }
}

#[test]
fn busy_retry_returns_first_success() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&db_path(&dir)).unwrap();

    let mut attempts = 0;
    let value = store
        .retry_on_busy(|| {
            attempts += 1;
            if attempts < 3 {
                Err(EngineError::StoreBusy {
                    attempts: 1,
                    message: "database is locked".to_string(),
                })
            } else {
                Ok(attempts)
            }
        })
        .unwrap();
    assert_eq!(value, 3);
}

#[test]
fn non_busy_errors_are_not_retried() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&db_path(&dir)).unwrap();

    let mut attempts = 0;
    let result: Result<(), _> = store.retry_on_busy(|| {
        attempts += 1;
        Err(EngineError::Store("schema mismatch".to_string()))
    });
    assert_eq!(attempts, 1);
    assert!(matches!(result.unwrap_err(), EngineError::Store(_)));
}

#[test]
fn index_version_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(&db_path(&dir)).unwrap();
        store.bump_index_version().unwrap();
        store.bump_index_version().unwrap();
    }

    let store = Store::open(&db_path(&dir)).unwrap();
    assert_eq!(store.index_version().unwrap(), 2);
}

#[test]
fn two_connections_see_each_others_commits() {
    let dir = TempDir::new().unwrap();
    let store_a = Store::open(&db_path(&dir)).unwrap();
    let store_b = Store::open(&db_path(&dir)).unwrap();

    store_a
        .files()
        .upsert(&gildash::FileRecord {
            project: "app".into(),
            file_path: "a.ts".into(),
            mtime_ms: 0,
            size: 0,
            content_hash: "h".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            line_count: None,
        })
        .unwrap();

    assert_eq!(store_b.files().count().unwrap(), 1);
}
