//! Row types and schema migrations for the embedded store.
//!
//! Migrations run with foreign keys disabled (they may rebuild tables with
//! changed FK shape); the open sequence re-enables enforcement and verifies
//! integrity afterwards. Each migration is applied at most once, tracked in
//! `schema_version`.

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// An indexed source file. Primary key: (project, file_path).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    pub project: String,
    pub file_path: String,
    pub mtime_ms: i64,
    pub size: i64,
    pub content_hash: String,
    pub updated_at: String,
    pub line_count: Option<i64>,
}

/// A named declaration within a file. Members of classes, interfaces, and
/// enums are flattened into their own rows with dotted names.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SymbolRecord {
    pub id: i64,
    pub project: String,
    pub file_path: String,
    pub name: String,
    pub kind: String,
    pub span_start: i64,
    pub span_end: i64,
    pub is_exported: bool,
    pub signature: Option<String>,
    pub fingerprint: String,
    pub detail_json: Option<String>,
}

/// A directed edge from (source file, optional source symbol) to
/// (destination project, destination file, optional destination symbol).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RelationRecord {
    pub id: i64,
    pub project: String,
    pub rtype: String,
    pub src_file_path: String,
    pub src_symbol_name: Option<String>,
    pub dst_project: String,
    pub dst_file_path: String,
    pub dst_symbol_name: Option<String>,
    pub meta_json: Option<String>,
}

/// The singleton watcher-ownership row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRow {
    pub pid: i64,
    pub heartbeat_at: String,
    pub instance_id: Option<String>,
}

struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial schema",
    sql: r#"
CREATE TABLE IF NOT EXISTS files (
    project       TEXT NOT NULL,
    file_path     TEXT NOT NULL,
    mtime_ms      INTEGER NOT NULL,
    size          INTEGER NOT NULL,
    content_hash  TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    line_count    INTEGER,
    PRIMARY KEY (project, file_path)
);

CREATE TABLE IF NOT EXISTS symbols (
    id           INTEGER PRIMARY KEY,
    project      TEXT NOT NULL,
    file_path    TEXT NOT NULL,
    name         TEXT NOT NULL,
    kind         TEXT NOT NULL,
    span_start   INTEGER NOT NULL,
    span_end     INTEGER NOT NULL,
    is_exported  INTEGER NOT NULL DEFAULT 0,
    signature    TEXT,
    fingerprint  TEXT NOT NULL,
    detail_json  TEXT,
    FOREIGN KEY (project, file_path) REFERENCES files(project, file_path) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(project, file_path);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

-- Content hash the symbol rows of a file were computed from. Lets
-- replace_file_symbols elide work when content is unchanged.
CREATE TABLE IF NOT EXISTS symbol_state (
    project       TEXT NOT NULL,
    file_path     TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    PRIMARY KEY (project, file_path),
    FOREIGN KEY (project, file_path) REFERENCES files(project, file_path) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS relations (
    id               INTEGER PRIMARY KEY,
    project          TEXT NOT NULL,
    type             TEXT NOT NULL,
    src_file_path    TEXT NOT NULL,
    src_symbol_name  TEXT,
    dst_project      TEXT NOT NULL,
    dst_file_path    TEXT NOT NULL,
    dst_symbol_name  TEXT,
    meta_json        TEXT,
    FOREIGN KEY (project, src_file_path) REFERENCES files(project, file_path) ON DELETE CASCADE,
    FOREIGN KEY (dst_project, dst_file_path) REFERENCES files(project, file_path) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_relations_src ON relations(project, src_file_path);
CREATE INDEX IF NOT EXISTS idx_relations_dst ON relations(dst_project, dst_file_path);
CREATE INDEX IF NOT EXISTS idx_relations_type ON relations(project, type);

CREATE TABLE IF NOT EXISTS watcher_owner (
    pid          INTEGER NOT NULL,
    heartbeat_at TEXT NOT NULL,
    instance_id  TEXT
);

CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
    name, file_path, kind,
    content='symbols', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS symbols_fts_insert AFTER INSERT ON symbols BEGIN
    INSERT INTO symbols_fts(rowid, name, file_path, kind)
    VALUES (new.id, new.name, new.file_path, new.kind);
END;

CREATE TRIGGER IF NOT EXISTS symbols_fts_delete AFTER DELETE ON symbols BEGIN
    INSERT INTO symbols_fts(symbols_fts, rowid, name, file_path, kind)
    VALUES ('delete', old.id, old.name, old.file_path, old.kind);
END;

CREATE TRIGGER IF NOT EXISTS symbols_fts_update AFTER UPDATE ON symbols BEGIN
    INSERT INTO symbols_fts(symbols_fts, rowid, name, file_path, kind)
    VALUES ('delete', old.id, old.name, old.file_path, old.kind);
    INSERT INTO symbols_fts(rowid, name, file_path, kind)
    VALUES (new.id, new.name, new.file_path, new.kind);
END;
"#,
}];

/// Run all pending migrations on the given connection.
///
/// The caller must have foreign keys disabled; see [`crate::store::Store::open`].
pub(crate) fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  TEXT NOT NULL
        );",
    )?;

    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version > current {
            debug!(
                version = migration.version,
                "applying migration: {}", migration.description
            );
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
        }
    }

    Ok(())
}
