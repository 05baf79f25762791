//! The embedded relational store.
//!
//! One SQLite database holds files, symbols, relations, and the watcher
//! ownership row. Writers are serialized by the store's write lock plus the
//! ownership protocol; within a process all mutation happens inside the
//! transaction wrappers here.
//!
//! Open sequence: enable WAL → disable FK → run migrations → verify
//! referential integrity → enable FK. Any integrity violation aborts open.

mod files;
mod ownership;
mod relations;
mod schema;
mod symbols;

pub use files::FileRepo;
pub use ownership::{AcquireOutcome, AcquireParams, OwnershipRepo};
pub use relations::{RelationFilter, RelationRepo};
pub use schema::{FileRecord, OwnerRow, RelationRecord, SymbolRecord};
pub use symbols::{SymbolRepo, SymbolStats};

use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::warn;

use crate::error::{EngineError, Result};

/// Busy timeout handed to SQLite for each lock wait.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded number of attempts for operations that hit a busy store.
const BUSY_RETRIES: u32 = 5;

/// Handle to the embedded store. Not `Sync`; one coordinator thread owns it.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    txn_depth: Cell<u32>,
}

impl Store {
    /// Open (creating if necessary) the store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(db_path)?;
        Self::initialize(conn)
    }

    /// Open an in-memory store (tests only; same open sequence).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        // journal_mode returns a row; query it rather than pragma_update.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Migrations may rebuild tables with changed FK shape, so the
        // window runs unenforced and is checked afterwards.
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        schema::run_migrations(&conn)?;

        let violations = Self::foreign_key_violations(&conn)?;
        if !violations.is_empty() {
            return Err(EngineError::StoreIntegrity(format!(
                "{} foreign-key violation(s) after migration, first: {}",
                violations.len(),
                violations[0]
            )));
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn,
            txn_depth: Cell::new(0),
        })
    }

    fn foreign_key_violations(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: Option<i64> = row.get(1)?;
            let parent: String = row.get(2)?;
            Ok(format!("{table} rowid {rowid:?} -> {parent}"))
        })?;
        let mut violations = Vec::new();
        for row in rows {
            violations.push(row?);
        }
        Ok(violations)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn files(&self) -> FileRepo<'_> {
        FileRepo::new(self)
    }

    pub fn symbols(&self) -> SymbolRepo<'_> {
        SymbolRepo::new(self)
    }

    pub fn relations(&self) -> RelationRepo<'_> {
        RelationRepo::new(self)
    }

    pub fn ownership(&self) -> OwnershipRepo<'_> {
        OwnershipRepo::new(self)
    }

    /// Run `f` inside a deferred transaction. Nested calls are no-ops for
    /// the inner level: the work joins the outer transaction.
    pub fn transaction<T>(&self, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        self.run_transaction("BEGIN DEFERRED", f)
    }

    /// Run `f` inside an immediate transaction, reserving the write lock up
    /// front. Nested calls behave like [`Store::transaction`].
    pub fn immediate_transaction<T>(&self, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        self.run_transaction("BEGIN IMMEDIATE", f)
    }

    fn run_transaction<T>(&self, begin: &str, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        if self.txn_depth.get() > 0 {
            self.txn_depth.set(self.txn_depth.get() + 1);
            let result = f(self);
            self.txn_depth.set(self.txn_depth.get() - 1);
            return result;
        }

        self.retry_on_busy(|| self.conn.execute_batch(begin).map_err(EngineError::from))?;
        self.txn_depth.set(1);

        let result = f(self);
        self.txn_depth.set(0);

        match result {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    warn!("rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Retry `f` on busy errors up to the bounded attempt budget; SQLite's
    /// own busy timeout governs each individual wait.
    pub fn retry_on_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_message = String::new();
        for _attempt in 0..BUSY_RETRIES {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_busy() => {
                    last_message = err.to_string();
                }
                Err(err) => return Err(err),
            }
        }
        Err(EngineError::StoreBusy {
            attempts: BUSY_RETRIES,
            message: last_message,
        })
    }

    /// Current index-version counter. Bumped inside every index transaction;
    /// readers compare it to decide cache freshness.
    pub fn index_version(&self) -> Result<i64> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'index_version'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Advance the index-version counter, returning the new value.
    pub fn bump_index_version(&self) -> Result<i64> {
        let next = self.index_version()? + 1;
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES ('index_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![next.to_string()],
        )?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_applies_schema_and_enables_fk() {
        let store = Store::open_in_memory().unwrap();
        let fk: i64 = store
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);

        let tables: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('files','symbols','relations','watcher_owner','meta','symbol_state')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn open_is_idempotent_on_existing_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join(".gildash/gildash.db");
        drop(Store::open(&db_path).unwrap());
        drop(Store::open(&db_path).unwrap());
    }

    #[test]
    fn nested_transaction_is_noop_for_inner() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|outer| {
                outer.conn().execute(
                    "INSERT INTO meta (key, value) VALUES ('a', '1')",
                    [],
                )?;
                outer.transaction(|inner| {
                    inner.conn().execute(
                        "INSERT INTO meta (key, value) VALUES ('b', '2')",
                        [],
                    )?;
                    Ok(())
                })
            })
            .unwrap();

        let count: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM meta WHERE key IN ('a','b')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.transaction(|s| {
            s.conn()
                .execute("INSERT INTO meta (key, value) VALUES ('x', '1')", [])?;
            Err(EngineError::Store("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM meta WHERE key = 'x'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn index_version_counter_advances() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.index_version().unwrap(), 0);
        assert_eq!(store.bump_index_version().unwrap(), 1);
        assert_eq!(store.bump_index_version().unwrap(), 2);
        assert_eq!(store.index_version().unwrap(), 2);
    }
}
