//! Error taxonomy for the engine.
//!
//! Every public operation returns `Result<T, EngineError>`. The variants map
//! one-to-one onto the recovery dispositions the engine implements: `Closed`
//! and `StoreIntegrity` fail fast, `StoreBusy` is retried a bounded number of
//! times before surfacing, `Parse` and `Io` stay inside a batch as per-file
//! failures, `Watcher` and `Ownership` are reported and survived.

use std::path::PathBuf;

/// Unified error type for gildash.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operation attempted on a coordinator that has been shut down.
    #[error("engine is closed")]
    Closed,

    /// The external parser rejected a file.
    #[error("parse failure in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Write-lock contention that persisted through the retry budget.
    #[error("store busy after {attempts} attempts: {message}")]
    StoreBusy { attempts: u32, message: String },

    /// Referential-integrity violation detected at open time.
    #[error("store integrity violation: {0}")]
    StoreIntegrity(String),

    /// Any other storage failure.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem-watcher malfunction.
    #[error("watcher error: {0}")]
    Watcher(String),

    /// Ownership row could not be acquired or refreshed.
    #[error("ownership error: {0}")]
    Ownership(String),

    /// File read failure during an indexing pass.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration handed to the facade.
    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether this error is a transient write-lock contention that the
    /// caller may retry.
    pub fn is_busy(&self) -> bool {
        matches!(self, EngineError::StoreBusy { .. })
    }

    /// Classify a rusqlite error, mapping lock contention onto `StoreBusy`
    /// so the retry loop can recognize it.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        if is_busy_sqlite(&err) {
            EngineError::StoreBusy {
                attempts: 1,
                message: err.to_string(),
            }
        } else {
            EngineError::Store(err.to_string())
        }
    }
}

/// True when a rusqlite error is SQLITE_BUSY or SQLITE_LOCKED.
pub fn is_busy_sqlite(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::from_sqlite(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(format!("json: {err}"))
    }
}

/// Crate-wide result alias.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
