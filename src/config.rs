//! Configuration accepted by the engine facade.

use std::path::PathBuf;

/// Options for opening a gildash engine over a project root.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory to index. The store lives at `<root>/.gildash/gildash.db`.
    pub project_root: PathBuf,
    /// File extensions to include in discovery.
    pub extensions: Vec<String>,
    /// Glob patterns excluded from discovery (in addition to internal ignores).
    pub ignore_patterns: Vec<String>,
    /// Whether `run()` starts a filesystem watcher when this process owns the store.
    pub watch_mode: bool,
    /// Whether to attach an external type-checker bridge.
    pub semantic: bool,
    /// LRU capacity for parsed ASTs.
    pub parser_cache_capacity: usize,
    /// Ownership heartbeat staleness threshold in seconds.
    pub stale_after_seconds: i64,
    /// Owner heartbeat refresh period in seconds.
    pub heartbeat_interval_secs: u64,
    /// Reader ownership re-probe interval in seconds.
    pub reader_poll_interval_secs: u64,
    /// Watcher debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl EngineConfig {
    /// Build a config for the given root with all defaults.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let stale_after_seconds = 60;
        Self {
            project_root: project_root.into(),
            extensions: vec![".ts".into(), ".mts".into(), ".cts".into()],
            ignore_patterns: Vec::new(),
            watch_mode: false,
            semantic: false,
            parser_cache_capacity: 500,
            stale_after_seconds,
            // Heartbeat must stay strictly under half the stale window so a
            // live owner can never look stale to a prober.
            heartbeat_interval_secs: (stale_after_seconds / 4) as u64,
            reader_poll_interval_secs: stale_after_seconds as u64,
            debounce_ms: 50,
        }
    }

    /// Path of the embedded store for this root.
    pub fn db_path(&self) -> PathBuf {
        self.project_root.join(".gildash").join("gildash.db")
    }
}
