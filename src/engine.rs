//! Engine facade: wires the store, coordinator, graph cache, watcher, and
//! ownership protocol together behind one handle.
//!
//! A process opens the engine as owner or reader. Owners index and mutate;
//! readers serve queries from their own caches and keep probing for
//! promotion. `run()` is the blocking steady-state loop; everything else
//! is synchronous and single-threaded apart from the watcher and signal
//! threads.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{ChangeKind, EngineEvent, EventBus, Role};
use crate::graph::{CycleOptions, DependencyGraph, FanMetrics, GraphCache};
use crate::index::{IndexCoordinator, IndexReport};
use crate::store::{AcquireOutcome, AcquireParams, Store, SymbolRecord, SymbolStats};
use crate::watch::{FileSystemWatcher, WatcherMessage};

/// Opt-in bridge to an external type checker. The engine only notifies it
/// of committed file changes; everything else is the bridge's business.
pub trait SemanticBridge: Send {
    fn files_changed(&self, paths: &[String]);
}

/// Aggregate store statistics for the status surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub files: i64,
    pub relations: i64,
    pub symbols: SymbolStats,
    pub index_version: i64,
    pub role: String,
}

/// The code-intelligence engine over one project root.
pub struct Gildash {
    config: EngineConfig,
    store: Store,
    coordinator: IndexCoordinator,
    graph_cache: GraphCache,
    events: EventBus,
    role: Role,
    pid: i64,
    instance_id: Option<String>,
    closed: bool,
    shutdown: Arc<AtomicBool>,
    semantic: Option<Box<dyn SemanticBridge>>,
}

impl Gildash {
    /// Open the engine: open (and migrate) the store, then probe for
    /// ownership once. The role can change later via `run()`.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = Store::open(&config.db_path())?;
        let coordinator = IndexCoordinator::new(&config)?;

        let pid = std::process::id() as i64;
        // Only long-running watch processes carry an instance id: it is the
        // pid-recycling defense, and a prober carrying one displaces even a
        // live owner. One-shot opens must not do that.
        let instance_id = config.watch_mode.then(|| generate_instance_id(pid));

        let outcome = store.ownership().acquire(
            pid,
            &AcquireParams::new(config.stale_after_seconds, instance_id.as_deref()),
        )?;
        let role = match outcome {
            AcquireOutcome::Owner => Role::Owner,
            AcquireOutcome::Reader => Role::Reader,
        };
        debug!(pid, role = %role, "engine opened");
        if config.semantic {
            debug!("semantic option set; expecting attach_semantic_bridge() before run()");
        }

        Ok(Self {
            config,
            store,
            coordinator,
            graph_cache: GraphCache::default(),
            events: EventBus::new(),
            role,
            pid,
            instance_id,
            closed: false,
            shutdown: Arc::new(AtomicBool::new(false)),
            semantic: None,
        })
    }

    /// Register an event subscriber.
    pub fn on_event(&self, f: impl Fn(&EngineEvent) + Send + 'static) {
        self.events.subscribe(f);
    }

    /// Attach the opt-in type-checker bridge.
    pub fn attach_semantic_bridge(&mut self, bridge: Box<dyn SemanticBridge>) {
        self.semantic = Some(bridge);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    /// Handle that makes `run()` return; safe to clone into a signal
    /// handler or another thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    fn ensure_owner(&self) -> Result<()> {
        self.ensure_open()?;
        if self.role != Role::Owner {
            return Err(EngineError::Ownership(
                "this process is a reader; another coordinator owns the store".to_string(),
            ));
        }
        Ok(())
    }

    /// Run a full index. Owner only.
    pub fn full_index(&mut self) -> Result<IndexReport> {
        self.ensure_owner()?;
        let report = self.coordinator.full_index(&self.store)?;
        self.after_index(&report)?;
        Ok(report)
    }

    /// Run an incremental batch. Owner only.
    pub fn incremental(&mut self, paths: &[PathBuf]) -> Result<IndexReport> {
        self.ensure_owner()?;
        let report = self.coordinator.incremental(&self.store, paths)?;
        self.after_index(&report)?;
        Ok(report)
    }

    /// Post-commit bookkeeping: reconcile the graph cache and notify
    /// subscribers. Runs after the transaction, never before.
    fn after_index(&mut self, report: &IndexReport) -> Result<()> {
        if report.is_empty() {
            return Ok(());
        }

        self.graph_cache
            .patch(&self.store, &report.changed, &report.deleted)?;

        for path in &report.changed {
            let kind = if report.created.contains(path) {
                ChangeKind::Created
            } else {
                ChangeKind::Modified
            };
            self.events.emit(EngineEvent::FileChanged {
                path: path.clone(),
                kind,
            });
        }
        for path in &report.deleted {
            self.events.emit(EngineEvent::FileChanged {
                path: path.clone(),
                kind: ChangeKind::Deleted,
            });
        }
        self.events.emit(EngineEvent::Indexed {
            changed: report.changed.clone(),
            deleted: report.deleted.clone(),
        });

        if let Some(ref bridge) = self.semantic {
            bridge.files_changed(&report.changed);
        }
        Ok(())
    }

    /// Blocking steady-state loop: owners consume watcher batches and
    /// heartbeat; readers poll for promotion. Returns when the shutdown
    /// handle is set, releasing ownership on the way out.
    pub fn run(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.install_signal_handler();

        if self.is_owner() {
            let report = self.full_index()?;
            self.emit_failures(&report);
        }

        let mut watcher = if self.is_owner() && self.config.watch_mode {
            Some(self.spawn_watcher()?)
        } else {
            None
        };

        let heartbeat_every = Duration::from_secs(self.config.heartbeat_interval_secs.max(1));
        let probe_every = Duration::from_secs(self.config.reader_poll_interval_secs.max(1));
        let mut last_heartbeat = Instant::now();
        let mut last_probe = Instant::now();

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.role {
                Role::Owner => {
                    if last_heartbeat.elapsed() >= heartbeat_every {
                        last_heartbeat = Instant::now();
                        if !self.refresh_heartbeat()? {
                            // Lost the row; downgrade and re-probe later.
                            watcher = None;
                            last_probe = Instant::now();
                            continue;
                        }
                    }

                    let Some(w) = watcher.as_ref() else {
                        std::thread::sleep(Duration::from_millis(200));
                        continue;
                    };
                    match w.recv_timeout(Duration::from_millis(200)) {
                        Ok(Some(WatcherMessage::Batch(batch))) => {
                            let report = self.incremental(&batch.paths)?;
                            self.emit_failures(&report);
                        }
                        Ok(Some(WatcherMessage::Malfunction(message))) => {
                            self.events.emit(EngineEvent::Error(format!(
                                "watcher malfunction: {message}"
                            )));
                            watcher = Some(self.spawn_watcher()?);
                        }
                        Ok(None) => {
                            self.events.emit(EngineEvent::Error(
                                "watcher thread terminated; restarting".to_string(),
                            ));
                            watcher = Some(self.spawn_watcher()?);
                        }
                        Err(()) => {}
                    }
                }
                Role::Reader => {
                    if last_probe.elapsed() >= probe_every {
                        last_probe = Instant::now();
                        if self.try_promote()? {
                            let report = self.full_index()?;
                            self.emit_failures(&report);
                            if self.config.watch_mode {
                                watcher = Some(self.spawn_watcher()?);
                            }
                            last_heartbeat = Instant::now();
                            continue;
                        }
                    }
                    std::thread::sleep(Duration::from_millis(200));
                }
            }
        }

        self.close()
    }

    fn spawn_watcher(&self) -> Result<FileSystemWatcher> {
        FileSystemWatcher::new(
            self.coordinator.root().to_path_buf(),
            Duration::from_millis(self.config.debounce_ms),
            &self.config.extensions,
            &self.config.ignore_patterns,
            self.shutdown.clone(),
        )
    }

    fn install_signal_handler(&self) {
        #[cfg(unix)]
        {
            use signal_hook::consts::signal;
            use signal_hook::iterator::Signals;

            let shutdown = self.shutdown.clone();
            match Signals::new([signal::SIGTERM, signal::SIGINT]) {
                Ok(mut signals) => {
                    std::thread::spawn(move || {
                        if signals.forever().next().is_some() {
                            shutdown.store(true, Ordering::SeqCst);
                        }
                    });
                }
                Err(err) => warn!("failed to install signal handler: {err}"),
            }
        }
    }

    /// Refresh the heartbeat; on failure report, downgrade to reader, and
    /// keep going. Never crashes the loop.
    fn refresh_heartbeat(&mut self) -> Result<bool> {
        match self
            .store
            .ownership()
            .update_heartbeat(self.pid, chrono::Utc::now())
        {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.events.emit(EngineEvent::Error(
                    "ownership row lost; downgrading to reader".to_string(),
                ));
                self.set_role(Role::Reader);
                Ok(false)
            }
            Err(err) => {
                self.events
                    .emit(EngineEvent::Error(format!("heartbeat failed: {err}")));
                self.set_role(Role::Reader);
                Ok(false)
            }
        }
    }

    /// Reader-side probe; promotes when `acquire` grants ownership.
    fn try_promote(&mut self) -> Result<bool> {
        let outcome = self.store.ownership().acquire(
            self.pid,
            &AcquireParams::new(self.config.stale_after_seconds, self.instance_id.as_deref()),
        );
        match outcome {
            Ok(AcquireOutcome::Owner) => {
                self.set_role(Role::Owner);
                Ok(true)
            }
            Ok(AcquireOutcome::Reader) => Ok(false),
            Err(err) => {
                self.events
                    .emit(EngineEvent::Error(format!("ownership probe failed: {err}")));
                Ok(false)
            }
        }
    }

    fn set_role(&mut self, role: Role) {
        if self.role != role {
            self.role = role;
            self.events.emit(EngineEvent::RoleChanged(role));
        }
    }

    fn emit_failures(&self, report: &IndexReport) {
        for failure in &report.failures {
            self.events.emit(EngineEvent::Error(format!(
                "{} failure on {}: {}",
                failure.stage, failure.path, failure.message
            )));
        }
    }

    // ------------------------------------------------------------------
    // Query surface
    // ------------------------------------------------------------------

    pub fn symbols_in_file(&self, project: &str, file_path: &str) -> Result<Vec<SymbolRecord>> {
        self.ensure_open()?;
        self.store.symbols().get_file_symbols(project, file_path)
    }

    pub fn search_symbols(
        &self,
        prefix: &str,
        kind: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<SymbolRecord>> {
        self.ensure_open()?;
        self.store.symbols().search_by_prefix(prefix, kind, project)
    }

    pub fn search_symbols_exact(
        &self,
        name: &str,
        kind: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<SymbolRecord>> {
        self.ensure_open()?;
        self.store.symbols().search_exact(name, kind, project)
    }

    pub fn dependencies(&mut self, project: Option<&str>, file: &str, limit: Option<usize>) -> Result<Vec<String>> {
        Ok(self.graph(project)?.dependencies(file, limit))
    }

    pub fn dependents(&mut self, project: Option<&str>, file: &str, limit: Option<usize>) -> Result<Vec<String>> {
        Ok(self.graph(project)?.dependents(file, limit))
    }

    pub fn affected(&mut self, project: Option<&str>, changed: &[String]) -> Result<Vec<String>> {
        Ok(self.graph(project)?.affected(changed).into_iter().collect())
    }

    pub fn has_cycle(&mut self, project: Option<&str>) -> Result<bool> {
        Ok(self.graph(project)?.has_cycle())
    }

    pub fn cycle_paths(&mut self, project: Option<&str>, opts: CycleOptions) -> Result<Vec<Vec<String>>> {
        Ok(self.graph(project)?.cycle_paths(opts))
    }

    pub fn fan_metrics(&mut self, project: Option<&str>, file: &str) -> Result<FanMetrics> {
        Ok(self.graph(project)?.fan_metrics(file))
    }

    pub fn transitive_dependencies(&mut self, project: Option<&str>, file: &str) -> Result<Vec<String>> {
        Ok(self
            .graph(project)?
            .transitive_dependencies(file)
            .into_iter()
            .collect())
    }

    pub fn transitive_dependents(&mut self, project: Option<&str>, file: &str) -> Result<Vec<String>> {
        Ok(self
            .graph(project)?
            .transitive_dependents(file)
            .into_iter()
            .collect())
    }

    /// The cached dependency graph for a scope. Owners trust cache
    /// invalidation on `indexed`; readers re-check TTL and index version.
    fn graph(&mut self, project: Option<&str>) -> Result<&DependencyGraph> {
        self.ensure_open()?;
        match self.role {
            Role::Owner => self.graph_cache.get_or_build(&self.store, project),
            Role::Reader => self.graph_cache.get_or_build_checked(&self.store, project),
        }
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.ensure_open()?;
        Ok(EngineStats {
            files: self.store.files().count()?,
            relations: self.store.relations().count()?,
            symbols: self.store.symbols().stats()?,
            index_version: self.store.index_version()?,
            role: self.role.to_string(),
        })
    }

    /// Release ownership and mark the engine closed. Idempotent: a second
    /// close is observationally a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.shutdown.store(true, Ordering::SeqCst);
        if self.role == Role::Owner {
            if let Err(err) = self.store.ownership().release(self.pid) {
                warn!("failed to release ownership on close: {err}");
            }
        }
        self.closed = true;
        Ok(())
    }
}

impl Drop for Gildash {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Opaque per-process identifier: hash of pid and open time. Distinguishes
/// a recycled pid from the process that recorded it.
fn generate_instance_id(pid: i64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(pid.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_distinct() {
        let a = generate_instance_id(1);
        let b = generate_instance_id(1);
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }
}
