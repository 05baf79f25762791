//! Filesystem watcher with debounced batch events.
//!
//! All events inside a debounce window are coalesced per path,
//! de-duplicated, sorted lexicographically, and emitted as one batch, so
//! the same final store state results regardless of event arrival order.
//! Watcher malfunctions are forwarded on the same channel; they are never
//! swallowed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::filter::FileFilter;
use crate::validation::is_within_root;

/// Deterministic batch of dirty file paths, in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherBatch {
    pub paths: Vec<PathBuf>,
}

impl WatcherBatch {
    fn from_set(paths: BTreeSet<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Message from the watcher thread: a batch of dirty paths, or a
/// malfunction the owner loop must report and react to.
#[derive(Debug, Clone)]
pub enum WatcherMessage {
    Batch(WatcherBatch),
    Malfunction(String),
}

/// Filesystem watcher emitting debounced, filtered batches.
pub struct FileSystemWatcher {
    _watcher_thread: thread::JoinHandle<()>,
    receiver: Receiver<WatcherMessage>,
}

impl FileSystemWatcher {
    /// Watch `root` recursively, coalescing events over `debounce`.
    pub fn new(
        root: PathBuf,
        debounce: Duration,
        extensions: &[String],
        ignore_patterns: &[String],
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let filter = FileFilter::new(&root, extensions, ignore_patterns)?;

        let thread = thread::spawn(move || {
            if let Err(err) = run_watcher(root, debounce, filter, tx.clone(), shutdown) {
                let _ = tx.send(WatcherMessage::Malfunction(err.to_string()));
            }
        });

        Ok(Self {
            _watcher_thread: thread,
            receiver: rx,
        })
    }

    /// Receive the next message, waiting up to `timeout`.
    ///
    /// `Ok(None)` means the watcher thread terminated.
    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Option<WatcherMessage>, ()> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(()),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    /// Drain a message without blocking.
    pub fn try_recv(&self) -> Option<WatcherMessage> {
        self.receiver.try_recv().ok()
    }
}

fn run_watcher(
    root: PathBuf,
    debounce: Duration,
    filter: FileFilter,
    tx: Sender<WatcherMessage>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let event_root = root.clone();
    let event_tx = tx.clone();

    let mut debouncer = new_debouncer(
        debounce,
        move |result: notify_debouncer_mini::DebounceEventResult| match result {
            Ok(events) => {
                let dirty = extract_dirty_paths(&events, &event_root, &filter);
                if !dirty.is_empty() {
                    let _ = event_tx.send(WatcherMessage::Batch(WatcherBatch::from_set(dirty)));
                }
            }
            Err(error) => {
                let _ = event_tx.send(WatcherMessage::Malfunction(error.to_string()));
            }
        },
    )
    .map_err(|e| EngineError::Watcher(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| EngineError::Watcher(e.to_string()))?;

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    Ok(())
}

/// Collect dirty paths from one debouncer flush. Directories, store
/// artifacts, filtered files, and paths escaping the root are dropped.
fn extract_dirty_paths(
    events: &[notify_debouncer_mini::DebouncedEvent],
    root: &Path,
    filter: &FileFilter,
) -> BTreeSet<PathBuf> {
    let mut dirty = BTreeSet::new();

    for event in events {
        let path = &event.path;

        if path.is_dir() {
            continue;
        }
        if !is_within_root(path, root) {
            warn!("watcher rejected path outside root: {}", path.display());
            continue;
        }
        // The filter is pure string/pattern matching, so it applies to
        // deleted paths as well: their rows still need removal, while
        // non-source paths never enter a batch.
        if filter.should_skip(path).is_some() {
            continue;
        }

        dirty.insert(crate::validation::normalize(path));
    }

    dirty
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    fn ts_extensions() -> Vec<String> {
        vec![".ts".to_string(), ".mts".to_string(), ".cts".to_string()]
    }

    #[test]
    fn batch_paths_are_sorted() {
        let mut set = BTreeSet::new();
        set.insert(PathBuf::from("/z.ts"));
        set.insert(PathBuf::from("/a.ts"));
        let batch = WatcherBatch::from_set(set);
        assert_eq!(
            batch.paths,
            vec![PathBuf::from("/a.ts"), PathBuf::from("/z.ts")]
        );
    }

    #[test]
    fn watcher_reports_file_changes() {
        let tmp = TempDir::new().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let watcher = FileSystemWatcher::new(
            tmp.path().to_path_buf(),
            Duration::from_millis(50),
            &ts_extensions(),
            &[],
            shutdown.clone(),
        )
        .unwrap();

        std::fs::write(tmp.path().join("a.ts"), "export const A = 1;").unwrap();

        let mut got_batch = false;
        for _ in 0..40 {
            match watcher.recv_timeout(Duration::from_millis(250)) {
                Ok(Some(WatcherMessage::Batch(batch))) => {
                    assert!(batch
                        .paths
                        .iter()
                        .any(|p| p.to_string_lossy().ends_with("a.ts")));
                    got_batch = true;
                    break;
                }
                Ok(Some(WatcherMessage::Malfunction(m))) => panic!("watcher malfunction: {m}"),
                Ok(None) => panic!("watcher thread terminated"),
                Err(()) => continue,
            }
        }
        assert!(got_batch, "no batch received for file creation");

        shutdown.store(true, Ordering::SeqCst);
    }

    #[test]
    fn non_source_files_do_not_emit_batches() {
        let tmp = TempDir::new().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let watcher = FileSystemWatcher::new(
            tmp.path().to_path_buf(),
            Duration::from_millis(50),
            &ts_extensions(),
            &[],
            shutdown.clone(),
        )
        .unwrap();

        std::fs::write(tmp.path().join("notes.md"), "hello").unwrap();
        std::fs::write(tmp.path().join("gildash.db"), "x").unwrap();

        // Give the debouncer time to flush; nothing should arrive.
        let result = watcher.recv_timeout(Duration::from_millis(600));
        assert!(matches!(result, Err(())));

        shutdown.store(true, Ordering::SeqCst);
    }
}
