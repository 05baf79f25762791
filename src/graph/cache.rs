//! Scope-keyed cache for dependency graphs.
//!
//! The facade owns at most one graph per project scope plus one
//! cross-project graph. Owners invalidate (or patch) on every `indexed`
//! event; readers instead expire entries after a TTL or as soon as the
//! stored index-version counter has advanced past the one the entry was
//! built against.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::DependencyGraph;
use crate::error::Result;
use crate::store::Store;

/// Reader cache TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(15);

struct CachedGraph {
    graph: DependencyGraph,
    built_version: i64,
    built_at: Instant,
}

/// Cache keyed by project scope (`None` = cross-project).
pub struct GraphCache {
    entries: HashMap<Option<String>, CachedGraph>,
    ttl: Duration,
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl GraphCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Owner path: return the cached graph for `scope`, building it when
    /// absent. Freshness is guaranteed by `invalidate`/`patch` being called
    /// on every index commit.
    pub fn get_or_build(&mut self, store: &Store, scope: Option<&str>) -> Result<&DependencyGraph> {
        let key = scope.map(str::to_string);
        if !self.entries.contains_key(&key) {
            self.build_into(store, key.clone())?;
        }
        Ok(&self.entries[&key].graph)
    }

    /// Reader path: additionally expire on TTL or on an advanced
    /// index-version counter before serving.
    pub fn get_or_build_checked(
        &mut self,
        store: &Store,
        scope: Option<&str>,
    ) -> Result<&DependencyGraph> {
        let key = scope.map(str::to_string);

        let expired = match self.entries.get(&key) {
            None => true,
            Some(entry) => {
                entry.built_at.elapsed() >= self.ttl
                    || store.index_version()? != entry.built_version
            }
        };
        if expired {
            self.build_into(store, key.clone())?;
        }
        Ok(&self.entries[&key].graph)
    }

    fn build_into(&mut self, store: &Store, key: Option<String>) -> Result<()> {
        let graph = DependencyGraph::load(store, key.as_deref())?;
        let built_version = store.index_version()?;
        self.entries.insert(
            key,
            CachedGraph {
                graph,
                built_version,
                built_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Patch every cached graph with an index run's change set.
    pub fn patch(
        &mut self,
        store: &Store,
        changed: &[String],
        deleted: &[String],
    ) -> Result<()> {
        let version = store.index_version()?;
        for (scope, entry) in self.entries.iter_mut() {
            let rows = store.relations().dependency_edges(scope.as_deref())?;
            let mut by_src: HashMap<&str, Vec<String>> = HashMap::new();
            for row in &rows {
                by_src
                    .entry(row.src_file_path.as_str())
                    .or_default()
                    .push(row.dst_file_path.clone());
            }
            entry.graph.patch_files(changed, deleted, |file| {
                by_src.get(file).cloned().unwrap_or_default()
            });
            entry.built_version = version;
            entry.built_at = Instant::now();
        }
        Ok(())
    }

    /// Drop every cached graph.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}
