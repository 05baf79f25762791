//! Dependency graph engine.
//!
//! Builds forward and reverse adjacency from persisted dependency-kind
//! relations (`imports`, `type-references`, `re-exports`), answers
//! closure/impact/cycle queries, and patches itself incrementally so a
//! patched graph is edge-identical to a fresh build.

mod algorithms;
mod cache;

pub use algorithms::CycleOptions;
pub use cache::GraphCache;

use std::collections::{BTreeSet, HashMap, HashSet};

use algorithms::CompressedGraph;

use crate::error::Result;
use crate::store::Store;

/// Fan-in/fan-out metrics for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FanMetrics {
    pub fan_in: usize,
    pub fan_out: usize,
    pub transitive_in: usize,
    pub transitive_out: usize,
}

/// File dependency graph over project-root-relative paths. Self-loops are
/// preserved; they are cycles.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    forward: HashMap<String, BTreeSet<String>>,
    reverse: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build from the store's dependency-kind relations, optionally scoped
    /// to one project.
    pub fn load(store: &Store, project: Option<&str>) -> Result<Self> {
        let edges = store.relations().dependency_edges(project)?;
        Ok(Self::from_edges(
            edges
                .into_iter()
                .map(|r| (r.src_file_path, r.dst_file_path)),
        ))
    }

    /// Build from an explicit edge list.
    pub fn from_edges(edges: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut graph = Self::default();
        for (src, dst) in edges {
            graph.insert_edge(src, dst);
        }
        graph
    }

    fn insert_edge(&mut self, src: String, dst: String) {
        self.reverse
            .entry(dst.clone())
            .or_default()
            .insert(src.clone());
        self.forward.entry(src).or_default().insert(dst);
    }

    /// Direct out-neighbors of `file`.
    pub fn dependencies(&self, file: &str, limit: Option<usize>) -> Vec<String> {
        let deps = self
            .forward
            .get(file)
            .map(|set| set.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        truncate(deps, limit)
    }

    /// Direct in-neighbors of `file`.
    pub fn dependents(&self, file: &str, limit: Option<usize>) -> Vec<String> {
        let deps = self
            .reverse
            .get(file)
            .map(|set| set.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        truncate(deps, limit)
    }

    /// Everything reachable from `file` along forward edges, excluding
    /// `file` itself.
    pub fn transitive_dependencies(&self, file: &str) -> BTreeSet<String> {
        self.closure(file, &self.forward)
    }

    /// Everything that can reach `file`, excluding `file` itself.
    pub fn transitive_dependents(&self, file: &str) -> BTreeSet<String> {
        self.closure(file, &self.reverse)
    }

    fn closure(&self, start: &str, adj: &HashMap<String, BTreeSet<String>>) -> BTreeSet<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![start];

        while let Some(current) = stack.pop() {
            if let Some(neighbors) = adj.get(current) {
                for neighbor in neighbors {
                    if visited.insert(neighbor.as_str()) {
                        stack.push(neighbor);
                    }
                }
            }
        }

        visited.remove(start);
        visited.into_iter().map(str::to_string).collect()
    }

    /// Impact set of a change: the union of transitive dependents of every
    /// changed file, plus the changed files themselves.
    pub fn affected(&self, changed: &[String]) -> BTreeSet<String> {
        let mut result: BTreeSet<String> = changed.iter().cloned().collect();
        for file in changed {
            result.extend(self.transitive_dependents(file));
        }
        result
    }

    /// True iff some SCC has more than one member or any self-loop exists.
    /// Always agrees with `cycle_paths` being non-empty.
    pub fn has_cycle(&self) -> bool {
        if self
            .forward
            .iter()
            .any(|(src, dsts)| dsts.contains(src.as_str()))
        {
            return true;
        }
        let compressed = CompressedGraph::from_adjacency(&self.forward);
        algorithms::strongly_connected_components(&compressed)
            .iter()
            .any(|c| c.len() > 1)
    }

    /// Enumerate simple cycles, optionally limited by count or length.
    pub fn cycle_paths(&self, opts: CycleOptions) -> Vec<Vec<String>> {
        let compressed = CompressedGraph::from_adjacency(&self.forward);
        algorithms::simple_cycles(&compressed, opts)
    }

    /// Fan metrics for one file.
    pub fn fan_metrics(&self, file: &str) -> FanMetrics {
        FanMetrics {
            fan_in: self.reverse.get(file).map_or(0, BTreeSet::len),
            fan_out: self.forward.get(file).map_or(0, BTreeSet::len),
            transitive_in: self.transitive_dependents(file).len(),
            transitive_out: self.transitive_dependencies(file).len(),
        }
    }

    /// Read-only view of the forward adjacency.
    pub fn adjacency_list(&self) -> &HashMap<String, BTreeSet<String>> {
        &self.forward
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    /// Apply an incremental change set. `relations_for` supplies the new
    /// outgoing dependency list of each changed file. The result is
    /// edge-identical to a fresh build over the same relation set.
    pub fn patch_files(
        &mut self,
        changed: &[String],
        deleted: &[String],
        relations_for: impl Fn(&str) -> Vec<String>,
    ) {
        // Drop every touched file's outgoing edges.
        for file in changed.iter().chain(deleted) {
            if let Some(dsts) = self.forward.remove(file) {
                for dst in dsts {
                    if let Some(sources) = self.reverse.get_mut(&dst) {
                        sources.remove(file);
                        if sources.is_empty() {
                            self.reverse.remove(&dst);
                        }
                    }
                }
            }
        }

        // A deleted file also stops being a destination: the store's
        // cascade removed those rows, so the graph mirrors it.
        for file in deleted {
            if let Some(sources) = self.reverse.remove(file) {
                for src in sources {
                    if let Some(dsts) = self.forward.get_mut(&src) {
                        dsts.remove(file);
                        if dsts.is_empty() {
                            self.forward.remove(&src);
                        }
                    }
                }
            }
        }

        for file in changed {
            for dst in relations_for(file) {
                self.insert_edge(file.clone(), dst);
            }
        }
    }

    /// Edge set for equality checks in tests and verification.
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        self.forward
            .iter()
            .flat_map(|(src, dsts)| dsts.iter().map(move |dst| (src.clone(), dst.clone())))
            .collect()
    }
}

fn truncate(mut items: Vec<String>, limit: Option<usize>) -> Vec<String> {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}
