//! Graph algorithms: Tarjan strongly connected components and Johnson
//! simple-cycle enumeration.
//!
//! Both operate on index-compressed adjacency and return results in a
//! deterministic order (nodes are sorted before numbering).

use std::collections::HashMap;

/// Limits for cycle enumeration. `max_length` drops overlong cycles from
/// the result without abandoning the traversal; `max_cycles` stops the
/// search once the budget is reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOptions {
    pub max_cycles: Option<usize>,
    pub max_length: Option<usize>,
}

/// Index-compressed view of an adjacency map: sorted node labels plus
/// neighbor lists in label order.
pub(crate) struct CompressedGraph {
    pub nodes: Vec<String>,
    pub adj: Vec<Vec<usize>>,
}

impl CompressedGraph {
    pub fn from_adjacency(
        forward: &HashMap<String, std::collections::BTreeSet<String>>,
    ) -> Self {
        let mut nodes: Vec<String> = forward
            .iter()
            .flat_map(|(src, dsts)| std::iter::once(src.clone()).chain(dsts.iter().cloned()))
            .collect();
        nodes.sort();
        nodes.dedup();

        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut adj = vec![Vec::new(); nodes.len()];
        for (src, dsts) in forward {
            let s = index[src.as_str()];
            for dst in dsts {
                adj[s].push(index[dst.as_str()]);
            }
            adj[s].sort_unstable();
            adj[s].dedup();
        }

        Self { nodes, adj }
    }
}

/// Iterative Tarjan SCC. Returns components as sorted index lists in a
/// deterministic order.
pub(crate) fn strongly_connected_components(graph: &CompressedGraph) -> Vec<Vec<usize>> {
    let n = graph.nodes.len();
    const UNSET: usize = usize::MAX;

    let mut index = vec![UNSET; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0usize;
    let mut components = Vec::new();

    // (node, next-neighbor position) frames for an explicit DFS.
    let mut frames: Vec<(usize, usize)> = Vec::new();

    for start in 0..n {
        if index[start] != UNSET {
            continue;
        }
        frames.push((start, 0));

        while let Some(&(v, ni)) = frames.last() {
            // First entry for v: ni is 0 only before any neighbor was taken.
            if ni == 0 {
                index[v] = counter;
                low[v] = counter;
                counter += 1;
                stack.push(v);
                on_stack[v] = true;
            }

            let mut ni = ni;
            let mut advanced = false;
            while ni < graph.adj[v].len() {
                let w = graph.adj[v][ni];
                ni += 1;
                if index[w] == UNSET {
                    let top = frames.len() - 1;
                    frames[top].1 = ni;
                    frames.push((w, 0));
                    advanced = true;
                    break;
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
            }
            if advanced {
                continue;
            }

            if low[v] == index[v] {
                let mut component = Vec::new();
                loop {
                    let w = stack.pop().expect("tarjan stack underflow");
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                low[parent] = low[parent].min(low[v]);
            }
        }
    }

    components.sort_by_key(|c| c[0]);
    components
}

/// Enumerate simple cycles with Johnson's algorithm, run over each
/// non-trivial SCC. Self-loops are emitted as length-1 cycles first.
pub(crate) fn simple_cycles(graph: &CompressedGraph, opts: CycleOptions) -> Vec<Vec<String>> {
    let mut cycles: Vec<Vec<usize>> = Vec::new();
    let budget = opts.max_cycles.unwrap_or(usize::MAX);

    for (v, neighbors) in graph.adj.iter().enumerate() {
        if cycles.len() >= budget {
            break;
        }
        if neighbors.binary_search(&v).is_ok() {
            cycles.push(vec![v]);
        }
    }

    let components = strongly_connected_components(graph);
    for component in components {
        if cycles.len() >= budget {
            break;
        }
        if component.len() < 2 {
            continue;
        }
        johnson_component(graph, &component, opts, budget, &mut cycles);
    }

    cycles
        .into_iter()
        .map(|cycle| cycle.into_iter().map(|i| graph.nodes[i].clone()).collect())
        .collect()
}

/// Johnson's circuit enumeration restricted to one SCC. Start vertices are
/// taken in increasing order and each start only explores vertices with a
/// larger or equal index, so every cycle is reported exactly once, rooted
/// at its smallest vertex.
fn johnson_component(
    graph: &CompressedGraph,
    component: &[usize],
    opts: CycleOptions,
    budget: usize,
    cycles: &mut Vec<Vec<usize>>,
) {
    let members: std::collections::HashSet<usize> = component.iter().copied().collect();

    for &start in component {
        if cycles.len() >= budget {
            return;
        }

        let mut blocked: HashMap<usize, bool> = HashMap::new();
        let mut block_lists: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut path: Vec<usize> = Vec::new();

        circuit(
            graph, start, start, &members, &mut blocked, &mut block_lists, &mut path, opts,
            budget, cycles,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn circuit(
    graph: &CompressedGraph,
    v: usize,
    start: usize,
    members: &std::collections::HashSet<usize>,
    blocked: &mut HashMap<usize, bool>,
    block_lists: &mut HashMap<usize, Vec<usize>>,
    path: &mut Vec<usize>,
    opts: CycleOptions,
    budget: usize,
    cycles: &mut Vec<Vec<usize>>,
) -> bool {
    let mut found = false;
    path.push(v);
    blocked.insert(v, true);

    for i in 0..graph.adj[v].len() {
        let w = graph.adj[v][i];
        if cycles.len() >= budget {
            found = true;
            break;
        }
        // Cycles are rooted at their smallest member; smaller vertices were
        // handled by earlier starts.
        if !members.contains(&w) || w < start {
            continue;
        }
        if w == start {
            if path.len() > 1 && opts.max_length.map_or(true, |max| path.len() <= max) {
                cycles.push(path.clone());
            }
            found = true;
        } else if !blocked.get(&w).copied().unwrap_or(false)
            && circuit(
                graph, w, start, members, blocked, block_lists, path, opts, budget, cycles,
            )
        {
            found = true;
        }
    }

    if found {
        unblock(v, blocked, block_lists);
    } else {
        for &w in &graph.adj[v] {
            if members.contains(&w) && w >= start {
                let list = block_lists.entry(w).or_default();
                if !list.contains(&v) {
                    list.push(v);
                }
            }
        }
    }

    path.pop();
    found
}

fn unblock(
    v: usize,
    blocked: &mut HashMap<usize, bool>,
    block_lists: &mut HashMap<usize, Vec<usize>>,
) {
    blocked.insert(v, false);
    if let Some(list) = block_lists.remove(&v) {
        for w in list {
            if blocked.get(&w).copied().unwrap_or(false) {
                unblock(w, blocked, block_lists);
            }
        }
    }
}
