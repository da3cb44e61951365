// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, HashMap};

use log::info;

use crate::{EdgeKind, ModeSet, TempGraph, TempId, TravelMode};

/// Finds [strongly connected components](https://en.wikipedia.org/wiki/Strongly_connected_component)
/// using [Kosaraju's algorithm](https://en.wikipedia.org/wiki/Kosaraju%27s_algorithm).
///
/// Only edges between nodes from `nodes` are considered. Nodes without any such edge
/// are not part of any component. Both depth-first passes use an explicit stack,
/// so long chains of nodes can't overflow the call stack.
///
/// Components are returned sorted by descending size (ties broken by the smallest member),
/// and members of every component are sorted. The first component is the "main" one.
pub fn strongly_connected_components(
    nodes: &[TempId],
    outgoing: &BTreeMap<TempId, Vec<TempId>>,
) -> Vec<Vec<TempId>> {
    let mut ids: Vec<TempId> = nodes.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let index: HashMap<TempId, usize> =
        ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect();

    // Build local adjacency lists, dropping edges leaving the node set
    let mut forward: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
    let mut connected = vec![false; ids.len()];
    for (from, targets) in outgoing {
        let Some(&from_idx) = index.get(from) else {
            continue;
        };
        for to in targets {
            if let Some(&to_idx) = index.get(to) {
                forward[from_idx].push(to_idx);
                connected[from_idx] = true;
                connected[to_idx] = true;
            }
        }
    }

    // Re-index to only keep connected nodes
    let keep: Vec<usize> = (0..ids.len()).filter(|&i| connected[i]).collect();
    let mut remap = vec![usize::MAX; ids.len()];
    for (new_idx, &old_idx) in keep.iter().enumerate() {
        remap[old_idx] = new_idx;
    }
    let forward: Vec<Vec<usize>> = keep
        .iter()
        .map(|&old| forward[old].iter().map(|&t| remap[t]).collect())
        .collect();
    let ids: Vec<TempId> = keep.iter().map(|&old| ids[old]).collect();

    let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
    for (from, targets) in forward.iter().enumerate() {
        for &to in targets {
            reverse[to].push(from);
        }
    }

    let order = finishing_order(&forward);

    // Second pass - peel components off the reverse graph in reverse finishing order
    let mut assigned = vec![false; ids.len()];
    let mut components: Vec<Vec<TempId>> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for &seed in order.iter().rev() {
        if assigned[seed] {
            continue;
        }

        let mut members = Vec::new();
        assigned[seed] = true;
        stack.push(seed);

        while let Some(v) = stack.pop() {
            members.push(ids[v]);
            for &w in &reverse[v] {
                if !assigned[w] {
                    assigned[w] = true;
                    stack.push(w);
                }
            }
        }

        members.sort_unstable();
        components.push(members);
    }

    components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
    components
}

/// First pass of Kosaraju's algorithm - returns nodes in the order
/// in which their depth-first search finished.
fn finishing_order(forward: &[Vec<usize>]) -> Vec<usize> {
    let mut visited = vec![false; forward.len()];
    let mut order = Vec::with_capacity(forward.len());

    // (node, index of the next neighbor to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..forward.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push((start, 0));

        while let Some(top) = stack.last_mut() {
            let v = top.0;
            if let Some(&w) = forward[v].get(top.1) {
                top.1 += 1;
                if !visited[w] {
                    visited[w] = true;
                    stack.push((w, 0));
                }
            } else {
                order.push(v);
                stack.pop();
            }
        }
    }

    order
}

/// Outgoing adjacency of a [TempGraph], limited to edges feasible for the given mode.
pub fn feasible_adjacency(g: &TempGraph, mode: TravelMode) -> BTreeMap<TempId, Vec<TempId>> {
    let mut adjacency: BTreeMap<TempId, Vec<TempId>> = BTreeMap::default();
    for e in g.edges().filter(|e| e.is_feasible(mode)) {
        adjacency.entry(e.from).or_default().push(e.to);
    }
    adjacency
}

/// Summary of [prune_minor_components].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub edges_removed: usize,
    pub nodes_removed: usize,
}

/// Restricts the road network to the main strongly connected component of every allowed mode.
///
/// For every mode from `allowed`, nodes of the main component of the mode's road network
/// are marked as reachable by that mode. Mode sets of road edges are then intersected with
/// modes reachable at both of their endpoints (and with `allowed`). Road edges left
/// without any modes are removed, followed by all nodes left without any edges.
pub fn prune_minor_components(g: &mut TempGraph, allowed: ModeSet) -> PruneStats {
    let nodes: Vec<TempId> = g.node_ids().collect();
    let mut reachable: HashMap<TempId, ModeSet> = HashMap::default();

    for mode in allowed.iter() {
        let adjacency = feasible_adjacency(g, mode);
        let components = strongly_connected_components(&nodes, &adjacency);

        if let Some(main) = components.first() {
            info!(
                "{mode}: main component has {} nodes, dropping {} minor component(s)",
                main.len(),
                components.len() - 1,
            );
            for &id in main {
                reachable.entry(id).or_default().insert(mode);
            }
        }
    }

    g.for_each_edge_kind_mut(|from, to, kind| {
        if let EdgeKind::Road { modes, .. } = kind {
            let from = reachable.get(&from).copied().unwrap_or_default();
            let to = reachable.get(&to).copied().unwrap_or_default();
            *modes &= from & to;
        }
    });

    let edges_removed =
        g.remove_edges(|e| matches!(e.kind, EdgeKind::Road { modes, .. } if modes.is_empty()));
    let nodes_removed = g.remove_isolated_nodes();
    info!("pruned {edges_removed} edges and {nodes_removed} nodes outside of main components");

    PruneStats {
        edges_removed,
        nodes_removed,
    }
}
