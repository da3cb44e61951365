// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Merging chains of pass-through road nodes into single edges.

mod run;

use std::collections::{HashMap, HashSet};

use log::{debug, info};

pub use run::{Run, RunKind};

use crate::distance::projected_distance;
use crate::{EdgeBuilder, Error, Result, TempGraph, TempId};

/// Summary of [ChainSimplifier::simplify].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimplifyStats {
    /// Number of runs which were replaced by new edges.
    pub runs: usize,
    pub nodes_removed: usize,
    pub edges_removed: usize,
    pub edges_added: usize,
}

/// Removes road nodes which only connect two neighbors, joining their edges.
///
/// A node is removed only if:
/// - it's a plain road node (see [NodeBuilder::is_pass_through](crate::NodeBuilder::is_pass_through))
///   and it's not pinned,
/// - it has exactly 1 incoming and 1 outgoing edge (one-way chain), or exactly
///   2 incoming and 2 outgoing edges which pair up into two opposite directions (two-way chain),
/// - the joined edges have the same speed limit, way and mode set, and
/// - joining the edges wouldn't make an immediate U-turn.
///
/// Consecutive removable nodes are collected into [Runs](Run), each replaced by a single
/// edge. A run is split into more parts if that single edge would be a loop (3 parts) or
/// would duplicate an existing edge (2 parts). Shorter runs are materialized first.
/// Simplifying an already simplified graph changes nothing.
#[derive(Debug, Default, Clone)]
pub struct ChainSimplifier {
    pinned: HashSet<TempId>,
}

impl ChainSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simplifier which never removes the provided nodes.
    pub fn with_pinned<I: IntoIterator<Item = TempId>>(pinned: I) -> Self {
        Self {
            pinned: pinned.into_iter().collect(),
        }
    }

    pub fn pin(&mut self, id: TempId) {
        self.pinned.insert(id);
    }

    pub fn simplify(&self, g: &mut TempGraph) -> Result<SimplifyStats> {
        let mut runs = RunSet::default();

        let one_way: Vec<TempId> = g.node_ids().collect();
        for v in one_way {
            if let Some((from, to)) = self.one_way_candidate(g, v) {
                runs.absorb(RunKind::OneWay, v, from, to)?;
            }
        }

        let two_way: Vec<TempId> = g.node_ids().collect();
        for v in two_way {
            if let Some((a, b)) = self.two_way_candidate(g, v)? {
                runs.absorb(RunKind::TwoWay, v, a, b)?;
            }
        }

        let runs = runs.into_runs();
        debug!("collected {} chain(s) to simplify", runs.len());
        let stats = materialize_all(g, runs)?;
        info!(
            "simplified {} chain(s): removed {} nodes, replaced {} edges with {}",
            stats.runs, stats.nodes_removed, stats.edges_removed, stats.edges_added,
        );
        Ok(stats)
    }

    fn is_removable(&self, g: &TempGraph, v: TempId) -> bool {
        !self.pinned.contains(&v) && g.node(v).is_some_and(|n| n.is_pass_through())
    }

    /// Returns the (predecessor, successor) of a removable one-way chain node.
    fn one_way_candidate(&self, g: &TempGraph, v: TempId) -> Option<(TempId, TempId)> {
        if g.in_degree(v) != 1 || g.out_degree(v) != 1 || !self.is_removable(g, v) {
            return None;
        }

        let incoming = g.incoming(v).next()?;
        let outgoing = g.outgoing(v).next()?;
        let (u, w) = (incoming.from, outgoing.to);
        let joinable = u != w && u != v && w != v && incoming.kind.is_mergeable_with(&outgoing.kind);
        joinable.then_some((u, w))
    }

    /// Returns both neighbors of a removable two-way chain node.
    ///
    /// The two pairings exclude each other: `pairs(0)` needs `ins[0]` to come from `outs[1].to`,
    /// while `pairs(1)` needs it not to. [Error::AmbiguousPairing] is therefore a consistency
    /// check, kept so that a broken adjacency index aborts instead of picking a pairing at random.
    fn two_way_candidate(&self, g: &TempGraph, v: TempId) -> Result<Option<(TempId, TempId)>> {
        if g.in_degree(v) != 2 || g.out_degree(v) != 2 || !self.is_removable(g, v) {
            return Ok(None);
        }

        let ins: Vec<&EdgeBuilder> = g.incoming(v).collect();
        let outs: Vec<&EdgeBuilder> = g.outgoing(v).collect();
        if ins.iter().any(|e| e.from == v) || outs.iter().any(|e| e.to == v) {
            return Ok(None);
        }

        let through =
            |i: &EdgeBuilder, o: &EdgeBuilder| i.from != o.to && i.kind.is_mergeable_with(&o.kind);
        let opposite =
            |i: &EdgeBuilder, o: &EdgeBuilder| i.from == o.to && i.kind.is_mergeable_with(&o.kind);

        // ins[0] continues into outs[x], ins[1] continues into outs[1 - x]
        let pairs = |x: usize| {
            through(ins[0], outs[x])
                && through(ins[1], outs[1 - x])
                && opposite(ins[0], outs[1 - x])
                && opposite(ins[1], outs[x])
        };

        match (pairs(0), pairs(1)) {
            (true, true) => Err(Error::AmbiguousPairing(v)),
            (true, false) => Ok(Some((ins[0].from, outs[0].to))),
            (false, true) => Ok(Some((ins[0].from, outs[1].to))),
            (false, false) => Ok(None),
        }
    }
}

/// Pending runs, together with an index of runs by their boundary nodes.
#[derive(Debug, Default)]
struct RunSet {
    runs: Vec<Option<Run>>,
    boundaries: HashMap<TempId, Vec<usize>>,
}

impl RunSet {
    fn at(&self, boundary: TempId) -> Vec<usize> {
        self.boundaries.get(&boundary).cloned().unwrap_or_default()
    }

    fn insert(&mut self, run: Run) {
        let idx = self.runs.len();
        self.boundaries.entry(run.from).or_default().push(idx);
        if run.to != run.from {
            self.boundaries.entry(run.to).or_default().push(idx);
        }
        self.runs.push(Some(run));
    }

    fn take(&mut self, idx: usize) -> Option<Run> {
        let run = self.runs.get_mut(idx)?.take()?;
        for boundary in [run.from, run.to] {
            if let Some(indices) = self.boundaries.get_mut(&boundary) {
                indices.retain(|&i| i != idx);
            }
        }
        Some(run)
    }

    fn get(&self, idx: usize) -> Option<&Run> {
        self.runs.get(idx).and_then(Option::as_ref)
    }

    /// Turns node `v`, lying between `prev` and `next`, into an interior node,
    /// either starting a new run or growing (and possibly joining) the runs ending at `v`.
    ///
    /// A node closing a circle, or touching a run of a different kind, stays a boundary.
    fn absorb(&mut self, kind: RunKind, v: TempId, prev: TempId, next: TempId) -> Result<()> {
        let at = self.at(v);
        if at.iter().any(|&i| self.get(i).is_some_and(|r| r.kind != kind)) {
            return Ok(());
        }

        match at.as_slice() {
            [] => self.insert(Run::new(kind, prev, v, next)),

            &[idx] => {
                let Some(run) = self.take(idx) else {
                    return Ok(());
                };
                if run.is_circle() {
                    self.runs[idx] = Some(run);
                    self.insert_boundaries(idx);
                    return Ok(());
                }

                let adjacent = run.neighbor_of(v);
                let new_end = match kind {
                    RunKind::OneWay if run.to == v && adjacent == Some(prev) => next,
                    RunKind::OneWay if run.from == v && adjacent == Some(next) => prev,
                    RunKind::TwoWay if adjacent == Some(prev) => next,
                    RunKind::TwoWay if adjacent == Some(next) => prev,
                    _ => {
                        return Err(Error::RunEndpointMismatch {
                            from: run.from,
                            to: run.to,
                            at: v,
                        })
                    }
                };
                self.insert(run.add(v, new_end)?);
            }

            &[first, second] => {
                let (Some(a), Some(b)) = (self.take(first), self.take(second)) else {
                    return Ok(());
                };
                let joined = if a.to == v && b.from == v {
                    a.append(b)?
                } else if a.from == v && b.to == v {
                    b.append(a)?
                } else if a.to == v {
                    a.append_reversed(b)?
                } else {
                    a.prepend_reversed(b)?
                };
                self.insert(joined);
            }

            // A node with two neighbors can't bound more than two runs
            _ => {}
        }

        Ok(())
    }

    fn insert_boundaries(&mut self, idx: usize) {
        if let Some((from, to)) = self.get(idx).map(|r| (r.from, r.to)) {
            self.boundaries.entry(from).or_default().push(idx);
            if to != from {
                self.boundaries.entry(to).or_default().push(idx);
            }
        }
    }

    fn into_runs(self) -> Vec<Run> {
        self.runs.into_iter().flatten().collect()
    }
}

fn geometric_length(g: &TempGraph, run: &Run) -> f64 {
    let points: Vec<[f64; 2]> = run
        .chain()
        .filter_map(|id| g.node(id).map(|n| n.location.point()))
        .collect();
    points
        .windows(2)
        .map(|p| projected_distance(p[0], p[1]))
        .sum()
}

fn materialize_all(g: &mut TempGraph, runs: Vec<Run>) -> Result<SimplifyStats> {
    let mut runs: Vec<(f64, Run)> = runs
        .into_iter()
        .map(|r| (geometric_length(g, &r), r))
        .collect();
    runs.sort_by(|(l1, r1), (l2, r2)| {
        l1.total_cmp(l2)
            .then_with(|| r1.interior.front().cmp(&r2.interior.front()))
    });

    let mut stats = SimplifyStats::default();
    let mut kept: HashSet<TempId> = HashSet::default();
    let mut doomed: Vec<TempId> = Vec::new();

    for (_, run) in runs {
        materialize(g, run, &mut kept, &mut doomed, &mut stats)?;
    }

    for id in doomed {
        if !kept.contains(&id) {
            g.remove_node(id)?;
            stats.nodes_removed += 1;
        }
    }

    Ok(stats)
}

fn chain_edges<I>(g: &TempGraph, pairs: I) -> Result<Vec<EdgeBuilder>>
where
    I: Iterator<Item = (TempId, TempId)>,
{
    pairs
        .map(|(from, to)| g.edge(from, to).cloned().ok_or(Error::MissingEdge(from, to)))
        .collect()
}

fn materialize(
    g: &mut TempGraph,
    run: Run,
    kept: &mut HashSet<TempId>,
    doomed: &mut Vec<TempId>,
    stats: &mut SimplifyStats,
) -> Result<()> {
    let two_way = run.kind == RunKind::TwoWay;
    let chain: Vec<TempId> = run.chain().collect();
    let edges = run.edge_count();

    let wanted = if run.is_circle() {
        3
    } else if g.has_edge(run.from, run.to) || (two_way && g.has_edge(run.to, run.from)) {
        2
    } else {
        1
    };
    let parts = wanted.min(edges);
    if parts == edges {
        return Ok(());
    }

    let forward = chain_edges(g, chain.windows(2).map(|p| (p[0], p[1])))?;
    let backward = if two_way {
        chain_edges(g, chain.windows(2).map(|p| (p[1], p[0])))?
    } else {
        Vec::new()
    };

    for e in forward.iter().chain(backward.iter()) {
        g.remove_edge(e.from, e.to);
    }
    stats.edges_removed += forward.len() + backward.len();

    // Evenly spaced slice boundaries, as indices into the chain
    let cuts: Vec<usize> = (0..=parts)
        .map(|i| (2 * i * edges + parts) / (2 * parts))
        .collect();

    for cut in cuts.windows(2) {
        let (start, end) = (cut[0], cut[1]);
        let (from, to) = (chain[start], chain[end]);

        let length = forward[start..end].iter().map(|e| e.length).sum();
        g.add_edge(EdgeBuilder::new(from, to, length, forward[start].kind.clone()))?;
        stats.edges_added += 1;

        if two_way {
            let length = backward[start..end].iter().map(|e| e.length).sum();
            g.add_edge(EdgeBuilder::new(to, from, length, backward[end - 1].kind.clone()))?;
            stats.edges_added += 1;
        }

        kept.insert(from);
        kept.insert(to);
    }

    doomed.extend(run.interior);
    stats.runs += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdgeKind, Location, ModeSet, NodeBuilder, NodeKind};

    fn node_at(id: TempId, lat: f64, lon: f64, kind: NodeKind) -> NodeBuilder {
        NodeBuilder::new(id, id as i64, Location::new(lat, lon, 0.0), kind)
    }

    /// Nodes on a straight line, ~68 m apart.
    fn line(n: TempId) -> TempGraph {
        let mut g = TempGraph::new();
        for id in 0..n {
            g.add_node(node_at(id, 52.0, 21.0 + id as f64 * 0.001, NodeKind::road()))
                .unwrap();
        }
        g
    }

    fn road(from: TempId, to: TempId, length: u32, way_id: i64) -> EdgeBuilder {
        EdgeBuilder::road(from, to, length, 10, way_id, ModeSet::CAR)
    }

    fn add(g: &mut TempGraph, edges: &[(TempId, TempId, u32, i64)]) {
        for &(from, to, length, way_id) in edges {
            g.add_edge(road(from, to, length, way_id)).unwrap();
        }
    }

    fn snapshot(g: &TempGraph) -> (Vec<TempId>, Vec<EdgeBuilder>) {
        (g.node_ids().collect(), g.edges().cloned().collect())
    }

    #[test]
    fn merges_one_way_chain() {
        let mut g = line(4);
        add(&mut g, &[(0, 1, 10, 7), (1, 2, 20, 7), (2, 3, 30, 7)]);

        let stats = ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(stats.nodes_removed, 2);
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(g.edge_count(), 1);

        let e = g.edge(0, 3).unwrap();
        assert_eq!(e.length, 60);
        assert_eq!(
            e.kind,
            EdgeKind::Road {
                max_speed: 10,
                way_id: 7,
                modes: ModeSet::CAR,
            },
        );
    }

    #[test]
    fn different_attributes_block_merge() {
        let mut g = line(4);
        add(&mut g, &[(0, 1, 10, 7), (1, 2, 20, 9), (2, 3, 30, 7)]);
        let before = snapshot(&g);

        let stats = ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(stats, SimplifyStats::default());
        assert_eq!(snapshot(&g), before);
    }

    #[test]
    fn preserves_length() {
        let mut g = line(10);
        let edges: Vec<_> = (0..9).map(|i| (i, i + 1, 13 + 7 * i, 1)).collect();
        add(&mut g, &edges);
        let total: u32 = g.edges().map(|e| e.length).sum();

        ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges().map(|e| e.length).sum::<u32>(), total);
    }

    #[test]
    fn merges_two_way_chain() {
        let mut g = line(4);
        add(
            &mut g,
            &[
                (0, 1, 10, 7),
                (1, 2, 20, 7),
                (2, 3, 30, 7),
                (3, 2, 31, 7),
                (2, 1, 21, 7),
                (1, 0, 11, 7),
            ],
        );

        ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(g.edge(0, 3).unwrap().length, 60);
        assert_eq!(g.edge(3, 0).unwrap().length, 63);
    }

    #[test]
    fn two_way_circle_splits_into_three() {
        let mut g = line(6);
        let forward: Vec<_> = (0..6).map(|i| (i, (i + 1) % 6, 10 + i, 7)).collect();
        let backward: Vec<_> = (0..6).map(|i| ((i + 1) % 6, i, 100 + i, 7)).collect();
        add(&mut g, &forward);
        add(&mut g, &backward);

        let stats = ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.nodes_removed, 3);
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(g.edge_count(), 6);

        // 1 -> 2 -> 3, 3 -> 4 -> 5, 5 -> 0 -> 1
        assert_eq!(g.edge(1, 3).unwrap().length, 23);
        assert_eq!(g.edge(3, 5).unwrap().length, 27);
        assert_eq!(g.edge(5, 1).unwrap().length, 25);

        // 3 -> 2 -> 1, 5 -> 4 -> 3, 1 -> 0 -> 5
        assert_eq!(g.edge(3, 1).unwrap().length, 203);
        assert_eq!(g.edge(5, 3).unwrap().length, 207);
        assert_eq!(g.edge(1, 5).unwrap().length, 205);
    }

    #[test]
    fn two_way_collision_with_reverse_edge_splits_into_two() {
        let mut g = line(4);
        add(
            &mut g,
            &[
                (0, 1, 10, 7),
                (1, 2, 20, 7),
                (2, 3, 30, 7),
                (3, 2, 31, 7),
                (2, 1, 21, 7),
                (1, 0, 11, 7),
                (3, 0, 99, 8),
            ],
        );

        let stats = ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(stats.nodes_removed, 1);
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(g.edge_count(), 5);

        assert_eq!(g.edge(0, 2).unwrap().length, 30);
        assert_eq!(g.edge(2, 3).unwrap().length, 30);
        assert_eq!(g.edge(3, 2).unwrap().length, 31);
        assert_eq!(g.edge(2, 0).unwrap().length, 32);
        assert_eq!(g.edge(3, 0).unwrap().length, 99);
        assert!(!g.has_edge(0, 3));
    }

    #[test]
    fn protected_and_pinned_nodes_stay() {
        let mut g = TempGraph::new();
        for id in 0..5 {
            let kind = if id == 1 {
                NodeKind::Road {
                    park_and_ride: true,
                    bike_share: false,
                }
            } else {
                NodeKind::road()
            };
            g.add_node(node_at(id, 52.0, 21.0 + id as f64 * 0.001, kind))
                .unwrap();
        }
        add(&mut g, &[(0, 1, 1, 7), (1, 2, 1, 7), (2, 3, 1, 7), (3, 4, 1, 7)]);

        ChainSimplifier::with_pinned([3]).simplify(&mut g).unwrap();
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![0, 1, 3, 4]);
        assert_eq!(g.edge(1, 3).unwrap().length, 2);
    }

    #[test]
    fn circle_splits_into_three() {
        let mut g = line(6);
        let edges: Vec<_> = (0..6).map(|i| (i, (i + 1) % 6, 10, 7)).collect();
        add(&mut g, &edges);

        ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.edges().map(|e| e.length).sum::<u32>(), 60);
        assert_eq!(g.nodes_by_degree().into_keys().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn collision_splits_into_two() {
        let mut g = line(4);
        add(
            &mut g,
            &[(0, 1, 10, 7), (1, 2, 20, 7), (2, 3, 30, 7), (0, 3, 99, 8)],
        );

        ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(g.edge(0, 2).unwrap().length, 30);
        assert_eq!(g.edge(2, 3).unwrap().length, 30);
        assert_eq!(g.edge(0, 3).unwrap().length, 99);
    }

    #[test]
    fn shorter_run_wins_collision() {
        let mut g = TempGraph::new();
        g.add_node(node_at(0, 52.0, 21.0, NodeKind::road())).unwrap();
        g.add_node(node_at(1, 52.010, 21.005, NodeKind::road())).unwrap();
        g.add_node(node_at(2, 52.001, 21.005, NodeKind::road())).unwrap();
        g.add_node(node_at(3, 52.0, 21.010, NodeKind::road())).unwrap();
        add(&mut g, &[(0, 1, 5, 7), (1, 3, 5, 7), (0, 2, 6, 7), (2, 3, 6, 7)]);

        ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(g.edge(0, 3).unwrap().length, 12);
        assert!(g.has_edge(0, 1));
        assert!(g.has_edge(1, 3));
    }

    #[test]
    fn u_turns_are_not_merged() {
        let mut g = line(2);
        add(&mut g, &[(0, 1, 10, 7), (1, 0, 10, 7)]);
        let before = snapshot(&g);

        ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(snapshot(&g), before);
    }

    #[test]
    fn idempotent() {
        let mut g = line(16);
        add(
            &mut g,
            &[
                // one-way chain with a shortcut
                (0, 1, 10, 1),
                (1, 2, 10, 1),
                (2, 3, 10, 1),
                (3, 4, 10, 1),
                (0, 4, 10, 2),
                // circle
                (5, 6, 10, 3),
                (6, 7, 10, 3),
                (7, 8, 10, 3),
                (8, 9, 10, 3),
                (9, 5, 10, 3),
                // two-way chain attached to the circle
                (5, 10, 10, 4),
                (10, 11, 10, 4),
                (11, 12, 10, 4),
                (12, 11, 10, 4),
                (11, 10, 10, 4),
                (10, 5, 10, 4),
                // way change in the middle
                (12, 13, 10, 5),
                (13, 14, 10, 6),
                (14, 15, 10, 6),
            ],
        );

        let first = ChainSimplifier::new().simplify(&mut g).unwrap();
        assert!(first.nodes_removed > 0);
        let after_first = snapshot(&g);

        let second = ChainSimplifier::new().simplify(&mut g).unwrap();
        assert_eq!(second, SimplifyStats::default());
        assert_eq!(snapshot(&g), after_first);
    }
}
