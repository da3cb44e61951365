// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BinaryHeap, HashMap};

use super::SearchError;
use crate::{Edge, EdgeKind, Graph, NodeId, TravelMode};

/// Bounds of a single [find_goals] search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    /// Paths longer than this (in meters) are not considered.
    pub max_length: u32,

    /// Max number of node expansions before [SearchError::StepLimitExceeded] is returned.
    pub step_limit: usize,
}

/// A goal found by [find_goals].
#[derive(Debug, Clone, PartialEq)]
pub struct Reached {
    pub goal: NodeId,

    /// Travel time, in seconds.
    pub time: f64,

    /// Path length, in meters.
    pub length: u32,

    /// Nodes of the path, including both the start and the goal.
    pub path: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy)]
struct QueueItem {
    at: NodeId,
    time: f64,
    length: u32,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.time.eq(&other.time)
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NOTE: We revert the order of comparison,
        // as lower times are considered better ("higher"),
        // and Rust's BinaryHeap is a max-heap.
        other.time.total_cmp(&self.time)
    }
}

fn reconstruct_path(came_from: &HashMap<NodeId, NodeId>, mut last: NodeId) -> Vec<NodeId> {
    let mut path = vec![last];

    while let Some(&nd) = came_from.get(&last) {
        path.push(nd);
        last = nd;
    }

    path.reverse();
    path
}

/// Time needed to traverse an edge at the given speed (in m/s).
/// Virtual edges carry their own precomputed time.
fn edge_time(e: &Edge, speed: f32) -> f64 {
    match e.kind {
        EdgeKind::Virtual { time, .. } => time as f64,
        _ => e.length as f64 / speed as f64,
    }
}

/// Uses [Dijkstra's algorithm](https://en.wikipedia.org/wiki/Dijkstra%27s_algorithm)
/// to find the fastest paths from one node to every reachable goal node, travelling
/// only over edges feasible for `mode` at `speed` meters per second.
///
/// Goals are not expanded - paths never lead through a goal. The start node is never
/// considered a goal. Returned goals are sorted by node id.
pub fn find_goals<G>(
    g: &Graph,
    from: NodeId,
    mode: TravelMode,
    speed: f32,
    is_goal: G,
    limits: SearchLimits,
) -> Result<Vec<Reached>, SearchError>
where
    G: Fn(NodeId) -> bool,
{
    if g.node(from).is_none() {
        return Err(SearchError::InvalidReference(from));
    }

    let mut queue: BinaryHeap<QueueItem> = BinaryHeap::default();
    let mut came_from: HashMap<NodeId, NodeId> = HashMap::default();
    let mut known_times: HashMap<NodeId, f64> = HashMap::default();
    let mut reached: Vec<Reached> = Vec::new();
    let mut steps: usize = 0;

    queue.push(QueueItem {
        at: from,
        time: 0.0,
        length: 0,
    });
    known_times.insert(from, 0.0);

    while let Some(item) = queue.pop() {
        // We might keep multiple items in the queue for the same node.
        if item.time > known_times.get(&item.at).copied().unwrap_or(f64::INFINITY) {
            continue;
        }

        if item.at != from && is_goal(item.at) {
            reached.push(Reached {
                goal: item.at,
                time: item.time,
                length: item.length,
                path: reconstruct_path(&came_from, item.at),
            });
            continue;
        }

        steps += 1;
        if steps > limits.step_limit {
            return Err(SearchError::StepLimitExceeded);
        }

        for e in g.outgoing(item.at).iter().filter(|e| e.kind.is_feasible(mode)) {
            let length = item.length.saturating_add(e.length);
            if length > limits.max_length {
                continue;
            }

            // Check if this is the fastest way to the neighbor
            let time = item.time + edge_time(e, speed);
            if time >= known_times.get(&e.to).copied().unwrap_or(f64::INFINITY) {
                continue;
            }

            came_from.insert(e.to, item.at);
            known_times.insert(e.to, time);
            queue.push(QueueItem {
                at: e.to,
                time,
                length,
            });
        }
    }

    reached.sort_by_key(|r| r.goal);
    Ok(reached)
}
