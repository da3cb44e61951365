// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::search::{find_goals, Reached, SearchError, SearchLimits};
use crate::snap::walking_edge;
use crate::{EdgeBuilder, Error, Graph, NodeId, Options, Result, TempGraph, TravelMode};

type SearchResult = std::result::Result<Vec<Reached>, SearchError>;

/// Summary of [TransferPrecomputer::run].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    pub sources: usize,
    pub failed: usize,
    pub transfers: usize,
}

/// Finds walking connections between all pairs of nearby stops.
///
/// Every stop with a walking connection to the road network is a search source. Sources are
/// processed on a dedicated thread pool, in batches of at most `max_in_flight` searches.
/// Every batch is finished and its results collected before the next one starts,
/// which bounds the number of search results kept in memory at once.
#[derive(Debug, Clone)]
pub struct TransferPrecomputer {
    /// Max length of a transfer, in meters.
    pub max_length: u32,

    /// Reference walking speed, in meters per second.
    pub speed: f32,

    pub step_limit: usize,

    /// Number of worker threads, 0 to let rayon decide.
    pub threads: usize,

    pub max_in_flight: usize,
}

impl TransferPrecomputer {
    pub fn new(options: &Options) -> Self {
        Self {
            max_length: options.max_transfer_length,
            speed: options.walk_speed,
            step_limit: options.step_limit,
            threads: options.worker_threads,
            max_in_flight: options.max_in_flight,
        }
    }

    /// Returns all stops which can be left on foot.
    pub fn sources(g: &Graph) -> Vec<NodeId> {
        g.nodes()
            .iter()
            .filter(|n| n.kind.is_stop())
            .filter(|n| g.outgoing(n.id).iter().any(|e| e.kind.is_feasible(TravelMode::Foot)))
            .map(|n| n.id)
            .collect()
    }

    fn search(&self, g: &Graph, is_stop: &[bool], source: NodeId) -> SearchResult {
        let limits = SearchLimits {
            max_length: self.max_length,
            step_limit: self.step_limit,
        };
        let is_goal = |n: NodeId| is_stop.get(n as usize).copied().unwrap_or(false);
        find_goals(g, source, TravelMode::Foot, self.speed, is_goal, limits)
    }

    /// Computes transfers between stops of a compacted graph. Returned edges use final node ids,
    /// ready to be added to the graph reopened with [TempGraph::from_graph].
    ///
    /// A source whose search fails is logged and skipped.
    pub fn run(&self, g: &Graph) -> Result<(Vec<EdgeBuilder>, TransferStats)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;

        let is_stop: Vec<bool> = g.nodes().iter().map(|n| n.kind.is_stop()).collect();
        let sources = Self::sources(g);
        let mut stats = TransferStats {
            sources: sources.len(),
            ..Default::default()
        };
        let mut edges = Vec::new();

        for (idx, batch) in sources.chunks(self.max_in_flight.max(1)).enumerate() {
            let results: Vec<(NodeId, SearchResult)> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|&source| (source, self.search(g, &is_stop, source)))
                    .collect()
            });

            for (source, result) in results {
                match result {
                    Ok(reached) => {
                        edges.extend(reached.into_iter().map(|r| self.transfer(source, r)))
                    }
                    Err(e) => {
                        warn!("failed to compute transfers from stop node {source}: {e}");
                        stats.failed += 1;
                    }
                }
            }
            debug!("transfer batch {} done, {} transfers so far", idx + 1, edges.len());
        }

        stats.transfers = edges.len();
        info!(
            "computed {} transfer(s) from {} stop(s), {} failed",
            stats.transfers, stats.sources, stats.failed,
        );
        Ok((edges, stats))
    }

    fn transfer(&self, source: NodeId, r: Reached) -> EdgeBuilder {
        walking_edge(source, r.goal, r.length, self.speed, r.path)
    }
}

/// Adds precomputed transfers to a compacted graph.
/// Transfers duplicating an existing edge are skipped.
pub fn add_transfers(g: Graph, transfers: Vec<EdgeBuilder>) -> Result<Graph> {
    let mut tg = TempGraph::from_graph(g)?;
    let mut skipped = 0;

    for e in transfers {
        if tg.has_edge(e.from, e.to) {
            skipped += 1;
        } else {
            tg.add_edge(e)?;
        }
    }

    if skipped > 0 {
        debug!("skipped {skipped} transfer(s) duplicating existing edges");
    }
    tg.compact()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snap::snap_stops;
    use crate::{EdgeKind, Location, ModeSet, NodeBuilder, NodeKind, StopInfo, TempId, Wheelchair};

    fn stop_kind(stop_id: &str) -> NodeKind {
        NodeKind::Stop(StopInfo {
            stop_id: stop_id.to_string(),
            name: stop_id.to_string(),
            zone: None,
            wheelchair: Wheelchair::Unknown,
        })
    }

    fn options() -> Options {
        Options {
            max_snap_distance: 50.0,
            max_transfer_length: 200,
            walk_speed: 1.0,
            worker_threads: 2,
            max_in_flight: 2,
            ..Options::default()
        }
    }

    /// Road line 0-1-2-3-4 (~68 m segments), with stops 5, 6 and 7 next to road nodes 0, 2 and 4,
    /// and stop 8 far away from everything.
    fn sample() -> Graph {
        let mut g = TempGraph::new();
        for id in 0..5 {
            g.add_node(NodeBuilder::new(
                id,
                id as i64,
                Location::new(52.0, 21.0 + id as f64 * 0.001, 0.0),
                NodeKind::road(),
            ))
            .unwrap();
        }
        for (id, road, name) in [(5, 0, "A"), (6, 2, "B"), (7, 4, "C")] {
            g.add_node(NodeBuilder::new(
                id,
                -(id as i64),
                Location::new(52.0001, 21.0 + road as f64 * 0.001, 0.0),
                stop_kind(name),
            ))
            .unwrap();
        }
        g.add_node(NodeBuilder::new(8, -8, Location::new(53.0, 21.0, 0.0), stop_kind("D")))
            .unwrap();

        for id in 0..4 {
            g.add_edge(EdgeBuilder::road(id, id + 1, 68, 50, 1, ModeSet::ROAD))
                .unwrap();
            g.add_edge(EdgeBuilder::road(id + 1, id, 68, 50, 1, ModeSet::ROAD))
                .unwrap();
        }

        snap_stops(&mut g, &options()).unwrap();
        g.compact().unwrap()
    }

    #[test]
    fn sources_are_snapped_stops() {
        let g = sample();
        assert_eq!(TransferPrecomputer::sources(&g), vec![5, 6, 7]);
    }

    #[test]
    fn finds_transfers_between_nearby_stops() {
        let g = sample();
        let (edges, stats) = TransferPrecomputer::new(&options()).run(&g).unwrap();
        assert_eq!(
            stats,
            TransferStats {
                sources: 3,
                failed: 0,
                transfers: 4,
            },
        );

        // A-C is 11 + 4 * 68 + 11 = 294 m long, over the limit
        let mut pairs: Vec<(TempId, TempId)> = edges.iter().map(|e| (e.from, e.to)).collect();
        pairs.sort();
        assert_eq!(pairs, vec![(5, 6), (6, 5), (6, 7), (7, 6)]);

        let a_b = edges.iter().find(|e| (e.from, e.to) == (5, 6)).unwrap();
        assert_eq!(a_b.length, 11 + 68 + 68 + 11);
        match &a_b.kind {
            EdgeKind::Virtual { time, path, .. } => {
                assert_eq!(*time, a_b.length);
                assert_eq!(path, &vec![5, 0, 1, 2, 6]);
            }
            other => panic!("expected a virtual edge, got {other:?}"),
        }
    }

    #[test]
    fn failed_sources_are_dropped() {
        let g = sample();
        let opts = Options {
            step_limit: 2,
            ..options()
        };
        let (edges, stats) = TransferPrecomputer::new(&opts).run(&g).unwrap();
        assert_eq!(stats.failed, 3);
        assert!(edges.is_empty());
    }

    #[test]
    fn transfers_are_added_to_graph() {
        let g = sample();
        let edge_count = g.edge_count();
        let (edges, _) = TransferPrecomputer::new(&options()).run(&g).unwrap();

        let mut with_duplicate = edges.clone();
        with_duplicate.push(edges[0].clone());

        let g = add_transfers(g, with_duplicate).unwrap();
        assert_eq!(g.edge_count(), edge_count + edges.len());
        assert!(g.validate().is_ok());
        assert!(g.edge_between(5, 6).is_some());
    }
}
