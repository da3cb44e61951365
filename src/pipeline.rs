// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashSet;

use log::info;

use crate::components::prune_minor_components;
use crate::import::{RoadGraphBuilder, RoadHandler, TransitGraphBuilder, TransitHandler};
use crate::search::DEFAULT_STEP_LIMIT;
use crate::simplify::ChainSimplifier;
use crate::snap::snap_stops;
use crate::transfers::{add_transfers, TransferPrecomputer};
use crate::{Graph, ModeSet, Result, TempGraph, TempId};

/// Additional controls for building a multimodal [Graph].
#[derive(Debug, Clone)]
pub struct Options {
    /// Travel modes for which the road network should be kept. Road edges usable only
    /// by other modes, and parts of the network outside of the main strongly connected
    /// component of every mode, are removed.
    pub allowed_modes: ModeSet,

    /// Should chains of pass-through road nodes be merged into single edges?
    pub simplify: bool,

    /// Source ids of road nodes which must never be removed by simplification.
    pub pinned: Vec<i64>,

    /// Max distance between a stop and the road node it's connected to, in meters.
    pub max_snap_distance: f64,

    /// Min length of a stop-road connection, in meters. Avoids zero-length (and zero-time) edges.
    pub min_connector_length: u32,

    /// Reference walking speed, in meters per second.
    pub walk_speed: f32,

    /// Max length of a walking transfer between two stops, in meters.
    pub max_transfer_length: u32,

    /// Number of threads used to compute transfers. 0 lets rayon decide.
    pub worker_threads: usize,

    /// Max number of transfer searches computed before their results are merged.
    pub max_in_flight: usize,

    /// Max number of nodes expanded by a single transfer search.
    pub step_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allowed_modes: ModeSet::ROAD,
            simplify: true,
            pinned: Vec::new(),
            max_snap_distance: 100.0,
            min_connector_length: 1,
            walk_speed: 1.4,
            max_transfer_length: 500,
            worker_threads: 0,
            max_in_flight: 20,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

fn pinned_temp_ids(g: &TempGraph, pinned: &[i64]) -> Vec<TempId> {
    let pinned: HashSet<i64> = pinned.iter().copied().collect();
    g.nodes()
        .filter(|n| pinned.contains(&n.source_id))
        .map(|n| n.temp_id)
        .collect()
}

/// Builds the road network [Graph] from records pushed by `feed` into a [RoadHandler].
///
/// The network is restricted to the main components of [Options::allowed_modes]
/// and, if [Options::simplify] is set, chains of pass-through nodes are merged.
pub fn build_road_graph<F>(options: &Options, feed: F) -> Result<Graph>
where
    F: FnOnce(&mut dyn RoadHandler) -> Result<()>,
{
    let mut g = TempGraph::new();
    let mut builder = RoadGraphBuilder::new(&mut g);
    feed(&mut builder)?;
    builder.finish()?;
    info!("loaded {} road nodes and {} edges", g.len(), g.edge_count());

    prune_minor_components(&mut g, options.allowed_modes & ModeSet::ROAD);

    if options.simplify {
        let pinned = pinned_temp_ids(&g, &options.pinned);
        ChainSimplifier::with_pinned(pinned).simplify(&mut g)?;
    }

    g.compact()
}

/// Merges public transport data, pushed by `feed` into a [TransitHandler], into a road [Graph].
///
/// Stops are connected to the road network, and walking transfers between nearby stops
/// are precomputed.
pub fn add_transit<F>(road: Graph, options: &Options, feed: F) -> Result<Graph>
where
    F: FnOnce(&mut dyn TransitHandler) -> Result<()>,
{
    let mut g = TempGraph::from_graph(road)?;
    let mut builder = TransitGraphBuilder::new(&mut g);
    feed(&mut builder)?;
    builder.finish()?;

    snap_stops(&mut g, options)?;
    let g = g.compact()?;

    let (transfers, _) = TransferPrecomputer::new(options).run(&g)?;
    let g = add_transfers(g, transfers)?;
    info!("built graph with {} nodes and {} edges", g.len(), g.edge_count());
    Ok(g)
}

/// Builds a multimodal [Graph], see [build_road_graph] and [add_transit].
pub fn build_graph<R, T>(options: &Options, road: R, transit: T) -> Result<Graph>
where
    R: FnOnce(&mut dyn RoadHandler) -> Result<()>,
    T: FnOnce(&mut dyn TransitHandler) -> Result<()>,
{
    let g = build_road_graph(options, road)?;
    add_transit(g, options, transit)
}
