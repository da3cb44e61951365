// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Construction and consolidation of multimodal routing graphs.
//!
//! A road network (pushed through a [RoadHandler](import::RoadHandler)) is loaded into a mutable
//! [TempGraph], restricted to its main [strongly connected components](components)
//! and [simplified](simplify) by merging chains of pass-through nodes. Public transport
//! schedules (pushed through a [TransitHandler](import::TransitHandler)) are then merged in,
//! stops are [snapped](snap) to the nearest walkable road nodes and
//! [walking transfers](transfers) between nearby stops are precomputed.
//!
//! The result is an immutable, compact [Graph] with nodes numbered `0..n`, which can be
//! [cached](cache) on disk.
//!
//! # Example
//!
//! ```no_run
//! use mmgraph::import::{RoadHandler, TransitHandler};
//!
//! fn read_roads(h: &mut dyn RoadHandler) -> mmgraph::Result<()> {
//!     // h.node(...)?; h.way(...)?;
//!     Ok(())
//! }
//!
//! fn read_schedules(h: &mut dyn TransitHandler) -> mmgraph::Result<()> {
//!     // h.stop(...)?; h.route_stop(...)?; h.departure(...)?;
//!     Ok(())
//! }
//!
//! let options = mmgraph::Options::default();
//! let g = mmgraph::build_graph(&options, read_roads, read_schedules)
//!     .expect("failed to build the graph");
//! mmgraph::cache::write_graph_to_file(&g, "graph.bin.gz").expect("failed to save the graph");
//! ```

pub mod builder;
pub mod cache;
pub mod components;
mod distance;
mod error;
mod graph;
pub mod import;
mod kd;
mod mode;
mod pipeline;
pub mod search;
pub mod simplify;
pub mod snap;
pub mod transfers;

pub use builder::{EdgeBuilder, NodeBuilder, TempGraph};
pub use distance::{earth_distance, project};
pub use error::{Error, Result};
pub use graph::{
    Departure, Edge, EdgeKind, Graph, InnerKind, Location, Node, NodeKind, StopInfo, Wheelchair,
};
pub use kd::{ConflictPolicy, InsertOutcome, KdTree, Neighbor};
pub use mode::{ModeSet, TravelMode};
pub use pipeline::{add_transit, build_graph, build_road_graph, Options};
pub use search::DEFAULT_STEP_LIMIT;

/// Identifier of a node in a [TempGraph]. Temporary ids must be dense, that is
/// form the range `0..n` (with gaps only left by removed nodes), before the graph is compacted.
pub type TempId = u32;

/// Identifier of a node in a compacted [Graph], equal to the node's index.
pub type NodeId = u32;
