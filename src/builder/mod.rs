// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Mutable graph representation used during import and consolidation.

mod compact;
mod temp_graph;

pub use temp_graph::TempGraph;

use crate::{Edge, EdgeKind, Location, ModeSet, Node, NodeId, NodeKind, TempId, TravelMode};

/// Node of a [TempGraph], identified by a dense temporary id.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBuilder {
    pub temp_id: TempId,
    pub source_id: i64,
    pub location: Location,
    pub kind: NodeKind,
}

impl NodeBuilder {
    pub fn new(temp_id: TempId, source_id: i64, location: Location, kind: NodeKind) -> Self {
        Self {
            temp_id,
            source_id,
            location,
            kind,
        }
    }

    /// Returns true if the node is a plain road node, which may be removed
    /// by chain simplification.
    pub fn is_pass_through(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Road {
                park_and_ride: false,
                bike_share: false,
            }
        )
    }

    /// Turns the builder into an immutable [Node]. `stop` must be the final id of the
    /// referenced stop for route nodes, and is ignored otherwise.
    pub(crate) fn finalize(self, id: NodeId, stop: Option<NodeId>) -> Node {
        let kind = match (self.kind, stop) {
            (NodeKind::Route { route_id, .. }, Some(stop)) => NodeKind::Route { route_id, stop },
            (kind, _) => kind,
        };

        Node {
            id,
            source_id: self.source_id,
            location: self.location,
            kind,
        }
    }
}

/// Edge of a [TempGraph], connecting two temporary node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeBuilder {
    pub from: TempId,
    pub to: TempId,

    /// Length, in meters.
    pub length: u32,

    pub kind: EdgeKind,
}

impl EdgeBuilder {
    pub fn new(from: TempId, to: TempId, length: u32, kind: EdgeKind) -> Self {
        Self {
            from,
            to,
            length,
            kind,
        }
    }

    /// Creates a road edge.
    pub fn road(
        from: TempId,
        to: TempId,
        length: u32,
        max_speed: u16,
        way_id: i64,
        modes: ModeSet,
    ) -> Self {
        Self::new(
            from,
            to,
            length,
            EdgeKind::Road {
                max_speed,
                way_id,
                modes,
            },
        )
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn is_feasible(&self, mode: TravelMode) -> bool {
        self.kind.is_feasible(mode)
    }

    /// Turns the builder into an immutable [Edge] between final node ids.
    /// Temporary ids stored in a virtual edge's path are translated with `resolve`;
    /// path entries which no longer exist are dropped.
    pub(crate) fn finalize<F>(self, from: NodeId, to: NodeId, resolve: F) -> Edge
    where
        F: Fn(TempId) -> Option<NodeId>,
    {
        let kind = match self.kind {
            EdgeKind::Virtual {
                time,
                speed,
                mode,
                path,
            } => EdgeKind::Virtual {
                time,
                speed,
                mode,
                path: path.into_iter().filter_map(&resolve).collect(),
            },
            other => other,
        };

        Edge {
            from,
            to,
            length: self.length,
            kind,
        }
    }
}
