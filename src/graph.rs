// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::distance::project;
use crate::{Error, ModeSet, NodeId, Result, TravelMode};

/// Position of a [Node], both raw (WGS84) and projected onto the Web Mercator plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,

    /// Projected easting, in meters.
    pub x: f64,

    /// Projected northing, in meters.
    pub y: f64,

    /// Elevation above sea level, in meters. Zero if unknown.
    pub elevation: f32,
}

impl Location {
    pub fn new(lat: f64, lon: f64, elevation: f32) -> Self {
        let (x, y) = project(lat, lon);
        Self {
            lat,
            lon,
            x,
            y,
            elevation,
        }
    }

    /// Projected coordinates, as used by the [KdTree](crate::KdTree).
    #[inline]
    pub fn point(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Wheelchair accessibility of a transit stop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Wheelchair {
    #[default]
    Unknown = 0,
    Accessible = 1,
    Inaccessible = 2,
}

/// Attributes of a public transport stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInfo {
    pub stop_id: String,
    pub name: String,
    pub zone: Option<String>,
    pub wheelchair: Wheelchair,
}

/// Kind-specific attributes of a node.
///
/// `Route::stop` refers to another node by id: a temporary id while the node
/// lives in a [TempGraph](crate::TempGraph), a final [NodeId] once compacted.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Road { park_and_ride: bool, bike_share: bool },
    Stop(StopInfo),
    Route { route_id: String, stop: u32 },
}

impl NodeKind {
    pub fn road() -> Self {
        Self::Road {
            park_and_ride: false,
            bike_share: false,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop(_))
    }

    pub fn is_road(&self) -> bool {
        matches!(self, Self::Road { .. })
    }
}

/// A single scheduled trip over a route edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Departure {
    /// Departure time, in seconds since the start of the service day.
    pub time: u32,

    /// Travel time to the next stop, in seconds.
    pub duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InnerKind {
    /// From a stop onto a route.
    Board = 0,

    /// From a route onto a stop.
    Alight = 1,
}

/// Kind-specific attributes of an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// Part of the street network.
    Road {
        /// Speed limit, in km/h.
        max_speed: u16,
        way_id: i64,
        modes: ModeSet,
    },

    /// Connection between two consecutive stops of a route,
    /// with departures sorted by time.
    Route { departures: Vec<Departure> },

    /// Boarding or alighting a route at a stop.
    Inner { kind: InnerKind, duration: u32 },

    /// Synthetic connection absent from the source data, e.g. a walking transfer.
    Virtual {
        /// Travel time, in seconds, at `speed`.
        time: u32,

        /// Reference speed used to compute `time`, in meters per second.
        speed: f32,

        mode: TravelMode,

        /// Nodes traversed by this connection, including both endpoints.
        path: Vec<u32>,
    },
}

impl EdgeKind {
    /// Checks whether an edge of this kind may be used with the provided [TravelMode].
    pub fn is_feasible(&self, mode: TravelMode) -> bool {
        match self {
            Self::Road { modes, .. } => modes.contains(mode),
            Self::Route { .. } | Self::Inner { .. } => mode == TravelMode::Transit,
            Self::Virtual { mode: m, .. } => *m == mode,
        }
    }

    /// Checks whether two road edges can be merged into one: both need to be road edges
    /// with the same speed limit, mode set and way.
    pub fn is_mergeable_with(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Road {
                    max_speed: s1,
                    way_id: w1,
                    modes: m1,
                },
                Self::Road {
                    max_speed: s2,
                    way_id: w2,
                    modes: m2,
                },
            ) => s1 == s2 && w1 == w2 && m1 == m2,
            _ => false,
        }
    }
}

/// Element of the finished [Graph].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,

    /// Identifier of the feature this node was created from, e.g. an OSM node id.
    pub source_id: i64,

    pub location: Location,
    pub kind: NodeKind,
}

/// Directed connection between two [Nodes](Node) of the finished [Graph].
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,

    /// Length of the connection, in meters.
    pub length: u32,

    pub kind: EdgeKind,
}

/// Immutable multimodal network, with nodes indexed `0..n`
/// and edges stored in two compressed adjacency (CSR) tables.
///
/// Outgoing edges of node `i` are `edges[outgoing_offsets[i]..outgoing_offsets[i+1]]`,
/// sorted by target id. Incoming edges of node `i` are referenced by
/// `incoming[incoming_offsets[i]..incoming_offsets[i+1]]`, which hold indices into `edges`.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    outgoing_offsets: Vec<u32>,
    incoming_offsets: Vec<u32>,
    incoming: Vec<u32>,
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing_offsets: vec![0],
            incoming_offsets: vec![0],
            incoming: Vec::new(),
        }
    }
}

impl Graph {
    /// Assembles a graph from its raw tables, validating that they are consistent.
    pub fn from_parts(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        outgoing_offsets: Vec<u32>,
        incoming_offsets: Vec<u32>,
        incoming: Vec<u32>,
    ) -> Result<Self> {
        let g = Self {
            nodes,
            edges,
            outgoing_offsets,
            incoming_offsets,
            incoming,
        };
        g.validate()?;
        Ok(g)
    }

    /// Builds the incoming table for an already grouped outgoing table.
    pub(crate) fn from_outgoing(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        outgoing_offsets: Vec<u32>,
    ) -> Self {
        // Counting sort of edge indices by target; stable, so incoming edges
        // of every node end up sorted by source id.
        let mut incoming_offsets = vec![0_u32; nodes.len() + 1];
        for e in &edges {
            incoming_offsets[e.to as usize + 1] += 1;
        }
        for i in 1..incoming_offsets.len() {
            incoming_offsets[i] += incoming_offsets[i - 1];
        }

        let mut cursor = incoming_offsets.clone();
        let mut incoming = vec![0_u32; edges.len()];
        for (idx, e) in edges.iter().enumerate() {
            let slot = &mut cursor[e.to as usize];
            incoming[*slot as usize] = idx as u32;
            *slot += 1;
        }

        Self {
            nodes,
            edges,
            outgoing_offsets,
            incoming_offsets,
            incoming,
        }
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns all [Nodes](Node), indexed by their id.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns all [Edges](Edge), grouped by their source node.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Retrieves a [Node] with the provided id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// Gets all outgoing [Edges](Edge) from a node with a given id.
    pub fn outgoing(&self, id: NodeId) -> &[Edge] {
        let id = id as usize;
        if id + 1 >= self.outgoing_offsets.len() {
            return &[];
        }
        let start = self.outgoing_offsets[id] as usize;
        let end = self.outgoing_offsets[id + 1] as usize;
        &self.edges[start..end]
    }

    /// Gets all incoming [Edges](Edge) to a node with a given id.
    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        let id = id as usize;
        let range = if id + 1 < self.incoming_offsets.len() {
            self.incoming_offsets[id] as usize..self.incoming_offsets[id + 1] as usize
        } else {
            0..0
        };
        self.incoming[range]
            .iter()
            .map(move |&idx| &self.edges[idx as usize])
    }

    /// Gets the edge from one node to another, if it exists.
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<&Edge> {
        let edges = self.outgoing(from);
        edges
            .binary_search_by_key(&to, |e| e.to)
            .ok()
            .map(|idx| &edges[idx])
    }

    pub fn outgoing_offsets(&self) -> &[u32] {
        &self.outgoing_offsets
    }

    pub fn incoming_offsets(&self) -> &[u32] {
        &self.incoming_offsets
    }

    /// Indices into [Graph::edges] grouped by target node.
    pub fn incoming_edge_indices(&self) -> &[u32] {
        &self.incoming
    }

    pub(crate) fn into_parts(self) -> (Vec<Node>, Vec<Edge>) {
        (self.nodes, self.edges)
    }

    /// Checks that both adjacency tables are consistent with the node and edge lists.
    pub fn validate(&self) -> Result<()> {
        let n = self.nodes.len();
        let m = self.edges.len();

        if self.nodes.iter().enumerate().any(|(i, nd)| nd.id as usize != i) {
            return Err(Error::Corrupted("node ids are not sequential"));
        }

        check_offsets(&self.outgoing_offsets, n, m)?;
        check_offsets(&self.incoming_offsets, n, m)?;
        if self.incoming.len() != m {
            return Err(Error::Corrupted("incoming table has a wrong length"));
        }

        for from in 0..n {
            let edges = self.outgoing(from as NodeId);
            if edges.iter().any(|e| e.from as usize != from || e.to as usize >= n) {
                return Err(Error::Corrupted("edge stored under a wrong node"));
            }
            if edges.windows(2).any(|pair| pair[0].to >= pair[1].to) {
                return Err(Error::Corrupted("outgoing edges are not sorted by target"));
            }
        }

        for to in 0..n {
            let start = self.incoming_offsets[to] as usize;
            let end = self.incoming_offsets[to + 1] as usize;
            for &idx in &self.incoming[start..end] {
                match self.edges.get(idx as usize) {
                    Some(e) if e.to as usize == to => {}
                    _ => return Err(Error::Corrupted("incoming edge stored under a wrong node")),
                }
            }
        }

        for nd in &self.nodes {
            if let NodeKind::Route { stop, .. } = nd.kind {
                if !self.node(stop).is_some_and(|s| s.kind.is_stop()) {
                    return Err(Error::Corrupted("route node references a non-stop node"));
                }
            }
        }

        Ok(())
    }
}

fn check_offsets(offsets: &[u32], n: usize, m: usize) -> Result<()> {
    if offsets.len() != n + 1 || offsets[0] != 0 || offsets[n] as usize != m {
        return Err(Error::Corrupted("offset table does not cover all edges"));
    }
    if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(Error::Corrupted("offset table is not monotonic"));
    }
    Ok(())
}
