// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};

use super::{RoadHandler, RoadNodeRecord, WayRecord};
use crate::{
    earth_distance, EdgeBuilder, EdgeKind, Location, ModeSet, NodeBuilder, NodeKind, Result,
    TempGraph, TempId,
};

/// Helper object used for converting road network records into [TempGraph] nodes and edges.
///
/// Every consecutive pair of nodes of a way becomes a road edge in each permitted direction,
/// with the length equal to the great-circle distance between the nodes. If two ways connect
/// the same pair of nodes, the first edge is kept and travel modes of both are combined.
pub struct RoadGraphBuilder<'a> {
    g: &'a mut TempGraph,
    by_source: HashMap<i64, TempId>,
    unused_nodes: BTreeSet<TempId>,
}

impl<'a> RoadGraphBuilder<'a> {
    pub fn new(g: &'a mut TempGraph) -> Self {
        Self {
            g,
            by_source: HashMap::default(),
            unused_nodes: BTreeSet::default(),
        }
    }

    /// Returns the temporary id assigned to a node with the provided source id.
    pub fn temp_id(&self, source_id: i64) -> Option<TempId> {
        self.by_source.get(&source_id).copied()
    }

    /// Removes nodes which weren't used by any way, returning their count.
    pub fn finish(self) -> Result<usize> {
        let count = self.unused_nodes.len();
        for id in self.unused_nodes {
            self.g.remove_node(id)?;
        }
        debug!("removed {count} road node(s) without any ways");
        Ok(count)
    }

    fn way_nodes(&self, w: &WayRecord) -> Vec<TempId> {
        // Remove references to unknown nodes and immediate repetitions
        let mut nodes: Vec<TempId> = w
            .nodes
            .iter()
            .filter_map(|source_id| self.temp_id(*source_id))
            .collect();
        nodes.dedup();
        nodes
    }

    fn create_edge(&mut self, from: TempId, to: TempId, w: &WayRecord, modes: ModeSet) -> Result<()> {
        let (Some(a), Some(b)) = (self.g.node(from), self.g.node(to)) else {
            return Ok(());
        };
        let length = earth_distance(a.location.lat, a.location.lon, b.location.lat, b.location.lon);
        let edge = EdgeBuilder::road(from, to, length.round() as u32, w.max_speed, w.way_id, modes);

        self.g.merge_edge(edge, |existing, new| {
            if let (
                EdgeKind::Road { modes: old, .. },
                EdgeKind::Road { modes: added, .. },
            ) = (&mut existing.kind, new.kind)
            {
                *old |= added;
            }
        })
    }
}

impl RoadHandler for RoadGraphBuilder<'_> {
    fn node(&mut self, n: RoadNodeRecord) -> Result<()> {
        if self.by_source.contains_key(&n.source_id) {
            warn!("duplicate road node {} - ignoring", n.source_id);
            return Ok(());
        }

        let id = self.g.next_temp_id();
        self.g.add_node(NodeBuilder::new(
            id,
            n.source_id,
            Location::new(n.lat, n.lon, n.elevation),
            NodeKind::Road {
                park_and_ride: n.park_and_ride,
                bike_share: n.bike_share,
            },
        ))?;
        self.by_source.insert(n.source_id, id);
        self.unused_nodes.insert(id);
        Ok(())
    }

    fn way(&mut self, w: WayRecord) -> Result<()> {
        if w.forward.is_empty() && w.backward.is_empty() {
            return Ok(());
        }

        let nodes = self.way_nodes(&w);
        if nodes.len() < 2 {
            warn!("way {} has less than 2 known nodes - ignoring", w.way_id);
            return Ok(());
        }

        for pair in nodes.windows(2) {
            if !w.forward.is_empty() {
                self.create_edge(pair[0], pair[1], &w, w.forward)?;
            }
            if !w.backward.is_empty() {
                self.create_edge(pair[1], pair[0], &w, w.backward)?;
            }
        }

        for id in nodes {
            self.unused_nodes.remove(&id);
        }
        Ok(())
    }
}
