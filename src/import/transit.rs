// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use super::{DepartureRecord, RouteStopRecord, StopRecord, TransitHandler};
use crate::{
    earth_distance, Departure, EdgeBuilder, EdgeKind, InnerKind, Location, NodeBuilder, NodeKind,
    Result, StopInfo, TempGraph, TempId,
};

/// Helper object used for converting public transport schedules into [TempGraph] nodes and edges.
///
/// Every stop becomes a [NodeKind::Stop] node. Every route calling at a stop gets its own
/// [NodeKind::Route] node, connected to the stop with a board and an alight edge. Departures
/// between consecutive stops of a route are collected into a single [EdgeKind::Route] edge.
///
/// Transit nodes don't have numeric source ids; they get consecutive negative ids instead.
pub struct TransitGraphBuilder<'a> {
    g: &'a mut TempGraph,
    stops: HashMap<String, TempId>,
    route_nodes: HashMap<(String, String), TempId>,
    departures: BTreeMap<(TempId, TempId), Vec<Departure>>,
    next_source_id: i64,
    board_duration: u32,
    alight_duration: u32,
}

impl<'a> TransitGraphBuilder<'a> {
    pub fn new(g: &'a mut TempGraph) -> Self {
        Self {
            g,
            stops: HashMap::default(),
            route_nodes: HashMap::default(),
            departures: BTreeMap::default(),
            next_source_id: -1,
            board_duration: 0,
            alight_duration: 0,
        }
    }

    /// Sets the time (in seconds) needed to board and to alight a vehicle.
    pub fn with_inner_durations(mut self, board: u32, alight: u32) -> Self {
        self.board_duration = board;
        self.alight_duration = alight;
        self
    }

    /// Returns the temporary id of a stop node.
    pub fn stop_node(&self, stop_id: &str) -> Option<TempId> {
        self.stops.get(stop_id).copied()
    }

    /// Returns the temporary id of a route node.
    pub fn route_node(&self, route_id: &str, stop_id: &str) -> Option<TempId> {
        self.route_nodes
            .get(&(route_id.to_string(), stop_id.to_string()))
            .copied()
    }

    fn add_node(&mut self, location: Location, kind: NodeKind) -> Result<TempId> {
        let id = self.g.next_temp_id();
        self.g
            .add_node(NodeBuilder::new(id, self.next_source_id, location, kind))?;
        self.next_source_id -= 1;
        Ok(id)
    }

    fn location(&self, id: TempId) -> Option<Location> {
        self.g.node(id).map(|n| n.location)
    }

    /// Creates route edges from all collected departures, returning their count.
    pub fn finish(self) -> Result<usize> {
        let count = self.departures.len();

        for ((from, to), mut departures) in self.departures {
            let (Some(a), Some(b)) = (self.g.node(from), self.g.node(to)) else {
                continue;
            };
            let (a, b) = (a.location, b.location);
            let length = earth_distance(a.lat, a.lon, b.lat, b.lon).round() as u32;

            departures.sort();
            self.g
                .add_edge(EdgeBuilder::new(from, to, length, EdgeKind::Route { departures }))?;
        }

        debug!("created {count} route edge(s)");
        Ok(count)
    }
}

impl TransitHandler for TransitGraphBuilder<'_> {
    fn stop(&mut self, s: StopRecord) -> Result<()> {
        if self.stops.contains_key(&s.stop_id) {
            warn!("duplicate stop {} - ignoring", s.stop_id);
            return Ok(());
        }

        let id = self.add_node(
            Location::new(s.lat, s.lon, 0.0),
            NodeKind::Stop(StopInfo {
                stop_id: s.stop_id.clone(),
                name: s.name,
                zone: s.zone,
                wheelchair: s.wheelchair,
            }),
        )?;
        self.stops.insert(s.stop_id, id);
        Ok(())
    }

    fn route_stop(&mut self, r: RouteStopRecord) -> Result<()> {
        let Some(stop) = self.stop_node(&r.stop_id) else {
            warn!("route {} calls at unknown stop {} - ignoring", r.route_id, r.stop_id);
            return Ok(());
        };

        let key = (r.route_id, r.stop_id);
        if self.route_nodes.contains_key(&key) {
            return Ok(());
        }

        let Some(location) = self.location(stop) else {
            return Ok(());
        };
        let route = self.add_node(
            location,
            NodeKind::Route {
                route_id: key.0.clone(),
                stop,
            },
        )?;

        let board = EdgeKind::Inner {
            kind: InnerKind::Board,
            duration: self.board_duration,
        };
        let alight = EdgeKind::Inner {
            kind: InnerKind::Alight,
            duration: self.alight_duration,
        };
        self.g.add_edge(EdgeBuilder::new(stop, route, 0, board))?;
        self.g.add_edge(EdgeBuilder::new(route, stop, 0, alight))?;

        self.route_nodes.insert(key, route);
        Ok(())
    }

    fn departure(&mut self, d: DepartureRecord) -> Result<()> {
        let from = self.route_node(&d.route_id, &d.from_stop);
        let to = self.route_node(&d.route_id, &d.to_stop);

        match (from, to) {
            (Some(from), Some(to)) if from != to => {
                self.departures
                    .entry((from, to))
                    .or_default()
                    .push(Departure {
                        time: d.time,
                        duration: d.duration,
                    });
            }
            _ => warn!(
                "departure of route {} from {} to {} references unknown route stops - ignoring",
                d.route_id, d.from_stop, d.to_stop,
            ),
        }
        Ok(())
    }
}
