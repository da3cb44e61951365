// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use log::{info, warn};

use crate::{
    earth_distance, ConflictPolicy, EdgeBuilder, EdgeKind, KdTree, Options, Result, TempGraph,
    TempId, TravelMode,
};

/// Summary of [snap_stops].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnapStats {
    pub snapped: usize,
    pub unmapped: usize,
}

/// Creates a walking connection between two nodes, `length` meters long.
pub(crate) fn walking_edge(
    from: TempId,
    to: TempId,
    length: u32,
    speed: f32,
    path: Vec<TempId>,
) -> EdgeBuilder {
    EdgeBuilder::new(
        from,
        to,
        length,
        EdgeKind::Virtual {
            time: (length as f32 / speed).round() as u32,
            speed,
            mode: TravelMode::Foot,
            path,
        },
    )
}

/// Returns true if a road node can be entered or left on foot.
fn is_walkable(g: &TempGraph, id: TempId) -> bool {
    g.outgoing(id).any(|e| e.is_feasible(TravelMode::Foot))
        || g.incoming(id).any(|e| e.is_feasible(TravelMode::Foot))
}

/// Connects every stop to its nearest walkable road node.
///
/// A stop is connected with two [EdgeKind::Virtual] foot edges (stop to node and node to stop),
/// with the length of the great-circle distance between them, but no shorter than
/// [Options::min_connector_length]. Stops without any walkable node within
/// [Options::max_snap_distance] are left without any connections.
pub fn snap_stops(g: &mut TempGraph, options: &Options) -> Result<SnapStats> {
    let view: &TempGraph = g;
    let walkable: Vec<([f64; 2], TempId)> = view
        .nodes()
        .filter(|n| n.kind.is_road() && is_walkable(view, n.temp_id))
        .map(|n| (n.location.point(), n.temp_id))
        .collect();
    let index = KdTree::build(walkable, ConflictPolicy::KeepOldest);

    let stops: Vec<TempId> = g
        .nodes()
        .filter(|n| n.kind.is_stop())
        .map(|n| n.temp_id)
        .collect();

    let mut stats = SnapStats::default();
    for stop in stops {
        let Some(at) = g.node(stop).map(|n| n.location) else {
            continue;
        };

        let nearest = index
            .nearest(at.point())
            .and_then(|nb| g.node(*nb.value))
            .map(|n| {
                let distance = earth_distance(at.lat, at.lon, n.location.lat, n.location.lon);
                (n.temp_id, distance)
            })
            .filter(|&(_, distance)| distance <= options.max_snap_distance);

        let Some((node, distance)) = nearest else {
            warn!(
                "stop node {stop} is farther than {} m from any walkable road - leaving it unconnected",
                options.max_snap_distance,
            );
            stats.unmapped += 1;
            continue;
        };

        let length = (distance.round() as u32).max(options.min_connector_length);
        let speed = options.walk_speed;
        g.add_edge(walking_edge(stop, node, length, speed, vec![stop, node]))?;
        g.add_edge(walking_edge(node, stop, length, speed, vec![node, stop]))?;
        stats.snapped += 1;
    }

    info!(
        "snapped {} stop(s) to the road network, {} left unconnected",
        stats.snapped, stats.unmapped,
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Location, ModeSet, NodeBuilder, NodeKind, StopInfo, Wheelchair};

    fn stop_kind() -> NodeKind {
        NodeKind::Stop(StopInfo {
            stop_id: "S".to_string(),
            name: "Stop".to_string(),
            zone: None,
            wheelchair: Wheelchair::Unknown,
        })
    }

    /// Road nodes 0 and 1 (walkable), 2 (car only), and stops 3 (~34 m from 0) and 4 (~1.1 km away).
    fn sample() -> TempGraph {
        let mut g = TempGraph::new();
        let nodes = [
            (52.0, 21.0, NodeKind::road()),
            (52.0, 21.001, NodeKind::road()),
            (52.0003, 21.0, NodeKind::road()),
            (52.0, 20.9995, stop_kind()),
            (52.01, 21.0, stop_kind()),
        ];
        for (id, (lat, lon, kind)) in nodes.into_iter().enumerate() {
            g.add_node(NodeBuilder::new(
                id as TempId,
                id as i64,
                Location::new(lat, lon, 0.0),
                kind,
            ))
            .unwrap();
        }
        g.add_edge(EdgeBuilder::road(0, 1, 68, 50, 1, ModeSet::ROAD))
            .unwrap();
        g.add_edge(EdgeBuilder::road(2, 1, 40, 50, 2, ModeSet::CAR))
            .unwrap();
        g
    }

    fn options() -> Options {
        Options {
            max_snap_distance: 100.0,
            min_connector_length: 1,
            walk_speed: 1.5,
            ..Options::default()
        }
    }

    #[test]
    fn snaps_within_radius() {
        let mut g = sample();
        let stats = snap_stops(&mut g, &options()).unwrap();
        assert_eq!(stats, SnapStats { snapped: 1, unmapped: 1 });

        let to_road = g.edge(3, 0).unwrap();
        let from_road = g.edge(0, 3).unwrap();
        assert_eq!(to_road.length, from_road.length);
        assert_eq!(to_road.length, 34);
        assert_eq!(
            to_road.kind,
            EdgeKind::Virtual {
                time: 23,
                speed: 1.5,
                mode: TravelMode::Foot,
                path: vec![3, 0],
            },
        );
    }

    #[test]
    fn far_stops_are_unconnected() {
        let mut g = sample();
        snap_stops(&mut g, &options()).unwrap();
        assert_eq!(g.degree(4), 0);
    }

    #[test]
    fn unmapped_stops_get_no_edges() {
        let mut g = sample();
        let opts = Options {
            max_snap_distance: 10.0,
            ..options()
        };
        let stats = snap_stops(&mut g, &opts).unwrap();
        assert_eq!(stats.snapped, 0);
        assert_eq!(g.degree(3), 0);
        assert_eq!(g.degree(2), 1);
    }

    #[test]
    fn connectors_have_min_length() {
        let mut g = sample();
        let opts = Options {
            min_connector_length: 50,
            ..options()
        };
        snap_stops(&mut g, &opts).unwrap();
        assert_eq!(g.edge(3, 0).unwrap().length, 50);
        assert!(matches!(
            g.edge(3, 0).unwrap().kind,
            EdgeKind::Virtual { time: 33, .. }
        ));
    }
}
