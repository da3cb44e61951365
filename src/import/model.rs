// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{ModeSet, Wheelchair};

/// Road network node, as emitted by an upstream (e.g. OSM) reader.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadNodeRecord {
    pub source_id: i64,
    pub lat: f64,
    pub lon: f64,

    /// Elevation above sea level, in meters. Zero if unknown.
    pub elevation: f32,

    pub park_and_ride: bool,
    pub bike_share: bool,
}

/// Road network way, with travel modes and speed already evaluated from its tags.
#[derive(Debug, Clone, PartialEq)]
pub struct WayRecord {
    pub way_id: i64,

    /// Source ids of nodes along the way.
    pub nodes: Vec<i64>,

    /// Speed limit, in km/h.
    pub max_speed: u16,

    /// Modes permitted to travel in the way's direction.
    pub forward: ModeSet,

    /// Modes permitted to travel against the way's direction.
    pub backward: ModeSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopRecord {
    pub stop_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub zone: Option<String>,
    pub wheelchair: Wheelchair,
}

/// Declares that a route calls at a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStopRecord {
    pub route_id: String,
    pub stop_id: String,
}

/// A single trip segment between two consecutive stops of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartureRecord {
    pub route_id: String,
    pub from_stop: String,
    pub to_stop: String,

    /// Departure time from `from_stop`, in seconds since the start of the service day.
    pub time: u32,

    /// Travel time to `to_stop`, in seconds.
    pub duration: u32,
}
