// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Turning records from upstream road network and schedule readers into [TempGraph](crate::TempGraph) elements.
//!
//! Readers push records one by one through the [RoadHandler] and [TransitHandler] traits.
//! Problems with individual records (e.g. references to unknown entities) are logged
//! and the offending record is skipped.

mod model;
mod road;
mod transit;

pub use model::{DepartureRecord, RoadNodeRecord, RouteStopRecord, StopRecord, WayRecord};
pub use road::RoadGraphBuilder;
pub use transit::TransitGraphBuilder;

use crate::Result;

/// Receiver of road network records. All nodes should be pushed before the ways using them.
pub trait RoadHandler {
    fn node(&mut self, n: RoadNodeRecord) -> Result<()>;
    fn way(&mut self, w: WayRecord) -> Result<()>;
}

/// Receiver of public transport schedule records. Stops must be pushed before
/// any route stops referencing them, and route stops before any departures between them.
pub trait TransitHandler {
    fn stop(&mut self, s: StopRecord) -> Result<()>;
    fn route_stop(&mut self, r: RouteStopRecord) -> Result<()>;
    fn departure(&mut self, d: DepartureRecord) -> Result<()>;
}
