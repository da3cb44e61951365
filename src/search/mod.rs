// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

mod dijkstra;
mod error;

pub use dijkstra::{find_goals, Reached, SearchLimits};
pub use error::{SearchError, DEFAULT_STEP_LIMIT};
