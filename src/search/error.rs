// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Recommended number of allowed node expansions in [find_goals](crate::search::find_goals)
/// before [SearchError::StepLimitExceeded] is returned.
pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// Error conditions which may occur during [find_goals](crate::search::find_goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    /// The start node doesn't exist in a graph.
    InvalidReference(u32),

    /// Search has exceeded its limit of steps.
    ///
    /// The length limit usually keeps searches small, but dense graphs
    /// (or very generous limits) can still result in resource exhaustion.
    /// The step limit protects against that.
    StepLimitExceeded,
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidReference(node_id) => write!(f, "invalid node: {}", node_id),
            Self::StepLimitExceeded => write!(f, "step limit exceeded"),
        }
    }
}

impl std::error::Error for SearchError {}
