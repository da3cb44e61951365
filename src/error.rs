// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::io;
use std::sync::Arc;

use crate::TempId;

/// Error conditions which abort graph construction.
///
/// Construction errors (duplicate or dangling references) and consistency violations
/// (broken internal invariants) are both fatal. Recoverable data quality problems are
/// never reported through this type - they are logged and the offending entity is skipped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("node {0} already exists")]
    DuplicateNode(TempId),

    #[error("edge {0} -> {1} already exists")]
    DuplicateEdge(TempId, TempId),

    #[error("edge {from} -> {to} references missing node {missing}")]
    MissingEndpoint {
        from: TempId,
        to: TempId,
        missing: TempId,
    },

    #[error("edge {0} -> {1} does not exist")]
    MissingEdge(TempId, TempId),

    #[error("node {0} does not exist")]
    MissingNode(TempId),

    #[error("temporary node ids are not dense: {0} was never inserted")]
    IdGap(TempId),

    #[error("temporary node id {id} is too far past the next free id {next}")]
    IdTooFar { id: TempId, next: TempId },

    #[error("route node {route} references stop {stop}, which was not inserted before it")]
    UnresolvedStop { route: TempId, stop: TempId },

    #[error("node {id} can't be removed: it still has {incident} incident edge(s)")]
    NodeStillConnected { id: TempId, incident: usize },

    #[error("run {from}..{to} can't be joined at node {at}")]
    RunEndpointMismatch {
        from: TempId,
        to: TempId,
        at: TempId,
    },

    #[error("both pairings of node {0} form a valid two-way chain")]
    AmbiguousPairing(TempId),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("io: {0}")]
    Io(#[from] Arc<io::Error>),

    #[error("not a graph cache file")]
    BadMagic,

    #[error("unsupported graph cache version: {0}")]
    UnsupportedVersion(u16),

    #[error("corrupted graph cache: {0}")]
    Corrupted(&'static str),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
