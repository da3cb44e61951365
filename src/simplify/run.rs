// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::VecDeque;

use crate::{Error, Result, TempId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    /// Chain traversable only from `from` to `to`.
    OneWay,

    /// Chain traversable in both directions.
    TwoWay,
}

/// A pending merge: a chain of interior nodes to be removed
/// between two boundary nodes which stay in the graph.
///
/// All operations consume the run and check that the joined ends actually
/// meet, returning [Error::RunEndpointMismatch] otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub kind: RunKind,
    pub from: TempId,
    pub interior: VecDeque<TempId>,
    pub to: TempId,
}

impl Run {
    pub fn new(kind: RunKind, from: TempId, removed: TempId, to: TempId) -> Self {
        Self {
            kind,
            from,
            interior: VecDeque::from([removed]),
            to,
        }
    }

    /// A run starting and ending at the same node.
    #[inline]
    pub fn is_circle(&self) -> bool {
        self.from == self.to
    }

    /// Number of edges in the chain.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.interior.len() + 1
    }

    /// All nodes of the chain, including both boundaries.
    pub fn chain(&self) -> impl Iterator<Item = TempId> + '_ {
        std::iter::once(self.from)
            .chain(self.interior.iter().copied())
            .chain(std::iter::once(self.to))
    }

    /// Node of the chain adjacent to the given boundary.
    pub fn neighbor_of(&self, boundary: TempId) -> Option<TempId> {
        if self.to == boundary {
            self.interior.back().copied()
        } else if self.from == boundary {
            self.interior.front().copied()
        } else {
            None
        }
    }

    fn mismatch(&self, at: TempId) -> Error {
        Error::RunEndpointMismatch {
            from: self.from,
            to: self.to,
            at,
        }
    }

    /// Swaps the direction of the run.
    pub fn reversed(mut self) -> Self {
        std::mem::swap(&mut self.from, &mut self.to);
        self.interior.make_contiguous().reverse();
        self
    }

    /// Absorbs the boundary `removed` as an interior node,
    /// moving that end of the run to `new_end`.
    pub fn add(mut self, removed: TempId, new_end: TempId) -> Result<Self> {
        if self.to == removed {
            self.interior.push_back(removed);
            self.to = new_end;
        } else if self.from == removed {
            self.interior.push_front(removed);
            self.from = new_end;
        } else {
            return Err(self.mismatch(removed));
        }
        Ok(self)
    }

    /// Joins `self.to == other.from` (→·→). The shared boundary becomes an interior node.
    pub fn append(mut self, other: Run) -> Result<Self> {
        if self.to != other.from {
            return Err(self.mismatch(other.from));
        }
        self.interior.push_back(self.to);
        self.interior.extend(other.interior);
        self.to = other.to;
        Ok(self)
    }

    /// Joins `self.to == other.to` (→·←). The shared boundary becomes an interior node.
    pub fn append_reversed(self, other: Run) -> Result<Self> {
        if self.to != other.to {
            return Err(self.mismatch(other.to));
        }
        self.append(other.reversed())
    }

    /// Joins `self.from == other.from` (←·→). The shared boundary becomes an interior node,
    /// and the result starts at the far end of `other`.
    pub fn prepend_reversed(self, other: Run) -> Result<Self> {
        if self.from != other.from {
            return Err(self.mismatch(other.from));
        }
        other.reversed().append(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(from: TempId, interior: &[TempId], to: TempId) -> Run {
        Run {
            kind: RunKind::OneWay,
            from,
            interior: interior.iter().copied().collect(),
            to,
        }
    }

    fn nodes(r: &Run) -> Vec<TempId> {
        r.chain().collect()
    }

    #[test]
    fn add_at_either_end() {
        let r = Run::new(RunKind::OneWay, 0, 1, 2);
        let r = r.add(2, 3).unwrap();
        assert_eq!(nodes(&r), vec![0, 1, 2, 3]);

        let r = r.add(0, 9).unwrap();
        assert_eq!(nodes(&r), vec![9, 0, 1, 2, 3]);
        assert_eq!(r.edge_count(), 4);

        assert!(matches!(
            r.add(5, 6),
            Err(Error::RunEndpointMismatch { from: 9, to: 3, at: 5 })
        ));
    }

    #[test]
    fn append() {
        let r = run(0, &[1], 2).append(run(2, &[3, 4], 5)).unwrap();
        assert_eq!(nodes(&r), vec![0, 1, 2, 3, 4, 5]);
        assert!(run(0, &[1], 2).append(run(3, &[4], 5)).is_err());
    }

    #[test]
    fn append_reversed() {
        let r = run(0, &[1], 2).append_reversed(run(5, &[4, 3], 2)).unwrap();
        assert_eq!(nodes(&r), vec![0, 1, 2, 3, 4, 5]);
        assert!(run(0, &[1], 2).append_reversed(run(2, &[3], 4)).is_err());
    }

    #[test]
    fn prepend_reversed() {
        let r = run(2, &[3], 4).prepend_reversed(run(2, &[1], 0)).unwrap();
        assert_eq!(nodes(&r), vec![0, 1, 2, 3, 4]);
        assert!(run(2, &[3], 4).prepend_reversed(run(0, &[1], 2)).is_err());
    }

    #[test]
    fn neighbor_and_circle() {
        let r = run(7, &[1, 2, 3], 7);
        assert!(r.is_circle());
        assert_eq!(r.neighbor_of(7), Some(3));

        let r = run(7, &[1, 2, 3], 8);
        assert_eq!(r.neighbor_of(7), Some(1));
        assert_eq!(r.neighbor_of(8), Some(3));
        assert_eq!(r.neighbor_of(2), None);
    }
}
