// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, BTreeSet};

use super::{EdgeBuilder, NodeBuilder};
use crate::{EdgeKind, Error, Result, TempId};

/// How far past [TempGraph::next_temp_id] a new node's id may lie.
const MAX_ID_GAP: TempId = 4096;

#[derive(Debug, Clone)]
struct Entry {
    node: NodeBuilder,

    /// Outgoing edges, keyed by target id.
    outgoing: BTreeMap<TempId, EdgeBuilder>,

    /// Ids of nodes with an edge to this node.
    incoming: BTreeSet<TempId>,
}

#[derive(Debug, Clone)]
enum Slot {
    /// Id which was skipped over and never inserted.
    Vacant,
    Live(Entry),

    /// Id of a node which was inserted and later removed.
    Removed,
}

/// Mutable directed graph of [NodeBuilders](NodeBuilder) and [EdgeBuilders](EdgeBuilder),
/// stored in an arena indexed by temporary node ids.
///
/// Temporary ids are expected to be handed out densely, in insertion order
/// (see [TempGraph::next_temp_id]). Removed ids are never reused. There may be at most
/// one edge for every ordered pair of nodes. All iteration happens in ascending id order.
///
/// A TempGraph is consumed by [TempGraph::compact], which turns it into an immutable [Graph](crate::Graph).
#[derive(Debug, Default, Clone)]
pub struct TempGraph {
    slots: Vec<Slot>,
    live: usize,
    edge_count: usize,
}

impl TempGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id which should be assigned to the next inserted node.
    pub fn next_temp_id(&self) -> TempId {
        self.slots.len() as TempId
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns the number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn entry(&self, id: TempId) -> Option<&Entry> {
        match self.slots.get(id as usize) {
            Some(Slot::Live(e)) => Some(e),
            _ => None,
        }
    }

    fn entry_mut(&mut self, id: TempId) -> Option<&mut Entry> {
        match self.slots.get_mut(id as usize) {
            Some(Slot::Live(e)) => Some(e),
            _ => None,
        }
    }

    pub fn contains(&self, id: TempId) -> bool {
        self.entry(id).is_some()
    }

    pub fn node(&self, id: TempId) -> Option<&NodeBuilder> {
        self.entry(id).map(|e| &e.node)
    }

    pub fn node_mut(&mut self, id: TempId) -> Option<&mut NodeBuilder> {
        self.entry_mut(id).map(|e| &mut e.node)
    }

    /// Iterates over all nodes, in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeBuilder> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Live(e) => Some(&e.node),
            _ => None,
        })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = TempId> + '_ {
        self.nodes().map(|n| n.temp_id)
    }

    /// Iterates over all edges, grouped by source node and sorted by target node.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeBuilder> {
        self.slots
            .iter()
            .flat_map(|s| match s {
                Slot::Live(e) => Some(e.outgoing.values()),
                _ => None,
            })
            .flatten()
    }

    /// Calls `f(from, to, kind)` for every edge, in the order of [TempGraph::edges].
    pub(crate) fn for_each_edge_kind_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(TempId, TempId, &mut EdgeKind),
    {
        for slot in &mut self.slots {
            if let Slot::Live(e) = slot {
                for edge in e.outgoing.values_mut() {
                    f(edge.from, edge.to, &mut edge.kind);
                }
            }
        }
    }

    pub fn edge(&self, from: TempId, to: TempId) -> Option<&EdgeBuilder> {
        self.entry(from).and_then(|e| e.outgoing.get(&to))
    }

    pub fn has_edge(&self, from: TempId, to: TempId) -> bool {
        self.edge(from, to).is_some()
    }

    /// Outgoing edges of a node, sorted by target id.
    pub fn outgoing(&self, id: TempId) -> impl Iterator<Item = &EdgeBuilder> {
        self.entry(id).into_iter().flat_map(|e| e.outgoing.values())
    }

    /// Incoming edges of a node, sorted by source id.
    pub fn incoming(&self, id: TempId) -> impl Iterator<Item = &EdgeBuilder> + '_ {
        self.entry(id)
            .into_iter()
            .flat_map(|e| e.incoming.iter())
            .filter_map(move |&from| self.edge(from, id))
    }

    pub fn out_degree(&self, id: TempId) -> usize {
        self.entry(id).map_or(0, |e| e.outgoing.len())
    }

    pub fn in_degree(&self, id: TempId) -> usize {
        self.entry(id).map_or(0, |e| e.incoming.len())
    }

    /// Total number of incident edges (incoming and outgoing).
    pub fn degree(&self, id: TempId) -> usize {
        self.entry(id)
            .map_or(0, |e| e.incoming.len() + e.outgoing.len())
    }

    /// Inserts a new node. Fails if a node with the same id was ever inserted,
    /// or if the id lies too far past [TempGraph::next_temp_id].
    pub fn add_node(&mut self, node: NodeBuilder) -> Result<()> {
        let next = self.next_temp_id();
        if node.temp_id > next.saturating_add(MAX_ID_GAP) {
            return Err(Error::IdTooFar {
                id: node.temp_id,
                next,
            });
        }

        let idx = node.temp_id as usize;
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, || Slot::Vacant);
        }

        match self.slots[idx] {
            Slot::Vacant => {
                self.slots[idx] = Slot::Live(Entry {
                    node,
                    outgoing: BTreeMap::default(),
                    incoming: BTreeSet::default(),
                });
                self.live += 1;
                Ok(())
            }
            Slot::Live(_) | Slot::Removed => Err(Error::DuplicateNode(node.temp_id)),
        }
    }

    fn check_endpoints(&self, edge: &EdgeBuilder) -> Result<()> {
        for missing in [edge.from, edge.to] {
            if !self.contains(missing) {
                return Err(Error::MissingEndpoint {
                    from: edge.from,
                    to: edge.to,
                    missing,
                });
            }
        }
        Ok(())
    }

    /// Inserts a new edge. Fails if either endpoint is absent or the edge already exists.
    pub fn add_edge(&mut self, edge: EdgeBuilder) -> Result<()> {
        self.check_endpoints(&edge)?;
        if self.has_edge(edge.from, edge.to) {
            return Err(Error::DuplicateEdge(edge.from, edge.to));
        }
        self.insert_edge_unchecked(edge);
        Ok(())
    }

    fn insert_edge_unchecked(&mut self, edge: EdgeBuilder) {
        let (from, to) = (edge.from, edge.to);
        if let Some(e) = self.entry_mut(to) {
            e.incoming.insert(from);
        }
        if let Some(e) = self.entry_mut(from) {
            e.outgoing.insert(to, edge);
        }
        self.edge_count += 1;
    }

    /// Inserts an edge, or, if an edge between the same nodes already exists,
    /// calls `merge` to combine the new edge into the existing one.
    pub fn merge_edge<F>(&mut self, edge: EdgeBuilder, merge: F) -> Result<()>
    where
        F: FnOnce(&mut EdgeBuilder, EdgeBuilder),
    {
        self.check_endpoints(&edge)?;
        let existing = self
            .entry_mut(edge.from)
            .and_then(|e| e.outgoing.get_mut(&edge.to));

        match existing {
            Some(existing) => merge(existing, edge),
            None => self.insert_edge_unchecked(edge),
        }
        Ok(())
    }

    /// Replaces an existing edge, returning the old one.
    pub fn replace_edge(&mut self, edge: EdgeBuilder) -> Result<EdgeBuilder> {
        let (from, to) = (edge.from, edge.to);
        self.entry_mut(from)
            .and_then(|e| e.outgoing.get_mut(&to))
            .map(|existing| std::mem::replace(existing, edge))
            .ok_or(Error::MissingEdge(from, to))
    }

    /// Removes an edge from one node to another.
    pub fn remove_edge(&mut self, from: TempId, to: TempId) -> Option<EdgeBuilder> {
        let removed = self.entry_mut(from)?.outgoing.remove(&to)?;
        if let Some(e) = self.entry_mut(to) {
            e.incoming.remove(&from);
        }
        self.edge_count -= 1;
        Some(removed)
    }

    /// Removes all edges matching the predicate, returning their count.
    pub fn remove_edges<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&EdgeBuilder) -> bool,
    {
        let doomed: Vec<(TempId, TempId)> = self
            .edges()
            .filter(|e| predicate(e))
            .map(|e| (e.from, e.to))
            .collect();

        doomed
            .into_iter()
            .filter(|&(from, to)| self.remove_edge(from, to).is_some())
            .count()
    }

    /// Removes a node without any incident edges.
    ///
    /// Removing a node which still has edges is an invariant violation
    /// and fails with [Error::NodeStillConnected].
    pub fn remove_node(&mut self, id: TempId) -> Result<NodeBuilder> {
        let incident = match self.entry(id) {
            Some(e) => e.incoming.len() + e.outgoing.len(),
            None => return Err(Error::MissingNode(id)),
        };
        if incident > 0 {
            return Err(Error::NodeStillConnected { id, incident });
        }

        match std::mem::replace(&mut self.slots[id as usize], Slot::Removed) {
            Slot::Live(e) => {
                self.live -= 1;
                Ok(e.node)
            }
            _ => Err(Error::MissingNode(id)),
        }
    }

    /// Removes all nodes without any edges, returning their count.
    pub fn remove_isolated_nodes(&mut self) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            let isolated = matches!(slot, Slot::Live(e) if e.incoming.is_empty() && e.outgoing.is_empty());
            if isolated {
                *slot = Slot::Removed;
                removed += 1;
            }
        }
        self.live -= removed;
        removed
    }

    fn group_by<F>(&self, degree: F) -> BTreeMap<usize, Vec<TempId>>
    where
        F: Fn(&Entry) -> usize,
    {
        let mut groups: BTreeMap<usize, Vec<TempId>> = BTreeMap::default();
        for slot in &self.slots {
            if let Slot::Live(e) = slot {
                groups.entry(degree(e)).or_default().push(e.node.temp_id);
            }
        }
        groups
    }

    /// Groups node ids by their total degree.
    pub fn nodes_by_degree(&self) -> BTreeMap<usize, Vec<TempId>> {
        self.group_by(|e| e.incoming.len() + e.outgoing.len())
    }

    /// Groups node ids by the number of incoming edges.
    pub fn nodes_by_in_degree(&self) -> BTreeMap<usize, Vec<TempId>> {
        self.group_by(|e| e.incoming.len())
    }

    /// Groups node ids by the number of outgoing edges.
    pub fn nodes_by_out_degree(&self) -> BTreeMap<usize, Vec<TempId>> {
        self.group_by(|e| e.outgoing.len())
    }

    /// Consumes all slots, returning live nodes with their outgoing edges
    /// in ascending id order, after checking that no id was skipped.
    pub(super) fn drain_dense(self) -> Result<Vec<(NodeBuilder, Vec<EdgeBuilder>)>> {
        let mut live = Vec::with_capacity(self.live);
        for (idx, slot) in self.slots.into_iter().enumerate() {
            match slot {
                Slot::Vacant => return Err(Error::IdGap(idx as TempId)),
                Slot::Removed => {}
                Slot::Live(e) => {
                    debug_assert_eq!(e.node.temp_id as usize, idx);
                    live.push((e.node, e.outgoing.into_values().collect()));
                }
            }
        }
        Ok(live)
    }
}
