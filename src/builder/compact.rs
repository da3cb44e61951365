// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use log::debug;

use super::{EdgeBuilder, NodeBuilder, TempGraph};
use crate::{Error, Graph, NodeId, NodeKind, Result, TempId};

impl TempGraph {
    /// Turns this builder into an immutable [Graph].
    ///
    /// Every temporary id below [TempGraph::next_temp_id] must have been inserted
    /// (removed nodes are fine), otherwise [Error::IdGap] is returned. Final ids are assigned
    /// in insertion order, skipping removed nodes.
    ///
    /// Route nodes are resolved against the ids assigned so far - a stop must be inserted
    /// before any route node referencing it, otherwise [Error::UnresolvedStop] is returned.
    ///
    /// Outgoing edges of every node are laid out in ascending target id order.
    pub fn compact(self) -> Result<Graph> {
        let live = self.drain_dense()?;

        let mut final_ids: HashMap<TempId, NodeId> = HashMap::with_capacity(live.len());
        let mut nodes = Vec::with_capacity(live.len());
        let mut pending_edges = Vec::with_capacity(live.len());

        for (builder, outgoing) in live {
            let id = nodes.len() as NodeId;
            let stop = match builder.kind {
                NodeKind::Route { stop, .. } => match final_ids.get(&stop) {
                    Some(&final_stop) => Some(final_stop),
                    None => {
                        return Err(Error::UnresolvedStop {
                            route: builder.temp_id,
                            stop,
                        })
                    }
                },
                _ => None,
            };

            final_ids.insert(builder.temp_id, id);
            nodes.push(builder.finalize(id, stop));
            pending_edges.push(outgoing);
        }

        let edge_count = pending_edges.iter().map(Vec::len).sum();
        let mut edges = Vec::with_capacity(edge_count);
        let mut outgoing_offsets = Vec::with_capacity(nodes.len() + 1);
        outgoing_offsets.push(0_u32);

        for (from, outgoing) in pending_edges.into_iter().enumerate() {
            for e in outgoing {
                // Edges to removed nodes can't exist - TempGraph::remove_node
                // refuses to remove nodes with incident edges.
                let to = *final_ids
                    .get(&e.to)
                    .ok_or(Error::MissingNode(e.to))?;
                edges.push(e.finalize(from as NodeId, to, |t| final_ids.get(&t).copied()));
            }
            outgoing_offsets.push(edges.len() as u32);
        }

        debug!(
            "compacted graph with {} nodes and {} edges",
            nodes.len(),
            edges.len()
        );
        Ok(Graph::from_outgoing(nodes, edges, outgoing_offsets))
    }

    /// Reopens a compacted [Graph] for further changes. Temporary ids are equal to the final ids.
    pub fn from_graph(g: Graph) -> Result<Self> {
        let (nodes, edges) = g.into_parts();
        let mut tg = TempGraph::new();

        for nd in nodes {
            tg.add_node(NodeBuilder::new(nd.id, nd.source_id, nd.location, nd.kind))?;
        }

        for e in edges {
            tg.add_edge(EdgeBuilder::new(e.from, e.to, e.length, e.kind))?;
        }

        Ok(tg)
    }
}
