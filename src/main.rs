// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use log::info;
use mmgraph::{EdgeKind, Graph, NodeKind};

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct GraphLoadError(PathBuf, #[source] mmgraph::Error);

/// Prints a summary of a cached multimodal graph.
#[derive(Parser)]
struct Cli {
    /// The path to the graph cache file
    graph_file: PathBuf,

    /// Verify internal consistency of the graph
    #[arg(long)]
    check: bool,
}

fn node_kind_name(k: &NodeKind) -> &'static str {
    match k {
        NodeKind::Road { .. } => "road",
        NodeKind::Stop(_) => "stop",
        NodeKind::Route { .. } => "route",
    }
}

fn edge_kind_name(k: &EdgeKind) -> &'static str {
    match k {
        EdgeKind::Road { .. } => "road",
        EdgeKind::Route { .. } => "route",
        EdgeKind::Inner { .. } => "inner",
        EdgeKind::Virtual { .. } => "virtual",
    }
}

fn print_summary(g: &Graph) {
    let mut nodes: BTreeMap<&str, usize> = BTreeMap::new();
    for n in g.nodes() {
        *nodes.entry(node_kind_name(&n.kind)).or_default() += 1;
    }

    let mut edges: BTreeMap<&str, usize> = BTreeMap::new();
    for e in g.edges() {
        *edges.entry(edge_kind_name(&e.kind)).or_default() += 1;
    }

    println!("nodes: {}", g.len());
    for (kind, count) in nodes {
        println!("  {kind}: {count}");
    }
    println!("edges: {}", g.edge_count());
    for (kind, count) in edges {
        println!("  {kind}: {count}");
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    let g = mmgraph::cache::read_graph_from_file(&cli.graph_file)
        .map_err(|e| GraphLoadError(cli.graph_file.clone(), e))?;

    if cli.check {
        g.validate()?;
        info!("graph is consistent");
    }

    print_summary(&g);
    Ok(())
}
