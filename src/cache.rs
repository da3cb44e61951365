// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Versioned binary format for storing finished [Graphs](Graph).
//!
//! The whole file is [gzip](https://en.wikipedia.org/wiki/Gzip)-compressed. All integers
//! and floats are little-endian, strings are stored as a `u32` byte length followed by UTF-8 data.
//!
//! 1. Magic bytes `MMGR` and the format version (`u16`).
//! 2. Node count and edge count (both `u32`).
//! 3. Node table: source id (`i64`), lat and lon (`f64`), elevation (`f32`),
//!    kind tag (`u8`) and kind-specific fields.
//! 4. Edge table: from, to, length (all `u32`), kind tag (`u8`) and kind-specific fields.
//! 5. Outgoing offsets, incoming offsets (both `n + 1` × `u32`) and incoming edge indices (`m` × `u32`).

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;

use crate::{
    Departure, Edge, EdgeKind, Error, Graph, InnerKind, Location, ModeSet, Node, NodeId,
    NodeKind, Result, StopInfo, TravelMode, Wheelchair,
};

pub const MAGIC: [u8; 4] = *b"MMGR";
pub const VERSION: u16 = 1;

const NODE_ROAD: u8 = 0;
const NODE_STOP: u8 = 1;
const NODE_ROUTE: u8 = 2;

const EDGE_ROAD: u8 = 0;
const EDGE_ROUTE: u8 = 1;
const EDGE_INNER: u8 = 2;
const EDGE_VIRTUAL: u8 = 3;

struct Encoder<W: Write>(W);

impl<W: Write> Encoder<W> {
    fn bytes(&mut self, b: &[u8]) -> io::Result<()> {
        self.0.write_all(b)
    }

    fn u8(&mut self, v: u8) -> io::Result<()> {
        self.bytes(&[v])
    }

    fn u16(&mut self, v: u16) -> io::Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn u32(&mut self, v: u32) -> io::Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn i64(&mut self, v: i64) -> io::Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn f32(&mut self, v: f32) -> io::Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn f64(&mut self, v: f64) -> io::Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn len(&mut self, n: usize) -> io::Result<()> {
        let n = u32::try_from(n).map_err(|_| io::Error::other("table too large"))?;
        self.u32(n)
    }

    fn str(&mut self, s: &str) -> io::Result<()> {
        self.len(s.len())?;
        self.bytes(s.as_bytes())
    }

    fn u32s(&mut self, values: &[u32]) -> io::Result<()> {
        values.iter().try_for_each(|&v| self.u32(v))
    }

    fn node(&mut self, n: &Node) -> io::Result<()> {
        self.i64(n.source_id)?;
        self.f64(n.location.lat)?;
        self.f64(n.location.lon)?;
        self.f32(n.location.elevation)?;

        match &n.kind {
            NodeKind::Road {
                park_and_ride,
                bike_share,
            } => {
                self.u8(NODE_ROAD)?;
                self.u8(*park_and_ride as u8 | (*bike_share as u8) << 1)
            }
            NodeKind::Stop(info) => {
                self.u8(NODE_STOP)?;
                self.str(&info.stop_id)?;
                self.str(&info.name)?;
                match &info.zone {
                    Some(zone) => {
                        self.u8(1)?;
                        self.str(zone)?;
                    }
                    None => self.u8(0)?,
                }
                self.u8(info.wheelchair as u8)
            }
            NodeKind::Route { route_id, stop } => {
                self.u8(NODE_ROUTE)?;
                self.str(route_id)?;
                self.u32(*stop)
            }
        }
    }

    fn edge(&mut self, e: &Edge) -> io::Result<()> {
        self.u32(e.from)?;
        self.u32(e.to)?;
        self.u32(e.length)?;

        match &e.kind {
            EdgeKind::Road {
                max_speed,
                way_id,
                modes,
            } => {
                self.u8(EDGE_ROAD)?;
                self.u16(*max_speed)?;
                self.i64(*way_id)?;
                self.u8(modes.bits())
            }
            EdgeKind::Route { departures } => {
                self.u8(EDGE_ROUTE)?;
                self.len(departures.len())?;
                for d in departures {
                    self.u32(d.time)?;
                    self.u32(d.duration)?;
                }
                Ok(())
            }
            EdgeKind::Inner { kind, duration } => {
                self.u8(EDGE_INNER)?;
                self.u8(*kind as u8)?;
                self.u32(*duration)
            }
            EdgeKind::Virtual {
                time,
                speed,
                mode,
                path,
            } => {
                self.u8(EDGE_VIRTUAL)?;
                self.u32(*time)?;
                self.f32(*speed)?;
                self.u8(*mode as u8)?;
                self.len(path.len())?;
                self.u32s(path)
            }
        }
    }
}

struct Decoder<R: Read>(R);

impl<R: Read> Decoder<R> {
    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0_u8; N];
        self.0.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::Corrupted("unexpected end of file"),
            _ => e.into(),
        })?;
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let mut buf = Vec::new();
        (&mut self.0)
            .take(len as u64)
            .read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(Error::Corrupted("unexpected end of file"));
        }
        String::from_utf8(buf).map_err(|_| Error::Corrupted("string is not valid UTF-8"))
    }

    fn u32s(&mut self, count: usize) -> Result<Vec<u32>> {
        (0..count).map(|_| self.u32()).collect()
    }

    fn header(&mut self) -> Result<()> {
        if self.array::<4>()? != MAGIC {
            return Err(Error::BadMagic);
        }
        match self.u16()? {
            VERSION => Ok(()),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    fn node(&mut self, id: NodeId) -> Result<Node> {
        let source_id = self.i64()?;
        let lat = self.f64()?;
        let lon = self.f64()?;
        let elevation = self.f32()?;

        let kind = match self.u8()? {
            NODE_ROAD => {
                let flags = self.u8()?;
                NodeKind::Road {
                    park_and_ride: flags & 1 != 0,
                    bike_share: flags & 2 != 0,
                }
            }
            NODE_STOP => {
                let stop_id = self.str()?;
                let name = self.str()?;
                let zone = match self.u8()? {
                    0 => None,
                    1 => Some(self.str()?),
                    _ => return Err(Error::Corrupted("invalid zone marker")),
                };
                let wheelchair = match self.u8()? {
                    0 => Wheelchair::Unknown,
                    1 => Wheelchair::Accessible,
                    2 => Wheelchair::Inaccessible,
                    _ => return Err(Error::Corrupted("invalid wheelchair accessibility")),
                };
                NodeKind::Stop(StopInfo {
                    stop_id,
                    name,
                    zone,
                    wheelchair,
                })
            }
            NODE_ROUTE => NodeKind::Route {
                route_id: self.str()?,
                stop: self.u32()?,
            },
            _ => return Err(Error::Corrupted("invalid node kind")),
        };

        Ok(Node {
            id,
            source_id,
            location: Location::new(lat, lon, elevation),
            kind,
        })
    }

    fn edge(&mut self) -> Result<Edge> {
        let from = self.u32()?;
        let to = self.u32()?;
        let length = self.u32()?;

        let kind = match self.u8()? {
            EDGE_ROAD => EdgeKind::Road {
                max_speed: self.u16()?,
                way_id: self.i64()?,
                modes: ModeSet::from_bits(self.u8()?)
                    .ok_or(Error::Corrupted("invalid mode set"))?,
            },
            EDGE_ROUTE => {
                let count = self.u32()? as usize;
                let departures = (0..count)
                    .map(|_| -> Result<Departure> {
                        Ok(Departure {
                            time: self.u32()?,
                            duration: self.u32()?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                EdgeKind::Route { departures }
            }
            EDGE_INNER => {
                let kind = match self.u8()? {
                    0 => InnerKind::Board,
                    1 => InnerKind::Alight,
                    _ => return Err(Error::Corrupted("invalid inner edge kind")),
                };
                EdgeKind::Inner {
                    kind,
                    duration: self.u32()?,
                }
            }
            EDGE_VIRTUAL => {
                let time = self.u32()?;
                let speed = self.f32()?;
                let mode = TravelMode::from_u8(self.u8()?)
                    .ok_or(Error::Corrupted("invalid travel mode"))?;
                let count = self.u32()? as usize;
                EdgeKind::Virtual {
                    time,
                    speed,
                    mode,
                    path: self.u32s(count)?,
                }
            }
            _ => return Err(Error::Corrupted("invalid edge kind")),
        };

        Ok(Edge {
            from,
            to,
            length,
            kind,
        })
    }
}

/// Serializes a [Graph] into a gzip-compressed stream.
pub fn write_graph<W: Write>(g: &Graph, w: W) -> Result<()> {
    let mut enc = Encoder(GzEncoder::new(w, Compression::default()));

    enc.bytes(&MAGIC)?;
    enc.u16(VERSION)?;
    enc.len(g.len())?;
    enc.len(g.edge_count())?;

    for n in g.nodes() {
        enc.node(n)?;
    }
    for e in g.edges() {
        enc.edge(e)?;
    }

    enc.u32s(g.outgoing_offsets())?;
    enc.u32s(g.incoming_offsets())?;
    enc.u32s(g.incoming_edge_indices())?;

    enc.0.finish()?.flush()?;
    Ok(())
}

/// Deserializes a [Graph] written by [write_graph].
///
/// Apart from checking the header, the adjacency tables are
/// [validated](Graph::validate) before the graph is returned.
pub fn read_graph<R: Read>(r: R) -> Result<Graph> {
    let mut dec = Decoder(GzDecoder::new(r));
    dec.header()?;

    let node_count = dec.u32()?;
    let edge_count = dec.u32()? as usize;

    let nodes = (0..node_count)
        .map(|id| dec.node(id))
        .collect::<Result<Vec<_>>>()?;
    let edges = (0..edge_count)
        .map(|_| dec.edge())
        .collect::<Result<Vec<_>>>()?;

    let outgoing_offsets = dec.u32s(node_count as usize + 1)?;
    let incoming_offsets = dec.u32s(node_count as usize + 1)?;
    let incoming = dec.u32s(edge_count)?;

    debug!("read graph with {node_count} nodes and {edge_count} edges");
    Graph::from_parts(nodes, edges, outgoing_offsets, incoming_offsets, incoming)
}

/// Serializes a [Graph] into a file at the provided path.
pub fn write_graph_to_file<P: AsRef<Path>>(g: &Graph, path: P) -> Result<()> {
    let f = File::create(path)?;
    write_graph(g, BufWriter::new(f))
}

/// Deserializes a [Graph] from a file at the provided path.
pub fn read_graph_from_file<P: AsRef<Path>>(path: P) -> Result<Graph> {
    let f = File::open(path)?;
    read_graph(BufReader::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdgeBuilder, NodeBuilder, TempGraph};

    fn sample() -> Graph {
        let mut g = TempGraph::new();
        let nodes = [
            NodeKind::Road {
                park_and_ride: true,
                bike_share: false,
            },
            NodeKind::road(),
            NodeKind::Stop(StopInfo {
                stop_id: "S1".to_string(),
                name: "Plac Zawiszy".to_string(),
                zone: Some("1".to_string()),
                wheelchair: Wheelchair::Accessible,
            }),
            NodeKind::Route {
                route_id: "15".to_string(),
                stop: 2,
            },
            NodeKind::Route {
                route_id: "15".to_string(),
                stop: 2,
            },
        ];
        for (id, kind) in nodes.into_iter().enumerate() {
            g.add_node(NodeBuilder::new(
                id as u32,
                1000 + id as i64,
                Location::new(52.2, 20.98 + id as f64 * 0.001, 110.5),
                kind,
            ))
            .unwrap();
        }

        g.add_edge(EdgeBuilder::road(0, 1, 68, 50, 77, ModeSet::ROAD))
            .unwrap();
        g.add_edge(EdgeBuilder::road(1, 0, 68, 50, 77, ModeSet::FOOT))
            .unwrap();
        g.add_edge(EdgeBuilder::new(
            2,
            3,
            0,
            EdgeKind::Inner {
                kind: InnerKind::Board,
                duration: 30,
            },
        ))
        .unwrap();
        g.add_edge(EdgeBuilder::new(
            3,
            2,
            0,
            EdgeKind::Inner {
                kind: InnerKind::Alight,
                duration: 0,
            },
        ))
        .unwrap();
        g.add_edge(EdgeBuilder::new(
            3,
            4,
            5,
            EdgeKind::Route {
                departures: vec![
                    Departure {
                        time: 100,
                        duration: 60,
                    },
                    Departure {
                        time: 200,
                        duration: 65,
                    },
                ],
            },
        ))
        .unwrap();
        g.add_edge(EdgeBuilder::new(
            1,
            2,
            12,
            EdgeKind::Virtual {
                time: 9,
                speed: 1.4,
                mode: TravelMode::Foot,
                path: vec![1, 2],
            },
        ))
        .unwrap();
        g.compact().unwrap()
    }

    fn encoded(g: &Graph) -> Vec<u8> {
        let mut buf = Vec::new();
        write_graph(g, &mut buf).unwrap();
        buf
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn write_then_read() {
        let g = sample();
        let read = read_graph(encoded(&g).as_slice()).unwrap();
        assert_eq!(read, g);
    }

    #[test]
    fn empty_graph() {
        let g = TempGraph::new().compact().unwrap();
        let read = read_graph(encoded(&g).as_slice()).unwrap();
        assert!(read.is_empty());
        assert_eq!(read.edge_count(), 0);
    }

    #[test]
    fn rejects_bad_magic() {
        let data = gzip(b"OSMX\x01\x00");
        assert!(matches!(read_graph(data.as_slice()), Err(Error::BadMagic)));
    }

    #[test]
    fn rejects_unknown_version() {
        let data = gzip(b"MMGR\x02\x00");
        assert!(matches!(
            read_graph(data.as_slice()),
            Err(Error::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn rejects_truncated_data() {
        let mut raw = Vec::new();
        GzDecoder::new(encoded(&sample()).as_slice())
            .read_to_end(&mut raw)
            .unwrap();
        raw.truncate(raw.len() - 3);

        assert!(matches!(
            read_graph(gzip(&raw).as_slice()),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_tables() {
        let mut raw = Vec::new();
        GzDecoder::new(encoded(&sample()).as_slice())
            .read_to_end(&mut raw)
            .unwrap();

        // Last incoming edge index points at a non-existing edge
        let last = raw.len() - 4;
        raw[last..].copy_from_slice(&99_u32.to_le_bytes());

        assert!(matches!(
            read_graph(gzip(&raw).as_slice()),
            Err(Error::Corrupted(_))
        ));
    }
}
