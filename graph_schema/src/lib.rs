use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::hash::{BuildHasher, Hasher};

/// Owner kind tags stored in [`NodeRecords::owner_kind`].
pub const OWNER_FIELD: u8 = 0;
pub const OWNER_RIVER: u8 = 1;

/// Edge kind tags stored in [`EdgeRecords::kind`].
pub const EDGE_FIELD_LINK: u8 = 0;
pub const EDGE_RIVER_LEG: u8 = 1;
pub const EDGE_RIVER_FLOW: u8 = 2;
pub const EDGE_RIVER_TERMINAL: u8 = 3;

/// Index placeholder for "none" in signed index columns.
pub const NO_INDEX: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphHeader {
    pub width: u32,
    pub height: u32,
    pub node_count: u32,
    pub edge_count: u32,
    pub field_count: u32,
    pub river_point_count: u32,
    pub border_count: u32,
    pub hash: u64,
}

/// Nodes as parallel arrays. Incident edges of node `i` are
/// `incident_edges[incident_offsets[i]..incident_offsets[i + 1]]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecords {
    pub geo: Vec<[f64; 3]>,
    pub pixel: Vec<[u32; 2]>,
    pub owner_kind: Vec<u8>,
    pub owner_index: Vec<u32>,
    pub incident_offsets: Vec<u32>,
    pub incident_edges: Vec<u32>,
}

impl NodeRecords {
    pub fn len(&self) -> usize {
        self.geo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geo.is_empty()
    }

    pub fn incident(&self, node: usize) -> &[u32] {
        let start = self.incident_offsets[node] as usize;
        let end = self.incident_offsets[node + 1] as usize;
        &self.incident_edges[start..end]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecords {
    pub node_a: Vec<u32>,
    pub node_b: Vec<u32>,
    pub distance_ground: Vec<f64>,
    pub distance_air: Vec<f64>,
    /// Crossed river node, or [`NO_INDEX`].
    pub crossed_river_node: Vec<i32>,
    pub kind: Vec<u8>,
}

impl EdgeRecords {
    pub fn len(&self) -> usize {
        self.node_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_a.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiverPointRecord {
    pub river_index: u32,
    pub node_index: u32,
    /// Field feeding this point's source, or [`NO_INDEX`].
    pub starts_from_field_index: i32,
    pub starts_from: Vec<u32>,
    pub ends_into: Vec<u32>,
    pub neighbor_field_indexes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderRecord {
    pub field_a: u32,
    pub field_b: u32,
    /// Corner lattice coordinates, one list per polyline.
    pub polylines: Vec<Vec<[u32; 2]>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldGraphExport {
    pub header: GraphHeader,
    pub nodes: NodeRecords,
    pub edges: EdgeRecords,
    pub field_nodes: Vec<u32>,
    pub river_points: Vec<RiverPointRecord>,
    pub river_point_lists: Vec<Vec<u32>>,
    pub borders: Vec<BorderRecord>,
}

impl WorldGraphExport {
    /// Fill in the header counts and the content hash.
    pub fn finalize(mut self) -> Self {
        self.header.node_count = self.nodes.len() as u32;
        self.header.edge_count = self.edges.len() as u32;
        self.header.field_count = self.field_nodes.len() as u32;
        self.header.river_point_count = self.river_points.len() as u32;
        self.header.border_count = self.borders.len() as u32;
        self.header.hash = hash_graph(&self);
        self
    }
}

/// Deterministic hash of the encoded graph with the header hash zeroed.
pub fn hash_graph(graph: &WorldGraphExport) -> u64 {
    let mut clone = graph.clone();
    clone.header.hash = 0;
    let encoded = bincode::serialize(&clone).expect("graph serialization for hashing");
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

pub fn encode_graph(graph: &WorldGraphExport) -> bincode::Result<Vec<u8>> {
    bincode::serialize(graph)
}

pub fn decode_graph(data: &[u8]) -> bincode::Result<WorldGraphExport> {
    bincode::deserialize(data)
}

pub fn encode_graph_json(graph: &WorldGraphExport) -> serde_json::Result<String> {
    serde_json::to_string(graph)
}

pub fn decode_graph_json(data: &str) -> serde_json::Result<WorldGraphExport> {
    serde_json::from_str(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorldGraphExport {
        WorldGraphExport {
            header: GraphHeader {
                width: 4,
                height: 2,
                node_count: 0,
                edge_count: 0,
                field_count: 0,
                river_point_count: 0,
                border_count: 0,
                hash: 0,
            },
            nodes: NodeRecords {
                geo: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                pixel: vec![[0, 0], [2, 1]],
                owner_kind: vec![OWNER_FIELD, OWNER_FIELD],
                owner_index: vec![0, 1],
                incident_offsets: vec![0, 1, 2],
                incident_edges: vec![0, 0],
            },
            edges: EdgeRecords {
                node_a: vec![0],
                node_b: vec![1],
                distance_ground: vec![1.75],
                distance_air: vec![1.5],
                crossed_river_node: vec![NO_INDEX],
                kind: vec![EDGE_FIELD_LINK],
            },
            field_nodes: vec![0, 1],
            river_points: Vec::new(),
            river_point_lists: Vec::new(),
            borders: vec![BorderRecord {
                field_a: 0,
                field_b: 1,
                polylines: vec![vec![[2, 0], [2, 1], [2, 2]]],
            }],
        }
        .finalize()
    }

    #[test]
    fn finalize_fills_header_counts() {
        let graph = sample();
        assert_eq!(graph.header.node_count, 2);
        assert_eq!(graph.header.edge_count, 1);
        assert_eq!(graph.header.field_count, 2);
        assert_eq!(graph.header.border_count, 1);
        assert_eq!(graph.header.hash, hash_graph(&graph));
    }

    #[test]
    fn hash_ignores_its_own_slot_and_tracks_content() {
        let graph = sample();
        let mut rehashed = graph.clone();
        rehashed.header.hash = 12345;
        assert_eq!(hash_graph(&rehashed), graph.header.hash);

        let mut changed = graph.clone();
        changed.edges.distance_ground[0] = 2.0;
        assert_ne!(hash_graph(&changed), graph.header.hash);
    }

    #[test]
    fn binary_encoding_round_trips() {
        let graph = sample();
        let bytes = encode_graph(&graph).expect("encode");
        let decoded = decode_graph(&bytes).expect("decode");
        assert_eq!(decoded, graph);
        assert_eq!(decoded.nodes.incident(1), &[0]);
    }

    #[test]
    fn json_encoding_keeps_structure() {
        let graph = sample();
        let json = encode_graph_json(&graph).expect("encode json");
        let decoded = decode_graph_json(&json).expect("decode json");
        assert_eq!(decoded.header, graph.header);
        assert_eq!(decoded.borders, graph.borders);
        assert_eq!(decoded.edges.crossed_river_node, vec![NO_INDEX]);
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let bytes = encode_graph(&sample()).expect("encode");
        assert!(decode_graph(&bytes[..bytes.len() / 2]).is_err());
    }
}
