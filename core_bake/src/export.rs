//! Conversion of a baked world into the flat `graph_schema` records.

use graph_schema::{
    BorderRecord, EdgeRecords, GraphHeader, NodeRecords, RiverPointRecord, WorldGraphExport,
    EDGE_FIELD_LINK, EDGE_RIVER_FLOW, EDGE_RIVER_LEG, EDGE_RIVER_TERMINAL, NO_INDEX, OWNER_FIELD,
    OWNER_RIVER,
};

use crate::finalize::{EdgeKind, NodeOwner, WorldGraph};
use crate::pipeline::BakedWorld;

fn edge_kind_tag(kind: EdgeKind) -> u8 {
    match kind {
        EdgeKind::FieldLink => EDGE_FIELD_LINK,
        EdgeKind::RiverLeg => EDGE_RIVER_LEG,
        EdgeKind::RiverFlow => EDGE_RIVER_FLOW,
        EdgeKind::RiverTerminal => EDGE_RIVER_TERMINAL,
    }
}

fn optional_index(index: Option<u32>) -> i32 {
    index.map_or(NO_INDEX, |i| i as i32)
}

fn node_records(graph: &WorldGraph) -> NodeRecords {
    let mut records = NodeRecords::default();
    records.incident_offsets.push(0);
    for node in &graph.nodes {
        records.geo.push(node.geo.to_array());
        records.pixel.push(node.coord.to_array());
        let (kind, index) = match node.owner {
            NodeOwner::Field(i) => (OWNER_FIELD, i),
            NodeOwner::River(i) => (OWNER_RIVER, i),
        };
        records.owner_kind.push(kind);
        records.owner_index.push(index);
        records.incident_edges.extend_from_slice(&node.edges);
        records
            .incident_offsets
            .push(records.incident_edges.len() as u32);
    }
    records
}

fn edge_records(graph: &WorldGraph) -> EdgeRecords {
    let mut records = EdgeRecords::default();
    for edge in &graph.edges {
        records.node_a.push(edge.node_a);
        records.node_b.push(edge.node_b);
        records.distance_ground.push(edge.distance_ground);
        records.distance_air.push(edge.distance_air);
        records
            .crossed_river_node
            .push(optional_index(edge.crossed_river_node));
        records.kind.push(edge_kind_tag(edge.kind));
    }
    records
}

/// Flatten `baked` into serializable records with a finalized header.
pub fn to_schema(baked: &BakedWorld) -> WorldGraphExport {
    let grid = baked.grid();
    let graph = &baked.graph;

    let river_points = graph
        .river_points
        .iter()
        .map(|p| RiverPointRecord {
            river_index: p.river,
            node_index: p.node,
            starts_from_field_index: optional_index(p.starts_from_field),
            starts_from: p.starts_from.clone(),
            ends_into: p.ends_into.clone(),
            neighbor_field_indexes: p.neighbor_fields.clone(),
        })
        .collect();

    let borders = baked
        .borders
        .iter()
        .map(|b| BorderRecord {
            field_a: b.pair.a,
            field_b: b.pair.b,
            polylines: b
                .polylines
                .iter()
                .map(|line| line.iter().map(|c| c.to_array()).collect())
                .collect(),
        })
        .collect();

    WorldGraphExport {
        header: GraphHeader {
            width: grid.width,
            height: grid.height,
            node_count: 0,
            edge_count: 0,
            field_count: 0,
            river_point_count: 0,
            border_count: 0,
            hash: 0,
        },
        nodes: node_records(graph),
        edges: edge_records(graph),
        field_nodes: graph.field_nodes.clone(),
        river_points,
        river_point_lists: graph.river_point_lists.clone(),
        borders,
    }
    .finalize()
}

pub fn encode(baked: &BakedWorld) -> bincode::Result<Vec<u8>> {
    graph_schema::encode_graph(&to_schema(baked))
}

pub fn encode_json(baked: &BakedWorld) -> serde_json::Result<String> {
    graph_schema::encode_graph_json(&to_schema(baked))
}
