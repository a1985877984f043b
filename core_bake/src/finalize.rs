//! Node/edge assembly: every produced vertex is deduplicated by identity,
//! edges are recorded with ground and air distances, and river-owned nodes
//! become river points with flow adjacency derived from edge direction.

use ahash::AHashMap;
use bevy::math::DVec3;

use crate::error::BakeError;
use crate::fields::{FieldId, FieldMap, UNSET_FIELD};
use crate::geodesic::{sphere_distance, PixelCoord, RasterGrid};
use crate::neighbors::{FieldNeighbor, NeighborType};
use crate::rivers::{RiverNetwork, RiverPointType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeOwner {
    Field(FieldId),
    River(u32),
}

impl NodeOwner {
    pub fn index(self) -> u32 {
        match self {
            NodeOwner::Field(i) | NodeOwner::River(i) => i,
        }
    }

    pub fn is_river(self) -> bool {
        matches!(self, NodeOwner::River(_))
    }
}

/// Identity of a graph node.
///
/// Every node derives from exactly one pixel, and the pixel to sphere
/// projection is injective, so keying on the integer pixel is equivalent to
/// keying on the projected point without relying on bit-exact floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub coord: PixelCoord,
    pub owner: NodeOwner,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeFinal {
    pub geo: DVec3,
    pub coord: PixelCoord,
    pub owner: NodeOwner,
    pub edges: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Center-to-center connection of two neighboring fields.
    FieldLink,
    /// Field center to river crossing, or crossing to field center.
    RiverLeg,
    /// Consecutive river cells, upstream to downstream.
    RiverFlow,
    /// Field into a river source, or river mouth into a field.
    RiverTerminal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeFinal {
    pub node_a: u32,
    pub node_b: u32,
    pub distance_ground: f64,
    pub distance_air: f64,
    pub crossed_river_node: Option<u32>,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiverPoint {
    pub river: u32,
    pub node: u32,
    pub starts_from_field: Option<FieldId>,
    /// River points flowing into this one.
    pub starts_from: Vec<u32>,
    /// River points this one flows into.
    pub ends_into: Vec<u32>,
    pub neighbor_fields: Vec<FieldId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldGraph {
    pub nodes: Vec<NodeFinal>,
    pub edges: Vec<EdgeFinal>,
    /// Node of every field, indexed by field id.
    pub field_nodes: Vec<u32>,
    pub river_points: Vec<RiverPoint>,
    /// River point indices of every river, in flow order per strand.
    pub river_point_lists: Vec<Vec<u32>>,
}

impl WorldGraph {
    pub fn field_node(&self, field: FieldId) -> Option<&NodeFinal> {
        let node = *self.field_nodes.get(field as usize)?;
        self.nodes.get(node as usize)
    }

    pub fn incident_edges(&self, node: u32) -> impl Iterator<Item = &EdgeFinal> {
        self.nodes
            .get(node as usize)
            .into_iter()
            .flat_map(|n| n.edges.iter())
            .filter_map(|&e| self.edges.get(e as usize))
    }
}

struct GraphBuilder {
    grid: RasterGrid,
    lookup: AHashMap<NodeId, u32>,
    nodes: Vec<NodeFinal>,
    edges: Vec<EdgeFinal>,
}

impl GraphBuilder {
    fn new(grid: RasterGrid) -> Self {
        Self {
            grid,
            lookup: AHashMap::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn node(&mut self, id: NodeId) -> u32 {
        if let Some(&idx) = self.lookup.get(&id) {
            return idx;
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(NodeFinal {
            geo: self.grid.pixel_to_sphere(id.coord),
            coord: id.coord,
            owner: id.owner,
            edges: Vec::new(),
        });
        self.lookup.insert(id, idx);
        idx
    }

    fn edge(
        &mut self,
        a: NodeId,
        b: NodeId,
        ground: Option<f64>,
        crossed_river_node: Option<u32>,
        kind: EdgeKind,
    ) -> u32 {
        let node_a = self.node(a);
        let node_b = self.node(b);
        let air = sphere_distance(
            self.nodes[node_a as usize].geo,
            self.nodes[node_b as usize].geo,
        );
        let idx = self.edges.len() as u32;
        self.edges.push(EdgeFinal {
            node_a,
            node_b,
            distance_ground: ground.unwrap_or(air),
            distance_air: air,
            crossed_river_node,
            kind,
        });
        self.nodes[node_a as usize].edges.push(idx);
        self.nodes[node_b as usize].edges.push(idx);
        idx
    }
}

fn field_id(fields: &FieldMap, field: FieldId) -> Result<NodeId, BakeError> {
    let coord = fields
        .center(field)
        .filter(|&c| fields.grid().contains(c))
        .ok_or(BakeError::FieldWithoutNode { field })?;
    Ok(NodeId {
        coord,
        owner: NodeOwner::Field(field),
    })
}

fn river_id(rivers: &RiverNetwork, coord: PixelCoord, fallback_river: u32) -> NodeId {
    let idx = rivers.grid().index(coord);
    let river = rivers
        .strand_at(idx)
        .map(|s| rivers.strands()[s as usize].river)
        .unwrap_or(fallback_river);
    NodeId {
        coord,
        owner: NodeOwner::River(river),
    }
}

/// Assemble the final graph from river strands and resolved neighbors.
pub fn finalize_graph(
    fields: &FieldMap,
    rivers: &RiverNetwork,
    neighbors: &[FieldNeighbor],
) -> Result<WorldGraph, BakeError> {
    let grid = fields.grid();
    let mut builder = GraphBuilder::new(grid);

    for strand in rivers.strands() {
        for pair in strand.points.windows(2) {
            builder.edge(
                river_id(rivers, pair[0], strand.river),
                river_id(rivers, pair[1], strand.river),
                None,
                None,
                EdgeKind::RiverFlow,
            );
        }

        let (Some(&first), Some(&last)) = (strand.points.first(), strand.points.last()) else {
            continue;
        };
        if rivers.point_type(grid.index(first)) == RiverPointType::Source {
            match fields.field_at(first) {
                UNSET_FIELD => tracing::warn!(
                    target: "graph_bake::finalize",
                    x = first.x,
                    y = first.y,
                    "finalize.source_outside_fields"
                ),
                field => {
                    builder.edge(
                        field_id(fields, field)?,
                        river_id(rivers, first, strand.river),
                        None,
                        None,
                        EdgeKind::RiverTerminal,
                    );
                }
            }
        }
        if rivers.point_type(grid.index(last)).is_mouth() {
            match fields.field_at(last) {
                UNSET_FIELD => tracing::warn!(
                    target: "graph_bake::finalize",
                    x = last.x,
                    y = last.y,
                    "finalize.mouth_outside_fields"
                ),
                field => {
                    builder.edge(
                        river_id(rivers, last, strand.river),
                        field_id(fields, field)?,
                        None,
                        None,
                        EdgeKind::RiverTerminal,
                    );
                }
            }
        }
    }

    for neighbor in neighbors {
        let a = field_id(fields, neighbor.pair.a)?;
        let b = field_id(fields, neighbor.pair.b)?;
        match (neighbor.kind, neighbor.crossing) {
            (NeighborType::IsNot, _) => {}
            (NeighborType::ByLand, _) | (NeighborType::ByRiver, None) => {
                builder.edge(a, b, Some(neighbor.distance_ground), None, EdgeKind::FieldLink);
            }
            (NeighborType::ByRiver, Some(crossing)) => {
                let strand = rivers
                    .strand_at(grid.index(crossing.cell))
                    .ok_or(BakeError::UnresolvedRiverCrossing {
                        a: neighbor.pair.a,
                        b: neighbor.pair.b,
                        coord: crossing.cell,
                    })?;
                let river = NodeId {
                    coord: crossing.cell,
                    owner: NodeOwner::River(rivers.strands()[strand as usize].river),
                };
                builder.edge(a, river, Some(crossing.leg_a), None, EdgeKind::RiverLeg);
                builder.edge(river, b, Some(crossing.leg_b), None, EdgeKind::RiverLeg);
                let river_node = builder.node(river);
                builder.edge(
                    a,
                    b,
                    Some(neighbor.distance_ground),
                    Some(river_node),
                    EdgeKind::FieldLink,
                );
            }
        }
    }

    let mut field_nodes = Vec::with_capacity(fields.field_count());
    let mut isolated = 0usize;
    for field in 0..fields.field_count() as FieldId {
        let id = field_id(fields, field)?;
        if !builder.lookup.contains_key(&id) {
            isolated += 1;
        }
        field_nodes.push(builder.node(id));
    }

    let (river_points, river_point_lists) =
        derive_river_points(&builder.nodes, &builder.edges, rivers.rivers().len());

    let graph = WorldGraph {
        nodes: builder.nodes,
        edges: builder.edges,
        field_nodes,
        river_points,
        river_point_lists,
    };
    tracing::info!(
        target: "graph_bake::finalize",
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        fields = graph.field_nodes.len(),
        isolated_fields = isolated,
        river_points = graph.river_points.len(),
        "finalize.assembled"
    );
    Ok(graph)
}

fn derive_river_points(
    nodes: &[NodeFinal],
    edges: &[EdgeFinal],
    river_count: usize,
) -> (Vec<RiverPoint>, Vec<Vec<u32>>) {
    let mut point_of_node = vec![None; nodes.len()];
    let mut points = Vec::new();
    let mut lists: Vec<Vec<u32>> = vec![Vec::new(); river_count];

    for (node_idx, node) in nodes.iter().enumerate() {
        let NodeOwner::River(river) = node.owner else {
            continue;
        };
        let point_idx = points.len() as u32;
        point_of_node[node_idx] = Some(point_idx);
        if let Some(list) = lists.get_mut(river as usize) {
            list.push(point_idx);
        }
        points.push(RiverPoint {
            river,
            node: node_idx as u32,
            starts_from_field: None,
            starts_from: Vec::new(),
            ends_into: Vec::new(),
            neighbor_fields: Vec::new(),
        });
    }

    for edge in edges {
        let a = edge.node_a as usize;
        let b = edge.node_b as usize;
        match (point_of_node[a], point_of_node[b]) {
            (Some(pa), Some(pb)) => {
                points[pa as usize].ends_into.push(pb);
                points[pb as usize].starts_from.push(pa);
            }
            (None, Some(pb)) => {
                let field = nodes[a].owner.index();
                let point = &mut points[pb as usize];
                if edge.kind == EdgeKind::RiverTerminal {
                    point.starts_from_field = Some(field);
                }
                point.neighbor_fields.push(field);
            }
            (Some(pa), None) => {
                points[pa as usize].neighbor_fields.push(nodes[b].owner.index());
            }
            (None, None) => {}
        }
    }

    for point in &mut points {
        point.neighbor_fields.sort_unstable();
        point.neighbor_fields.dedup();
    }
    (points, lists)
}
