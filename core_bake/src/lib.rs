//! Raster-to-graph bake for spherical worlds.
//!
//! Turns region, seed and river rasters into a graph of territorial fields:
//! constrained flood growth assigns every pixel a field, borders between
//! fields are stitched into polylines, river masks are unwrapped into strands,
//! bordering fields are connected by bounded A*, and everything is
//! deduplicated into one node/edge graph. Run it with [`bake`] or, inside an
//! ECS world, with [`bake_world_graph`].

pub mod bake_config;
pub mod borders;
mod error;
pub mod export;
pub mod fields;
pub mod finalize;
pub mod geodesic;
pub mod neighbors;
mod pipeline;
pub mod queue;
pub mod rivers;

pub use bake_config::{
    load_bake_config_from_env, BakeConfig, BakeConfigError, BakeConfigMetadata,
    BUILTIN_BAKE_CONFIG,
};
pub use borders::{trace_borders, BorderSegment, FieldBorder, FieldPair};
pub use error::BakeError;
pub use fields::{
    collect_seeds, distance_to_border, grow_fields, FieldGrowth, FieldId, FieldMap,
    GrowthBarriers, GrowthInput, Seed, StepCost, UniformCost, UNSET_FIELD,
};
pub use finalize::{
    finalize_graph, EdgeFinal, EdgeKind, NodeFinal, NodeId, NodeOwner, RiverPoint, WorldGraph,
};
pub use geodesic::{sphere_distance, Connectivity, PixelCoord, RasterGrid};
pub use neighbors::{resolve_neighbors, FieldNeighbor, NeighborParams, NeighborType};
pub use pipeline::{bake, bake_world_graph, BakeInputs, BakedWorld, SeedSource};
pub use queue::{AStarQueue, PriorityQueue, QueueError, RasterQueue};
pub use rivers::{unwrap_rivers, RiverInputs, RiverNetwork, RiverPointType, RiverStrand};
