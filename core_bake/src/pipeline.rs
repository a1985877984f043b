//! End-to-end bake: rivers, fields, borders, neighbors, graph.

use std::time::Instant;

use bevy::ecs::world::World;
use bevy::prelude::Resource;

use crate::bake_config::BakeConfig;
use crate::borders::{trace_borders, FieldBorder};
use crate::error::BakeError;
use crate::fields::{
    check_len, collect_seeds, grow_fields, FieldId, FieldMap, GrowthInput, Seed, UniformCost,
};
use crate::finalize::{finalize_graph, WorldGraph};
use crate::geodesic::{PixelCoord, RasterGrid};
use crate::neighbors::{resolve_neighbors, FieldNeighbor};
use crate::rivers::{unwrap_rivers, RiverInputs, RiverNetwork};

/// Where field seeds come from.
#[derive(Debug, Clone)]
pub enum SeedSource {
    /// One field per set cell, numbered in scan order.
    Mask(Vec<bool>),
    /// Explicit seeds with dense field ids.
    List(Vec<Seed>),
    /// Field raster produced elsewhere; growth is skipped.
    Precomputed {
        fields: Vec<FieldId>,
        centers: Vec<PixelCoord>,
    },
}

/// Raster inputs of one bake run. All rasters are `grid.len()` cells, row-major.
#[derive(Resource, Debug, Clone)]
pub struct BakeInputs {
    pub grid: RasterGrid,
    pub regions: Vec<u32>,
    pub seeds: SeedSource,
    pub primary_rivers: Option<Vec<bool>>,
    pub secondary_rivers: Option<Vec<bool>>,
    pub primary_mouths: Vec<PixelCoord>,
    pub secondary_mouths: Vec<PixelCoord>,
}

impl BakeInputs {
    pub fn new(grid: RasterGrid, regions: Vec<u32>, seeds: SeedSource) -> Self {
        Self {
            grid,
            regions,
            seeds,
            primary_rivers: None,
            secondary_rivers: None,
            primary_mouths: Vec::new(),
            secondary_mouths: Vec::new(),
        }
    }

    /// Inputs with a single region covering the whole raster.
    pub fn uniform(grid: RasterGrid, seeds: SeedSource) -> Self {
        Self::new(grid, vec![0; grid.len()], seeds)
    }

    pub fn with_primary_rivers(mut self, mask: Vec<bool>, mouths: Vec<PixelCoord>) -> Self {
        self.primary_rivers = Some(mask);
        self.primary_mouths = mouths;
        self
    }

    pub fn with_secondary_rivers(mut self, mask: Vec<bool>, mouths: Vec<PixelCoord>) -> Self {
        self.secondary_rivers = Some(mask);
        self.secondary_mouths = mouths;
        self
    }

    fn has_rivers(&self) -> bool {
        self.primary_rivers.is_some() || self.secondary_rivers.is_some()
    }
}

/// Every stage output of a finished bake.
#[derive(Resource, Debug, Clone)]
pub struct BakedWorld {
    pub fields: FieldMap,
    pub rivers: RiverNetwork,
    pub borders: Vec<FieldBorder>,
    pub neighbors: Vec<FieldNeighbor>,
    pub graph: WorldGraph,
}

impl BakedWorld {
    pub fn grid(&self) -> RasterGrid {
        self.fields.grid()
    }
}

fn bake_rivers(inputs: &BakeInputs, config: &BakeConfig) -> Result<RiverNetwork, BakeError> {
    let grid = inputs.grid;
    if !inputs.has_rivers() {
        return Ok(RiverNetwork::empty(grid));
    }
    let none = vec![false; grid.len()];
    let primary = inputs.primary_rivers.as_deref().unwrap_or(&none);
    let secondary = inputs.secondary_rivers.as_deref().unwrap_or(&none);
    unwrap_rivers(
        RiverInputs {
            grid,
            primary,
            secondary,
            primary_mouths: &inputs.primary_mouths,
            secondary_mouths: &inputs.secondary_mouths,
        },
        config.rivers().connectivity(),
    )
}

fn bake_fields(
    inputs: &BakeInputs,
    config: &BakeConfig,
    rivers: &RiverNetwork,
) -> Result<FieldMap, BakeError> {
    let grid = inputs.grid;
    let seeds = match &inputs.seeds {
        SeedSource::Precomputed { fields, centers } => {
            return FieldMap::from_parts(grid, fields.clone(), centers.clone());
        }
        SeedSource::Mask(mask) => collect_seeds(grid, mask)?,
        SeedSource::List(seeds) => seeds.clone(),
    };

    check_len("regions", grid, inputs.regions.len())?;
    let river_mask = rivers.river_mask();
    let mut growth = GrowthInput::new(grid, &inputs.regions);
    if !rivers.strands().is_empty() {
        growth = growth
            .with_rivers(&river_mask)
            .with_downstream(rivers.downstream());
    }
    grow_fields(
        &growth,
        &seeds,
        config.fields().barriers(),
        config.fields().connectivity(),
        &UniformCost,
    )
}

/// Run every stage over `inputs`. Any fatal input violation aborts the run.
pub fn bake(inputs: &BakeInputs, config: &BakeConfig) -> Result<BakedWorld, BakeError> {
    let started = Instant::now();
    let grid = inputs.grid;

    let rivers = bake_rivers(inputs, config)?;
    let fields = bake_fields(inputs, config, &rivers)?;
    let borders = trace_borders(&fields);
    let neighbors = resolve_neighbors(&fields, &rivers, &borders, config.neighbors().params())?;
    let graph = finalize_graph(&fields, &rivers, &neighbors)?;

    tracing::info!(
        target: "graph_bake::pipeline",
        width = grid.width,
        height = grid.height,
        fields = fields.field_count(),
        borders = borders.len(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "pipeline.baked"
    );

    Ok(BakedWorld {
        fields,
        rivers,
        borders,
        neighbors,
        graph,
    })
}

/// Bake the [`BakeInputs`] resource and insert the result as [`BakedWorld`].
///
/// Uses the [`BakeConfig`] resource when present, the builtin config otherwise.
pub fn bake_world_graph(world: &mut World) -> Result<(), BakeError> {
    let config = world
        .get_resource::<BakeConfig>()
        .cloned()
        .unwrap_or_else(|| BakeConfig::builtin().as_ref().clone());
    let baked = {
        let Some(inputs) = world.get_resource::<BakeInputs>() else {
            tracing::warn!(target: "graph_bake::pipeline", "pipeline.missing_inputs");
            return Ok(());
        };
        bake(inputs, &config)?
    };
    world.insert_resource(baked);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::EdgeKind;
    use bevy::math::UVec2;

    fn two_seed_mask(grid: RasterGrid, a: (u32, u32), b: (u32, u32)) -> Vec<bool> {
        let mut mask = vec![false; grid.len()];
        mask[grid.index(UVec2::new(a.0, a.1))] = true;
        mask[grid.index(UVec2::new(b.0, b.1))] = true;
        mask
    }

    #[test]
    fn two_seeds_bake_into_one_edge() {
        let grid = RasterGrid::new(4, 4);
        let seeds = two_seed_mask(grid, (0, 0), (3, 3));
        let inputs = BakeInputs::uniform(grid, SeedSource::Mask(seeds));
        let baked = bake(&inputs, &BakeConfig::default()).expect("bake");

        assert_eq!(baked.fields.field_count(), 2);
        // Rows near a pole are short, so the split runs along latitude.
        for idx in 0..grid.len() {
            let expected = u32::from(grid.coord(idx).y >= 2);
            assert_eq!(baked.fields.field_at_index(idx), expected);
        }
        assert_eq!(baked.borders.len(), 1);
        let line: Vec<UVec2> = (0..=4).map(|x| UVec2::new(x, 2)).collect();
        assert_eq!(baked.borders[0].polylines, vec![line]);
        assert_eq!(baked.graph.nodes.len(), 2);
        assert_eq!(baked.graph.edges.len(), 1);
        let edge = &baked.graph.edges[0];
        assert_eq!(edge.kind, EdgeKind::FieldLink);
        assert!(edge.distance_ground >= edge.distance_air - 1e-12);
    }

    #[test]
    fn precomputed_fields_skip_growth() {
        let grid = RasterGrid::new(6, 2);
        let fields: Vec<FieldId> = (0..grid.len())
            .map(|i| if grid.coord(i).x < 3 { 0 } else { 1 })
            .collect();
        let inputs = BakeInputs::uniform(
            grid,
            SeedSource::Precomputed {
                fields: fields.clone(),
                centers: vec![UVec2::new(1, 0), UVec2::new(4, 1)],
            },
        );
        let baked = bake(&inputs, &BakeConfig::default()).expect("bake");
        assert_eq!(baked.fields.fields(), fields.as_slice());
        assert_eq!(baked.graph.field_nodes.len(), 2);
    }

    #[test]
    fn short_region_raster_is_fatal() {
        let grid = RasterGrid::new(4, 4);
        let inputs = BakeInputs::new(
            grid,
            vec![0; 3],
            SeedSource::Mask(two_seed_mask(grid, (0, 0), (3, 3))),
        );
        assert!(matches!(
            bake(&inputs, &BakeConfig::default()),
            Err(BakeError::RasterSize { name: "regions", .. })
        ));
    }

    #[test]
    fn world_entry_point_inserts_the_result() {
        let grid = RasterGrid::new(8, 4);
        let mut world = World::new();
        world.insert_resource(BakeInputs::uniform(
            grid,
            SeedSource::Mask(two_seed_mask(grid, (1, 1), (5, 2))),
        ));
        bake_world_graph(&mut world).expect("bake");
        let baked = world.get_resource::<BakedWorld>().expect("baked world resource");
        assert_eq!(baked.grid(), grid);
        assert_eq!(baked.graph.field_nodes.len(), 2);
    }

    #[test]
    fn runs_as_an_exclusive_system() {
        use bevy::ecs::system::RunSystemOnce;

        let grid = RasterGrid::new(8, 4);
        let mut world = World::new();
        world.insert_resource(BakeConfig::default());
        world.insert_resource(BakeInputs::uniform(
            grid,
            SeedSource::Mask(two_seed_mask(grid, (0, 1), (4, 1))),
        ));
        let ok = world.run_system_once(|world: &mut World| bake_world_graph(world).is_ok());
        assert!(ok);
        assert!(world.contains_resource::<BakedWorld>());
    }

    #[test]
    fn world_without_inputs_is_left_alone() {
        let mut world = World::new();
        bake_world_graph(&mut world).expect("no inputs is not an error");
        assert!(world.get_resource::<BakedWorld>().is_none());
    }
}
