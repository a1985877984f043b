//! Cheapest center-to-center connection for every bordering field pair.
//!
//! Each pair runs a bounded A* restricted to the two fields, first over land
//! only and then, if that fails, with river cells allowed. A river path
//! reports where it crosses the river and how its cost splits around that
//! crossing.

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;

use crate::borders::{FieldBorder, FieldPair};
use crate::error::BakeError;
use crate::fields::FieldMap;
use crate::geodesic::{Connectivity, PixelCoord, RasterGrid};
use crate::queue::{AStarQueue, GeodesicHeuristic};
use crate::rivers::RiverNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NeighborType {
    /// No usable path inside the two fields.
    #[default]
    IsNot,
    ByLand,
    ByRiver,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiverCrossing {
    pub cell: PixelCoord,
    /// Path cost from the first field's center to the first river cell on the path.
    pub leg_a: f64,
    /// Remaining path cost to the second center.
    pub leg_b: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNeighbor {
    pub pair: FieldPair,
    pub kind: NeighborType,
    pub distance_ground: f64,
    pub crossing: Option<RiverCrossing>,
}

impl FieldNeighbor {
    fn not_connected(pair: FieldPair) -> Self {
        Self {
            pair,
            kind: NeighborType::IsNot,
            distance_ground: f64::INFINITY,
            crossing: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborParams {
    pub connectivity: Connectivity,
    /// Cells one A* run may settle before giving up.
    pub max_expanded_cells: usize,
    pub river_fallback: bool,
}

impl Default for NeighborParams {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            max_expanded_cells: 4_000_000,
            river_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SearchContext<'a> {
    fields: &'a FieldMap,
    rivers: &'a RiverNetwork,
    params: NeighborParams,
}

/// Per-worker A* scratch: queue, closed set and parent map, reset per pair.
pub struct NeighborSearch {
    grid: RasterGrid,
    queue: AStarQueue<usize>,
    closed: AHashSet<usize>,
    parent: AHashMap<usize, usize>,
    searches: usize,
}

impl NeighborSearch {
    pub fn new(grid: RasterGrid) -> Self {
        Self {
            grid,
            queue: AStarQueue::with_goal(grid, PixelCoord::ZERO),
            closed: AHashSet::default(),
            parent: AHashMap::default(),
            searches: 0,
        }
    }

    /// Number of A* runs this scratch has served.
    pub fn searches(&self) -> usize {
        self.searches
    }

    /// Connect the centers of `pair`, falling back to river crossings.
    pub fn resolve(
        &mut self,
        fields: &FieldMap,
        rivers: &RiverNetwork,
        pair: FieldPair,
        params: NeighborParams,
    ) -> Result<FieldNeighbor, BakeError> {
        let start = fields
            .center(pair.a)
            .ok_or(BakeError::FieldWithoutNode { field: pair.a })?;
        let goal = fields
            .center(pair.b)
            .ok_or(BakeError::FieldWithoutNode { field: pair.b })?;
        let ctx = SearchContext {
            fields,
            rivers,
            params,
        };

        if let Some(total) = self.search(ctx, pair, start, goal, false) {
            return Ok(FieldNeighbor {
                pair,
                kind: NeighborType::ByLand,
                distance_ground: total,
                crossing: None,
            });
        }
        if !params.river_fallback {
            return Ok(FieldNeighbor::not_connected(pair));
        }
        let Some(total) = self.search(ctx, pair, start, goal, true) else {
            return Ok(FieldNeighbor::not_connected(pair));
        };

        let goal_idx = self.grid.index(goal);
        let neighbor = match self.river_span(rivers, goal_idx) {
            Some((cell, first_touch)) => {
                let leg_a = self.queue.get_cost(&first_touch)?;
                FieldNeighbor {
                    pair,
                    kind: NeighborType::ByRiver,
                    distance_ground: total,
                    crossing: Some(RiverCrossing {
                        cell: self.grid.coord(cell),
                        leg_a,
                        leg_b: total - leg_a,
                    }),
                }
            }
            None => FieldNeighbor {
                pair,
                kind: NeighborType::ByLand,
                distance_ground: total,
                crossing: None,
            },
        };
        Ok(neighbor)
    }

    fn reset(&mut self, goal: PixelCoord) {
        self.queue.clear_with(GeodesicHeuristic::new(self.grid, goal));
        self.closed.clear();
        self.parent.clear();
        self.searches += 1;
    }

    /// A* from `start` to `goal` over cells of the pair's two fields. The
    /// endpoints themselves are exempt from the river exclusion.
    fn search(
        &mut self,
        ctx: SearchContext<'_>,
        pair: FieldPair,
        start: PixelCoord,
        goal: PixelCoord,
        allow_rivers: bool,
    ) -> Option<f64> {
        let grid = self.grid;
        self.reset(goal);
        let start_idx = grid.index(start);
        let goal_idx = grid.index(goal);
        self.queue.add(start_idx, 0.0);

        let mut expanded = 0usize;
        while let Some((idx, cost)) = self.queue.try_pop() {
            if idx == goal_idx {
                return Some(cost);
            }
            self.closed.insert(idx);
            expanded += 1;
            if expanded > ctx.params.max_expanded_cells {
                tracing::debug!(
                    target: "graph_bake::neighbors",
                    a = pair.a,
                    b = pair.b,
                    allow_rivers,
                    expanded,
                    "neighbors.budget_exhausted"
                );
                return None;
            }

            let coord = grid.coord(idx);
            for &next in grid.neighbors(coord, ctx.params.connectivity).iter() {
                let n = grid.index(next);
                if self.closed.contains(&n) {
                    continue;
                }
                if n != goal_idx {
                    if !pair.contains(ctx.fields.field_at_index(n)) {
                        continue;
                    }
                    if !allow_rivers && ctx.rivers.is_river(n) {
                        continue;
                    }
                }
                let candidate = cost + grid.step_distance(coord, next);
                if self.queue.add_or_update(n, candidate) {
                    self.parent.insert(n, idx);
                }
            }
        }
        None
    }

    /// River cells of the last path, walking the parent chain back from the
    /// goal: the first one met (the crossing) and the last one met (where the
    /// path first touched the river).
    fn river_span(&self, rivers: &RiverNetwork, goal: usize) -> Option<(usize, usize)> {
        let mut crossing = None;
        let mut first_touch = None;
        let mut cur = goal;
        loop {
            if rivers.is_river(cur) {
                crossing.get_or_insert(cur);
                first_touch = Some(cur);
            }
            match self.parent.get(&cur) {
                Some(&parent) => cur = parent,
                None => break,
            }
        }
        crossing.zip(first_touch)
    }
}

/// Resolve every border pair in parallel; output order follows `borders`.
pub fn resolve_neighbors(
    fields: &FieldMap,
    rivers: &RiverNetwork,
    borders: &[FieldBorder],
    params: NeighborParams,
) -> Result<Vec<FieldNeighbor>, BakeError> {
    let grid = fields.grid();
    let neighbors = borders
        .par_iter()
        .map_init(
            || NeighborSearch::new(grid),
            |search, border| search.resolve(fields, rivers, border.pair, params),
        )
        .collect::<Result<Vec<_>, _>>()?;

    let by_land = neighbors
        .iter()
        .filter(|n| n.kind == NeighborType::ByLand)
        .count();
    let by_river = neighbors
        .iter()
        .filter(|n| n.kind == NeighborType::ByRiver)
        .count();
    tracing::info!(
        target: "graph_bake::neighbors",
        pairs = neighbors.len(),
        by_land,
        by_river,
        not_connected = neighbors.len() - by_land - by_river,
        "neighbors.resolved"
    );
    Ok(neighbors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::borders::trace_borders;
    use crate::fields::{FieldId, UNSET_FIELD};
    use crate::geodesic::sphere_distance;
    use crate::rivers::{unwrap_rivers, RiverInputs};
    use bevy::math::UVec2;

    /// Field 0 west of column 6, field 1 east of it, column 0 unset so no
    /// path wraps around the seam.
    fn split_fields(grid: RasterGrid) -> FieldMap {
        let raster: Vec<FieldId> = (0..grid.len())
            .map(|i| match grid.coord(i).x {
                0 => UNSET_FIELD,
                x if x < 6 => 0,
                _ => 1,
            })
            .collect();
        FieldMap::from_parts(grid, raster, vec![UVec2::new(2, 3), UVec2::new(9, 3)])
            .expect("valid field raster")
    }

    fn river_column(grid: RasterGrid, x: u32) -> RiverNetwork {
        river_columns(grid, &[x], x)
    }

    fn river_columns(grid: RasterGrid, columns: &[u32], x: u32) -> RiverNetwork {
        let primary: Vec<bool> = (0..grid.len())
            .map(|i| columns.contains(&grid.coord(i).x))
            .collect();
        let none = vec![false; grid.len()];
        unwrap_rivers(
            RiverInputs {
                grid,
                primary: &primary,
                secondary: &none,
                primary_mouths: &[UVec2::new(x, grid.height - 1)],
                secondary_mouths: &[],
            },
            Connectivity::Four,
        )
        .expect("valid river inputs")
    }

    #[test]
    fn open_land_connects_by_land() {
        let grid = RasterGrid::new(12, 6);
        let fields = split_fields(grid);
        let rivers = RiverNetwork::empty(grid);
        let borders = trace_borders(&fields);
        let found = resolve_neighbors(&fields, &rivers, &borders, NeighborParams::default())
            .expect("neighbors");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, NeighborType::ByLand);
        let air = sphere_distance(
            grid.pixel_to_sphere(UVec2::new(2, 3)),
            grid.pixel_to_sphere(UVec2::new(9, 3)),
        );
        assert!(found[0].distance_ground >= air - 1e-12);
        assert!(found[0].crossing.is_none());
    }

    #[test]
    fn river_wall_falls_back_to_a_crossing() {
        let grid = RasterGrid::new(12, 6);
        let fields = split_fields(grid);
        let rivers = river_column(grid, 5);
        let mut search = NeighborSearch::new(grid);
        let pair = FieldPair::new(0, 1);
        let found = search
            .resolve(&fields, &rivers, pair, NeighborParams::default())
            .expect("resolve");

        assert_eq!(found.kind, NeighborType::ByRiver);
        // One land-only attempt, one attempt with rivers.
        assert_eq!(search.searches(), 2);
        let crossing = found.crossing.expect("crossing recorded");
        assert_eq!(crossing.cell.x, 5);
        assert!(crossing.leg_a > 0.0 && crossing.leg_b > 0.0);
        assert!((crossing.leg_a + crossing.leg_b - found.distance_ground).abs() < 1e-12);
    }

    #[test]
    fn wide_river_splits_legs_at_first_touch() {
        let grid = RasterGrid::new(12, 6);
        let fields = split_fields(grid);
        let rivers = river_columns(grid, &[5, 6], 6);
        let mut search = NeighborSearch::new(grid);
        let found = search
            .resolve(&fields, &rivers, FieldPair::new(0, 1), NeighborParams::default())
            .expect("resolve");

        assert_eq!(found.kind, NeighborType::ByRiver);
        let crossing = found.crossing.expect("crossing recorded");
        // Walking back from the goal, column 6 is met first.
        assert_eq!(crossing.cell.x, 6);

        let at_crossing = search
            .queue
            .try_get_cost(&grid.index(crossing.cell))
            .expect("crossing was settled");
        assert!(crossing.leg_a < at_crossing - 1e-9);
        let touches_column_5 = (0..grid.height).any(|y| {
            search
                .queue
                .try_get_cost(&grid.index(UVec2::new(5, y)))
                .is_some_and(|g| (g - crossing.leg_a).abs() < 1e-12)
        });
        assert!(touches_column_5, "leg_a is measured where the path enters the river");
        assert!((crossing.leg_a + crossing.leg_b - found.distance_ground).abs() < 1e-12);
    }

    #[test]
    fn disabled_fallback_reports_no_neighbor() {
        let grid = RasterGrid::new(12, 6);
        let fields = split_fields(grid);
        let rivers = river_column(grid, 5);
        let params = NeighborParams {
            river_fallback: false,
            ..NeighborParams::default()
        };
        let found = NeighborSearch::new(grid)
            .resolve(&fields, &rivers, FieldPair::new(0, 1), params)
            .expect("resolve");
        assert_eq!(found.kind, NeighborType::IsNot);
        assert!(found.distance_ground.is_infinite());
    }

    #[test]
    fn expansion_budget_bounds_the_search() {
        let grid = RasterGrid::new(12, 6);
        let fields = split_fields(grid);
        let rivers = RiverNetwork::empty(grid);
        let params = NeighborParams {
            max_expanded_cells: 1,
            ..NeighborParams::default()
        };
        let found = NeighborSearch::new(grid)
            .resolve(&fields, &rivers, FieldPair::new(0, 1), params)
            .expect("resolve");
        assert_eq!(found.kind, NeighborType::IsNot);
    }

    #[test]
    fn fields_apart_are_not_neighbors() {
        let grid = RasterGrid::new(12, 6);
        let raster: Vec<FieldId> = (0..grid.len())
            .map(|i| match grid.coord(i).x {
                1..=3 => 0,
                7..=9 => 1,
                _ => 2,
            })
            .collect();
        let fields = FieldMap::from_parts(
            grid,
            raster,
            vec![UVec2::new(2, 3), UVec2::new(8, 3), UVec2::new(5, 3)],
        )
        .expect("valid field raster");
        let rivers = RiverNetwork::empty(grid);
        let found = NeighborSearch::new(grid)
            .resolve(&fields, &rivers, FieldPair::new(0, 1), NeighborParams::default())
            .expect("resolve");
        assert_eq!(found.kind, NeighborType::IsNot);
    }

    #[test]
    fn missing_center_is_fatal() {
        let grid = RasterGrid::new(4, 4);
        let fields = FieldMap::from_parts(grid, vec![0; 16], vec![UVec2::new(1, 1)])
            .expect("valid field raster");
        let rivers = RiverNetwork::empty(grid);
        let result = NeighborSearch::new(grid).resolve(
            &fields,
            &rivers,
            FieldPair::new(0, 1),
            NeighborParams::default(),
        );
        assert!(matches!(result, Err(BakeError::FieldWithoutNode { field: 1 })));
    }
}
