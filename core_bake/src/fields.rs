//! Constrained multi-source flood growth that assigns every pixel a field.
//!
//! Seeds enter the queue at cost zero; each settled cell relaxes its open
//! neighbors with the geodesic step length, and the winning neighbor inherits
//! the settled cell's field id. Barriers (region boundaries, river cells,
//! river flow direction) decide which steps exist at all. Cells no seed can
//! reach keep [`UNSET_FIELD`].

use bitflags::bitflags;

use crate::error::BakeError;
use crate::geodesic::{Connectivity, PixelCoord, RasterGrid};
use crate::queue::RasterQueue;

pub type FieldId = u32;

/// Field id of a cell no seed reached.
pub const UNSET_FIELD: FieldId = FieldId::MAX;

/// Flat index sentinel for "no downstream cell".
pub const NO_PARENT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    pub coord: PixelCoord,
    pub field: FieldId,
}

bitflags! {
    /// Steps the flood is not allowed to take.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GrowthBarriers: u8 {
        /// Never step between cells of different regions.
        const REGION = 1 << 0;
        /// Never step into a river cell.
        const RIVER = 1 << 1;
        /// Between two river cells, only step downstream.
        const RIVER_FLOW = 1 << 2;
    }
}

/// Read-only rasters consulted by the flood.
#[derive(Debug, Clone, Copy)]
pub struct GrowthInput<'a> {
    pub grid: RasterGrid,
    pub regions: &'a [u32],
    pub rivers: Option<&'a [bool]>,
    /// Downstream neighbor of each river cell as a flat index, or [`NO_PARENT`].
    pub downstream: Option<&'a [u32]>,
}

impl<'a> GrowthInput<'a> {
    pub fn new(grid: RasterGrid, regions: &'a [u32]) -> Self {
        Self {
            grid,
            regions,
            rivers: None,
            downstream: None,
        }
    }

    pub fn with_rivers(mut self, rivers: &'a [bool]) -> Self {
        self.rivers = Some(rivers);
        self
    }

    pub fn with_downstream(mut self, downstream: &'a [u32]) -> Self {
        self.downstream = Some(downstream);
        self
    }

    fn validate(&self) -> Result<(), BakeError> {
        check_len("regions", self.grid, self.regions.len())?;
        if let Some(rivers) = self.rivers {
            check_len("rivers", self.grid, rivers.len())?;
        }
        if let Some(downstream) = self.downstream {
            check_len("downstream", self.grid, downstream.len())?;
        }
        Ok(())
    }

    #[inline]
    fn allows(&self, barriers: GrowthBarriers, from: usize, to: usize) -> bool {
        if barriers.contains(GrowthBarriers::REGION) && self.regions[from] != self.regions[to] {
            return false;
        }
        let Some(rivers) = self.rivers else {
            return true;
        };
        if !rivers[to] {
            return true;
        }
        if barriers.contains(GrowthBarriers::RIVER) {
            return false;
        }
        if barriers.contains(GrowthBarriers::RIVER_FLOW) && rivers[from] {
            if let Some(downstream) = self.downstream {
                return downstream[from] == to as u32;
            }
        }
        true
    }
}

pub(crate) fn check_len(
    name: &'static str,
    grid: RasterGrid,
    actual: usize,
) -> Result<(), BakeError> {
    if actual != grid.len() {
        return Err(BakeError::RasterSize {
            name,
            expected: grid.len(),
            actual,
        });
    }
    Ok(())
}

/// Multiplier applied to the geodesic length of one step.
pub trait StepCost {
    fn multiplier(&self, from: usize, to: usize) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UniformCost;

impl StepCost for UniformCost {
    #[inline]
    fn multiplier(&self, _from: usize, _to: usize) -> f64 {
        1.0
    }
}

impl<F> StepCost for F
where
    F: Fn(usize, usize) -> f64,
{
    #[inline]
    fn multiplier(&self, from: usize, to: usize) -> f64 {
        self(from, to)
    }
}

#[derive(Debug, Clone)]
pub struct GrowthResult {
    pub field: Vec<FieldId>,
    pub cost: Vec<f64>,
}

/// Reusable flood scratch (queue and closed set) for one raster size.
pub struct FieldGrowth {
    grid: RasterGrid,
    queue: RasterQueue,
    closed: Vec<bool>,
}

impl FieldGrowth {
    pub fn new(grid: RasterGrid) -> Self {
        Self {
            grid,
            queue: RasterQueue::for_grid(grid),
            closed: vec![false; grid.len()],
        }
    }

    pub fn grow(
        &mut self,
        input: &GrowthInput<'_>,
        seeds: &[Seed],
        barriers: GrowthBarriers,
        connectivity: Connectivity,
        step: &impl StepCost,
    ) -> Result<GrowthResult, BakeError> {
        debug_assert_eq!(input.grid, self.grid);
        input.validate()?;
        let grid = self.grid;
        self.queue.clear();
        self.closed.fill(false);

        let mut field = vec![UNSET_FIELD; grid.len()];
        let mut cost = vec![f64::INFINITY; grid.len()];

        for seed in seeds {
            if !grid.contains(seed.coord) {
                return Err(BakeError::SeedOutOfBounds {
                    field: seed.field,
                    coord: seed.coord,
                });
            }
            let idx = grid.index(seed.coord);
            if self.queue.add_or_update(idx, 0.0) {
                field[idx] = seed.field;
                cost[idx] = 0.0;
            }
        }

        let mut settled = 0usize;
        while let Some((idx, current)) = self.queue.try_pop() {
            self.closed[idx] = true;
            settled += 1;
            let coord = grid.coord(idx);
            for &next in grid.neighbors(coord, connectivity).iter() {
                let nidx = grid.index(next);
                if self.closed[nidx] || !input.allows(barriers, idx, nidx) {
                    continue;
                }
                let candidate =
                    current + grid.step_distance(coord, next) * step.multiplier(idx, nidx);
                if self.queue.add_or_update(nidx, candidate) {
                    field[nidx] = field[idx];
                    cost[nidx] = candidate;
                }
            }
        }

        tracing::debug!(
            target: "graph_bake::fields",
            seeds = seeds.len(),
            settled,
            unreached = grid.len() - settled,
            barriers = ?barriers,
            "fields.grown"
        );

        Ok(GrowthResult { field, cost })
    }
}

/// Field assignment of every pixel plus the seed pixel of every field.
#[derive(Debug, Clone)]
pub struct FieldMap {
    grid: RasterGrid,
    field: Vec<FieldId>,
    cost: Vec<f64>,
    centers: Vec<PixelCoord>,
}

impl FieldMap {
    /// Wrap an externally produced field raster.
    ///
    /// Costs are unknown for such rasters: zero at centers, infinite elsewhere.
    pub fn from_parts(
        grid: RasterGrid,
        field: Vec<FieldId>,
        centers: Vec<PixelCoord>,
    ) -> Result<Self, BakeError> {
        check_len("fields", grid, field.len())?;
        for (id, center) in centers.iter().enumerate() {
            if !grid.contains(*center) {
                return Err(BakeError::SeedOutOfBounds {
                    field: id as FieldId,
                    coord: *center,
                });
            }
        }
        if let Some(&bad) = field
            .iter()
            .find(|&&f| f != UNSET_FIELD && f as usize >= centers.len())
        {
            return Err(BakeError::SparseFieldId {
                field: bad,
                count: centers.len(),
            });
        }
        let mut cost = vec![f64::INFINITY; grid.len()];
        for center in &centers {
            cost[grid.index(*center)] = 0.0;
        }
        Ok(Self {
            grid,
            field,
            cost,
            centers,
        })
    }

    pub fn grid(&self) -> RasterGrid {
        self.grid
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.field
    }

    pub fn costs(&self) -> &[f64] {
        &self.cost
    }

    pub fn centers(&self) -> &[PixelCoord] {
        &self.centers
    }

    pub fn field_count(&self) -> usize {
        self.centers.len()
    }

    #[inline]
    pub fn field_at_index(&self, idx: usize) -> FieldId {
        self.field[idx]
    }

    #[inline]
    pub fn field_at(&self, coord: PixelCoord) -> FieldId {
        self.field[self.grid.index(coord)]
    }

    pub fn cost_at(&self, coord: PixelCoord) -> f64 {
        self.cost[self.grid.index(coord)]
    }

    pub fn center(&self, field: FieldId) -> Option<PixelCoord> {
        self.centers.get(field as usize).copied()
    }
}

/// Seeds for every set cell of `mask`, numbered in raster scan order.
pub fn collect_seeds(grid: RasterGrid, mask: &[bool]) -> Result<Vec<Seed>, BakeError> {
    check_len("seeds", grid, mask.len())?;
    Ok(mask
        .iter()
        .enumerate()
        .filter(|(_, &set)| set)
        .enumerate()
        .map(|(field, (idx, _))| Seed {
            coord: grid.coord(idx),
            field: field as FieldId,
        })
        .collect())
}

/// Grow one field per seed. Seed field ids must be exactly `0..seeds.len()`.
pub fn grow_fields(
    input: &GrowthInput<'_>,
    seeds: &[Seed],
    barriers: GrowthBarriers,
    connectivity: Connectivity,
    step: &impl StepCost,
) -> Result<FieldMap, BakeError> {
    let grid = input.grid;
    let mut centers: Vec<Option<PixelCoord>> = vec![None; seeds.len()];
    for seed in seeds {
        let slot = centers
            .get_mut(seed.field as usize)
            .ok_or(BakeError::SparseFieldId {
                field: seed.field,
                count: seeds.len(),
            })?;
        if slot.is_some() {
            return Err(BakeError::DuplicateSeed { field: seed.field });
        }
        *slot = Some(seed.coord);
    }
    // Every slot is filled: ids are unique and below the seed count.
    let centers: Vec<PixelCoord> = centers.into_iter().flatten().collect();

    let GrowthResult { field, cost } =
        FieldGrowth::new(grid).grow(input, seeds, barriers, connectivity, step)?;

    Ok(FieldMap {
        grid,
        field,
        cost,
        centers,
    })
}

/// Geodesic distance from each cell to the nearest border of its own field.
///
/// Cells touching a different field (4-neighborhood) are the zero-cost seeds;
/// growth never leaves a field. Unset cells stay infinite.
pub fn distance_to_border(
    fields: &FieldMap,
    rivers: Option<&[bool]>,
    barriers: GrowthBarriers,
    connectivity: Connectivity,
) -> Result<Vec<f64>, BakeError> {
    let grid = fields.grid();
    let mut seeds = Vec::new();
    for idx in 0..grid.len() {
        let own = fields.field_at_index(idx);
        if own == UNSET_FIELD {
            continue;
        }
        let on_border = grid.neighbors4(grid.coord(idx)).iter().any(|&n| {
            let other = fields.field_at(n);
            other != UNSET_FIELD && other != own
        });
        if on_border {
            seeds.push(Seed {
                coord: grid.coord(idx),
                field: own,
            });
        }
    }

    let mut input = GrowthInput::new(grid, fields.fields());
    if let Some(mask) = rivers {
        input = input.with_rivers(mask);
    }
    let result = FieldGrowth::new(grid).grow(
        &input,
        &seeds,
        barriers | GrowthBarriers::REGION,
        connectivity,
        &UniformCost,
    )?;
    Ok(result.cost)
}
