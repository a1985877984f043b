//! River network unwrapping: mouth-seeded floods build a parent chain toward
//! each mouth, source-first walks classify every river cell, and a second walk
//! cuts the chains into strands at every confluence.
//!
//! Stage order:
//!
//! 1. primary flood from primary mouths over the primary mask;
//! 2. primary classification from every primary source, longest first;
//! 3. secondary flood seeded from every classified primary cell and every
//!    secondary mouth, over untyped cells of the secondary mask;
//! 4. secondary classification;
//! 5. primary then secondary strand indexing, splitting at connection points;
//! 6. strand linking (`ends_into` / `starts_from`).
//!
//! Classifying both networks before indexing either one lets a tributary that
//! joins a primary river split the primary strand at the join.

use crate::error::BakeError;
use crate::fields::{check_len, NO_PARENT};
use crate::geodesic::{Connectivity, PixelCoord, RasterGrid};
use crate::queue::RasterQueue;

/// Strand index sentinel for cells outside every strand.
pub const NO_STRAND: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RiverPointType {
    #[default]
    None,
    River,
    Source,
    MouthPrimary,
    MouthSecondary,
    /// Last cell of a primary tributary before it joins another river.
    ConnectionIn,
    /// Cell where a primary tributary joins.
    ConnectionInPoint,
    /// Last cell of a secondary river before it joins another river.
    ConnectionOut,
    /// Cell where a secondary river joins.
    ConnectionOutPoint,
}

impl RiverPointType {
    pub fn is_connection_point(self) -> bool {
        matches!(
            self,
            RiverPointType::ConnectionInPoint | RiverPointType::ConnectionOutPoint
        )
    }

    pub fn is_mouth(self) -> bool {
        matches!(
            self,
            RiverPointType::MouthPrimary | RiverPointType::MouthSecondary
        )
    }

    /// A later walk that arrives here turns this cell into a connection point.
    fn accepts_join(self) -> bool {
        matches!(
            self,
            RiverPointType::River | RiverPointType::ConnectionIn | RiverPointType::ConnectionOut
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct WalkLabels {
    start: RiverPointType,
    connection: RiverPointType,
    point: RiverPointType,
    mouth: RiverPointType,
}

const PRIMARY_LABELS: WalkLabels = WalkLabels {
    start: RiverPointType::Source,
    connection: RiverPointType::ConnectionIn,
    point: RiverPointType::ConnectionInPoint,
    mouth: RiverPointType::MouthPrimary,
};

const SECONDARY_LABELS: WalkLabels = WalkLabels {
    start: RiverPointType::River,
    connection: RiverPointType::ConnectionOut,
    point: RiverPointType::ConnectionOutPoint,
    mouth: RiverPointType::MouthSecondary,
};

#[derive(Debug, Clone, Copy)]
pub struct RiverInputs<'a> {
    pub grid: RasterGrid,
    pub primary: &'a [bool],
    pub secondary: &'a [bool],
    pub primary_mouths: &'a [PixelCoord],
    pub secondary_mouths: &'a [PixelCoord],
}

impl<'a> RiverInputs<'a> {
    fn validate(&self) -> Result<(), BakeError> {
        check_len("primary_rivers", self.grid, self.primary.len())?;
        check_len("secondary_rivers", self.grid, self.secondary.len())?;
        let checks = self
            .primary_mouths
            .iter()
            .map(|m| (m, self.primary))
            .chain(self.secondary_mouths.iter().map(|m| (m, self.secondary)));
        for (&coord, mask) in checks {
            if !self.grid.contains(coord) {
                return Err(BakeError::MouthOutOfBounds { coord });
            }
            if !mask[self.grid.index(coord)] {
                return Err(BakeError::MouthOffRiver { coord });
            }
        }
        Ok(())
    }
}

/// Ordered run of cells between two notable points, in flow direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiverStrand {
    pub river: u32,
    pub points: Vec<PixelCoord>,
    /// Strands whose last cell this strand owns. That cell is usually this
    /// strand's first cell (a confluence), but a tributary joining at a mouth
    /// ends on this strand's last cell instead.
    pub starts_from: Vec<u32>,
    /// Strand owning this strand's last cell, when it is not this strand.
    pub ends_into: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct RiverNetwork {
    grid: RasterGrid,
    point_type: Vec<RiverPointType>,
    strand_of: Vec<u32>,
    parent: Vec<u32>,
    strands: Vec<RiverStrand>,
    rivers: Vec<Vec<u32>>,
}

impl RiverNetwork {
    pub fn empty(grid: RasterGrid) -> Self {
        Self {
            grid,
            point_type: vec![RiverPointType::None; grid.len()],
            strand_of: vec![NO_STRAND; grid.len()],
            parent: vec![NO_PARENT; grid.len()],
            strands: Vec::new(),
            rivers: Vec::new(),
        }
    }

    pub fn grid(&self) -> RasterGrid {
        self.grid
    }

    pub fn point_type(&self, idx: usize) -> RiverPointType {
        self.point_type[idx]
    }

    pub fn strand_at(&self, idx: usize) -> Option<u32> {
        Some(self.strand_of[idx]).filter(|&s| s != NO_STRAND)
    }

    #[inline]
    pub fn is_river(&self, idx: usize) -> bool {
        self.strand_of[idx] != NO_STRAND
    }

    pub fn strands(&self) -> &[RiverStrand] {
        &self.strands
    }

    /// Strand ids of each logical river, in creation order.
    pub fn rivers(&self) -> &[Vec<u32>] {
        &self.rivers
    }

    /// Next cell toward the mouth as a flat index, or [`NO_PARENT`].
    pub fn downstream(&self) -> &[u32] {
        &self.parent
    }

    pub fn river_mask(&self) -> Vec<bool> {
        self.strand_of.iter().map(|&s| s != NO_STRAND).collect()
    }

    pub fn river_cell_count(&self) -> usize {
        self.strand_of.iter().filter(|&&s| s != NO_STRAND).count()
    }
}

struct PendingStrand {
    river: u32,
    points: Vec<u32>,
}

/// Staged river unwrapping over one raster.
pub struct RiverUnwrapper<'a> {
    inputs: RiverInputs<'a>,
    connectivity: Connectivity,
    queue: RasterQueue,
    point_type: Vec<RiverPointType>,
    parent: Vec<u32>,
    river_of: Vec<u32>,
    strand_of: Vec<u32>,
    strands: Vec<PendingStrand>,
}

impl<'a> RiverUnwrapper<'a> {
    pub fn new(inputs: RiverInputs<'a>, connectivity: Connectivity) -> Result<Self, BakeError> {
        inputs.validate()?;
        let len = inputs.grid.len();
        Ok(Self {
            inputs,
            connectivity,
            queue: RasterQueue::for_grid(inputs.grid),
            point_type: vec![RiverPointType::None; len],
            parent: vec![NO_PARENT; len],
            river_of: vec![NO_PARENT; len],
            strand_of: vec![NO_STRAND; len],
            strands: Vec::new(),
        })
    }

    pub fn run(mut self) -> RiverNetwork {
        let sources = self.trace_primary_flow();
        self.draw_primary_types(&sources);
        let leaves = self.trace_secondary_flow();
        self.draw_secondary_types(&leaves);
        self.draw_primary_indexes(&sources);
        self.draw_secondary_indexes(&leaves);

        tracing::debug!(
            target: "graph_bake::rivers",
            sources = sources.len(),
            secondary_leaves = leaves.len(),
            "rivers.walked"
        );
        self.finish()
    }

    /// Flood the primary mask from the primary mouths; returns the sources,
    /// farthest first.
    pub fn trace_primary_flow(&mut self) -> Vec<usize> {
        let grid = self.inputs.grid;
        let seeds: Vec<(usize, u32)> = self
            .inputs
            .primary_mouths
            .iter()
            .enumerate()
            .map(|(river, &m)| (grid.index(m), river as u32))
            .collect();
        let mask = self.inputs.primary;
        self.flood(&seeds, mask, false)
    }

    pub fn draw_primary_types(&mut self, sources: &[usize]) {
        for &start in sources {
            self.classify_walk(start, PRIMARY_LABELS);
        }
    }

    /// Flood the secondary mask from every classified primary cell and from
    /// the secondary mouths; returns the secondary leaves, farthest first.
    pub fn trace_secondary_flow(&mut self) -> Vec<usize> {
        let grid = self.inputs.grid;
        let first_secondary = self.inputs.primary_mouths.len() as u32;
        let mut seeds: Vec<(usize, u32)> = (0..grid.len())
            .filter(|&idx| self.point_type[idx] != RiverPointType::None)
            .map(|idx| (idx, self.river_of[idx]))
            .collect();
        seeds.extend(
            self.inputs
                .secondary_mouths
                .iter()
                .enumerate()
                .map(|(i, &m)| (grid.index(m), first_secondary + i as u32))
                .filter(|&(idx, _)| self.point_type[idx] == RiverPointType::None),
        );
        let mask = self.inputs.secondary;
        self.flood(&seeds, mask, true)
    }

    pub fn draw_secondary_types(&mut self, leaves: &[usize]) {
        for &start in leaves {
            self.classify_walk(start, SECONDARY_LABELS);
        }
    }

    pub fn draw_primary_indexes(&mut self, sources: &[usize]) {
        self.index_walks(sources);
    }

    pub fn draw_secondary_indexes(&mut self, leaves: &[usize]) {
        self.index_walks(leaves);
    }

    /// Dijkstra over `mask`, recording parents and river ids; returns the
    /// non-seed cells nobody flows through, sorted by cost descending.
    fn flood(&mut self, seeds: &[(usize, u32)], mask: &[bool], untyped_only: bool) -> Vec<usize> {
        let grid = self.inputs.grid;
        self.queue.clear();
        let mut is_seed = vec![false; grid.len()];
        for &(idx, river) in seeds {
            if self.queue.add_or_update(idx, 0.0) {
                self.river_of[idx] = river;
                is_seed[idx] = true;
            }
        }

        let mut reached = Vec::new();
        while let Some((idx, cost)) = self.queue.try_pop() {
            let coord = grid.coord(idx);
            for &next in grid.neighbors(coord, self.connectivity).iter() {
                let n = grid.index(next);
                if !mask[n] || is_seed[n] {
                    continue;
                }
                if untyped_only && self.point_type[n] != RiverPointType::None {
                    continue;
                }
                let candidate = cost + grid.step_distance(coord, next);
                if self.queue.add_or_update(n, candidate) {
                    self.parent[n] = idx as u32;
                    self.river_of[n] = self.river_of[idx];
                }
            }
            if !is_seed[idx] {
                reached.push(idx);
            }
        }

        let mut has_child = vec![false; grid.len()];
        for &idx in &reached {
            let parent = self.parent[idx];
            if parent != NO_PARENT {
                has_child[parent as usize] = true;
            }
        }
        let mut leaves: Vec<(usize, f64)> = reached
            .into_iter()
            .filter(|&idx| !has_child[idx])
            .map(|idx| (idx, self.queue.try_get_cost(&idx).unwrap_or(0.0)))
            .collect();
        leaves.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        leaves.into_iter().map(|(idx, _)| idx).collect()
    }

    fn classify_walk(&mut self, start: usize, labels: WalkLabels) {
        let mut prev: Option<usize> = None;
        let mut cur = start;
        loop {
            let existing = self.point_type[cur];
            if existing != RiverPointType::None {
                if let Some(p) = prev {
                    if self.point_type[p] != RiverPointType::Source {
                        self.point_type[p] = labels.connection;
                    }
                }
                if existing.accepts_join() {
                    self.point_type[cur] = labels.point;
                }
                return;
            }
            let parent = self.parent[cur];
            self.point_type[cur] = if parent == NO_PARENT {
                labels.mouth
            } else if prev.is_none() {
                labels.start
            } else {
                RiverPointType::River
            };
            if parent == NO_PARENT {
                return;
            }
            prev = Some(cur);
            cur = parent as usize;
        }
    }

    fn index_walks(&mut self, starts: &[usize]) {
        for &start in starts {
            let river = self.river_of[start];
            let mut points: Vec<u32> = Vec::new();
            let mut cur = start;
            loop {
                if self.strand_of[cur] != NO_STRAND {
                    points.push(cur as u32);
                    self.close_strand(river, points, false);
                    break;
                }
                points.push(cur as u32);
                if self.point_type[cur].is_connection_point() && points.len() > 1 {
                    let finished = std::mem::replace(&mut points, vec![cur as u32]);
                    self.close_strand(river, finished, false);
                }
                let parent = self.parent[cur];
                if parent == NO_PARENT {
                    self.close_strand(river, points, true);
                    break;
                }
                cur = parent as usize;
            }
        }
    }

    /// Store a strand of two or more cells and stamp the cells it owns. A
    /// strand that stops at a split or at another strand leaves its last cell
    /// to that strand.
    fn close_strand(&mut self, river: u32, points: Vec<u32>, owns_last: bool) {
        if points.len() < 2 {
            return;
        }
        let id = self.strands.len() as u32;
        let owned = if owns_last {
            points.len()
        } else {
            points.len() - 1
        };
        for &p in &points[..owned] {
            self.strand_of[p as usize] = id;
        }
        self.strands.push(PendingStrand { river, points });
    }

    fn finish(self) -> RiverNetwork {
        let grid = self.inputs.grid;
        let river_count = self.inputs.primary_mouths.len() + self.inputs.secondary_mouths.len();
        let mut rivers: Vec<Vec<u32>> = vec![Vec::new(); river_count];
        let mut strands: Vec<RiverStrand> = self
            .strands
            .iter()
            .enumerate()
            .map(|(id, pending)| {
                if let Some(list) = rivers.get_mut(pending.river as usize) {
                    list.push(id as u32);
                }
                RiverStrand {
                    river: pending.river,
                    points: pending.points.iter().map(|&p| grid.coord(p as usize)).collect(),
                    starts_from: Vec::new(),
                    ends_into: Vec::new(),
                }
            })
            .collect();

        for (id, pending) in self.strands.iter().enumerate() {
            let Some(&last) = pending.points.last() else {
                continue;
            };
            let owner = self.strand_of[last as usize];
            if owner != NO_STRAND && owner as usize != id {
                strands[id].ends_into.push(owner);
                strands[owner as usize].starts_from.push(id as u32);
            }
        }

        let network = RiverNetwork {
            grid,
            point_type: self.point_type,
            strand_of: self.strand_of,
            parent: self.parent,
            strands,
            rivers,
        };
        tracing::info!(
            target: "graph_bake::rivers",
            rivers = network.rivers.len(),
            strands = network.strands.len(),
            cells = network.river_cell_count(),
            "rivers.unwrapped"
        );
        network
    }
}

/// Unwrap the primary and secondary river masks into strands.
pub fn unwrap_rivers(
    inputs: RiverInputs<'_>,
    connectivity: Connectivity,
) -> Result<RiverNetwork, BakeError> {
    Ok(RiverUnwrapper::new(inputs, connectivity)?.run())
}
