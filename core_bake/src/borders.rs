//! Border segment extraction between adjacent fields and polyline stitching.

use std::collections::{BTreeMap, VecDeque};

use ahash::AHashMap;
use bevy::math::{DVec3, UVec2};
use rayon::prelude::*;

use crate::fields::{FieldId, FieldMap, UNSET_FIELD};
use crate::geodesic::{CornerCoord, RasterGrid};

/// Unordered pair of field ids, stored with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPair {
    pub a: FieldId,
    pub b: FieldId,
}

impl FieldPair {
    pub fn new(x: FieldId, y: FieldId) -> Self {
        debug_assert_ne!(x, y);
        Self {
            a: x.min(y),
            b: x.max(y),
        }
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.a == field || self.b == field
    }
}

/// One unit edge of the corner lattice shared by two cells of different fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderSegment {
    pub from: CornerCoord,
    pub to: CornerCoord,
}

/// Raw segments of every adjacent field pair, in raster scan order per pair.
pub fn extract_segments(fields: &FieldMap) -> BTreeMap<FieldPair, Vec<BorderSegment>> {
    let grid = fields.grid();
    let mut bag: BTreeMap<FieldPair, Vec<BorderSegment>> = BTreeMap::new();
    for y in 0..grid.height {
        for x in 0..grid.width {
            let own = fields.field_at(UVec2::new(x, y));
            if own == UNSET_FIELD {
                continue;
            }

            let east = fields.field_at(UVec2::new((x + 1) % grid.width, y));
            if east != own && east != UNSET_FIELD {
                bag.entry(FieldPair::new(own, east))
                    .or_default()
                    .push(BorderSegment {
                        from: UVec2::new(x + 1, y),
                        to: UVec2::new(x + 1, y + 1),
                    });
            }

            if y + 1 < grid.height {
                let south = fields.field_at(UVec2::new(x, y + 1));
                if south != own && south != UNSET_FIELD {
                    bag.entry(FieldPair::new(own, south))
                        .or_default()
                        .push(BorderSegment {
                            from: UVec2::new(x, y + 1),
                            to: UVec2::new(x + 1, y + 1),
                        });
                }
            }
        }
    }
    bag
}

/// Stitched borders of one field pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBorder {
    pub pair: FieldPair,
    pub polylines: Vec<Vec<CornerCoord>>,
    pub segment_count: usize,
}

impl FieldBorder {
    pub fn point_count(&self) -> usize {
        self.polylines.iter().map(Vec::len).sum()
    }

    pub fn to_sphere(&self, grid: RasterGrid) -> Vec<Vec<DVec3>> {
        self.polylines
            .iter()
            .map(|line| line.iter().map(|&c| grid.corner_to_sphere(c)).collect())
            .collect()
    }
}

/// Corners on a pole row all describe the same point.
#[inline]
fn corner_key(grid: RasterGrid, corner: CornerCoord) -> CornerCoord {
    if corner.y == 0 {
        UVec2::new(0, 0)
    } else if corner.y == grid.height {
        UVec2::new(0, grid.height)
    } else {
        corner
    }
}

struct SegmentPool<'a> {
    grid: RasterGrid,
    segments: &'a [BorderSegment],
    incident: AHashMap<CornerCoord, Vec<usize>>,
    consumed: Vec<bool>,
    used: usize,
}

impl<'a> SegmentPool<'a> {
    fn new(grid: RasterGrid, segments: &'a [BorderSegment]) -> Self {
        let mut incident: AHashMap<CornerCoord, Vec<usize>> = AHashMap::default();
        for (i, seg) in segments.iter().enumerate() {
            incident.entry(corner_key(grid, seg.from)).or_default().push(i);
            incident.entry(corner_key(grid, seg.to)).or_default().push(i);
        }
        Self {
            grid,
            segments,
            incident,
            consumed: vec![false; segments.len()],
            used: 0,
        }
    }

    fn consume(&mut self, i: usize) -> BorderSegment {
        self.consumed[i] = true;
        self.used += 1;
        self.segments[i]
    }

    /// Consume a segment touching `end` and return its far endpoint.
    fn take_at(&mut self, end: CornerCoord) -> Option<CornerCoord> {
        let key = corner_key(self.grid, end);
        let next = self
            .incident
            .get(&key)?
            .iter()
            .copied()
            .find(|&i| !self.consumed[i])?;
        let seg = self.consume(next);
        Some(if corner_key(self.grid, seg.from) == key {
            seg.to
        } else {
            seg.from
        })
    }
}

/// Chain the segments of one pair into maximal polylines. Every segment ends
/// up in exactly one polyline.
pub fn stitch_segments(
    grid: RasterGrid,
    pair: FieldPair,
    segments: &[BorderSegment],
) -> FieldBorder {
    let mut pool = SegmentPool::new(grid, segments);
    let mut polylines = Vec::new();

    for start in 0..segments.len() {
        if pool.consumed[start] {
            continue;
        }
        let first = pool.consume(start);
        let mut path = VecDeque::from([first.from, first.to]);
        while let Some(&tail) = path.back() {
            match pool.take_at(tail) {
                Some(next) => path.push_back(next),
                None => break,
            }
        }
        while let Some(&head) = path.front() {
            match pool.take_at(head) {
                Some(next) => path.push_front(next),
                None => break,
            }
        }
        polylines.push(Vec::from(path));
    }

    debug_assert_eq!(pool.used, segments.len(), "segments left unstitched");

    FieldBorder {
        pair,
        polylines,
        segment_count: segments.len(),
    }
}

/// Extract and stitch the borders of every adjacent field pair, ordered by pair.
pub fn trace_borders(fields: &FieldMap) -> Vec<FieldBorder> {
    let grid = fields.grid();
    let bag: Vec<(FieldPair, Vec<BorderSegment>)> = extract_segments(fields).into_iter().collect();
    let segments: usize = bag.iter().map(|(_, s)| s.len()).sum();

    let borders = bag
        .par_iter()
        .map(|(pair, segs)| stitch_segments(grid, *pair, segs))
        .collect::<Vec<_>>();

    tracing::info!(
        target: "graph_bake::borders",
        pairs = borders.len(),
        segments,
        polylines = borders.iter().map(|b| b.polylines.len()).sum::<usize>(),
        "borders.traced"
    );
    borders
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_map(
        grid: RasterGrid,
        assign: impl Fn(u32, u32) -> FieldId,
        fields: usize,
    ) -> FieldMap {
        let raster = (0..grid.len())
            .map(|i| {
                let c = grid.coord(i);
                assign(c.x, c.y)
            })
            .collect();
        FieldMap::from_parts(grid, raster, vec![UVec2::ZERO; fields]).expect("valid field raster")
    }

    fn assert_every_segment_used(border: &FieldBorder) {
        let links: usize = border.polylines.iter().map(|l| l.len() - 1).sum();
        assert_eq!(links, border.segment_count);
        assert!(border.polylines.iter().all(|l| l.len() >= 2));
    }

    #[test]
    fn meridian_borders_join_through_the_poles() {
        let grid = RasterGrid::new(8, 4);
        let fields = field_map(grid, |x, _| if x < 4 { 0 } else { 1 }, 2);
        let borders = trace_borders(&fields);
        assert_eq!(borders.len(), 1);
        let border = &borders[0];
        assert_eq!(border.pair, FieldPair::new(1, 0));
        // Line at x=4 and the seam line at x=8 meet at both poles.
        assert_eq!(border.segment_count, 8);
        assert_eq!(border.polylines.len(), 1);
        assert_eq!(border.polylines[0].len(), 9);
        assert_every_segment_used(border);
    }

    #[test]
    fn latitude_band_border_stays_open_at_the_seam() {
        let grid = RasterGrid::new(6, 4);
        let fields = field_map(grid, |_, y| if y < 2 { 0 } else { 1 }, 2);
        let borders = trace_borders(&fields);
        let border = &borders[0];
        assert_eq!(border.polylines.len(), 1);
        let line = &border.polylines[0];
        assert_eq!(line.len(), 7);
        let ends = [line[0], line[6]];
        assert!(ends.contains(&UVec2::new(0, 2)));
        assert!(ends.contains(&UVec2::new(6, 2)));
        assert_every_segment_used(border);
    }

    #[test]
    fn enclave_border_closes_on_itself() {
        let grid = RasterGrid::new(6, 6);
        let fields = field_map(
            grid,
            |x, y| if (2..4).contains(&x) && (2..4).contains(&y) { 1 } else { 0 },
            2,
        );
        let borders = trace_borders(&fields);
        let border = &borders[0];
        assert_eq!(border.segment_count, 8);
        assert_eq!(border.polylines.len(), 1);
        let ring = &border.polylines[0];
        assert_eq!(ring.len(), 9);
        assert_eq!(ring.first(), ring.last());
        assert_every_segment_used(border);
    }

    #[test]
    fn scrambled_segments_are_all_stitched() {
        let grid = RasterGrid::new(8, 8);
        let seg = |a: (u32, u32), b: (u32, u32)| BorderSegment {
            from: UVec2::new(a.0, a.1),
            to: UVec2::new(b.0, b.1),
        };
        // A unit square ring and a detached three-step line, interleaved.
        let segments = vec![
            seg((2, 3), (2, 2)),
            seg((5, 5), (6, 5)),
            seg((3, 2), (3, 3)),
            seg((7, 5), (6, 5)),
            seg((2, 2), (3, 2)),
            seg((7, 6), (7, 5)),
            seg((3, 3), (2, 3)),
        ];
        let border = stitch_segments(grid, FieldPair::new(0, 1), &segments);

        assert_eq!(border.polylines.len(), 2);
        assert_every_segment_used(&border);
        let ring = &border.polylines[0];
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        let line = &border.polylines[1];
        assert_eq!(line.len(), 4);
        let ends = [line[0], line[3]];
        assert!(ends.contains(&UVec2::new(5, 5)) && ends.contains(&UVec2::new(7, 6)));
    }

    #[test]
    fn unset_cells_produce_no_segments() {
        let grid = RasterGrid::new(4, 2);
        let fields = field_map(grid, |x, _| if x == 0 { 0 } else { UNSET_FIELD }, 1);
        assert!(extract_segments(&fields).is_empty());
    }

    #[test]
    fn pairs_come_out_sorted_and_complete() {
        let grid = RasterGrid::new(9, 3);
        let fields = field_map(grid, |x, _| x / 3, 3);
        let borders = trace_borders(&fields);
        let pairs: Vec<_> = borders.iter().map(|b| (b.pair.a, b.pair.b)).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
        for border in &borders {
            assert_every_segment_used(border);
        }
    }

    #[test]
    fn sphere_polylines_match_corner_counts() {
        let grid = RasterGrid::new(6, 4);
        let fields = field_map(grid, |_, y| if y < 2 { 0 } else { 1 }, 2);
        let borders = trace_borders(&fields);
        let geo = borders[0].to_sphere(grid);
        assert_eq!(geo[0].len(), borders[0].point_count());
        assert!(geo[0].iter().all(|p| (p.length() - 1.0).abs() < 1e-12));
    }
}
