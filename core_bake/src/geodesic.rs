//! Raster to unit-sphere projection and pixel neighborhoods.
//!
//! The raster is an equirectangular plane: `x` runs west to east and wraps at
//! the seam, `y` runs north to south and stops at the poles. Pixel centers sit
//! on half-integer plane coordinates, border corners on the integer lattice
//! (`0..=width` by `0..=height`).

use std::f64::consts::{PI, TAU};

use bevy::math::{DVec2, DVec3, UVec2};
use serde::Deserialize;

/// Integer pixel position inside a [`RasterGrid`].
pub type PixelCoord = UVec2;

/// Integer corner position on the lattice between pixels.
pub type CornerCoord = UVec2;

/// Neighborhood used when a routine walks the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

// E, N, W, S
const DIRS_4: [(i32, i32); 4] = [(1, 0), (0, -1), (-1, 0), (0, 1)];
// E, NE, N, NW, W, SW, S, SE
const DIRS_8: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Fixed-capacity neighbor list; never holds the center pixel or duplicates.
#[derive(Debug, Clone, Copy)]
pub struct Neighbors {
    items: [PixelCoord; 8],
    len: usize,
}

impl Neighbors {
    fn empty() -> Self {
        Self {
            items: [PixelCoord::ZERO; 8],
            len: 0,
        }
    }

    fn push_unique(&mut self, coord: PixelCoord) {
        if self.as_slice().contains(&coord) {
            return;
        }
        self.items[self.len] = coord;
        self.len += 1;
    }

    pub fn as_slice(&self) -> &[PixelCoord] {
        &self.items[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PixelCoord> {
        self.as_slice().iter()
    }
}

impl<'a> IntoIterator for &'a Neighbors {
    type Item = &'a PixelCoord;
    type IntoIter = std::slice::Iter<'a, PixelCoord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Dimensions of every raster handled by one bake run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterGrid {
    pub width: u32,
    pub height: u32,
}

impl RasterGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat row-major index of `coord`.
    #[inline]
    pub fn index(&self, coord: PixelCoord) -> usize {
        debug_assert!(self.contains(coord));
        coord.y as usize * self.width as usize + coord.x as usize
    }

    #[inline]
    pub fn coord(&self, idx: usize) -> PixelCoord {
        let w = self.width as usize;
        UVec2::new((idx % w) as u32, (idx / w) as u32)
    }

    #[inline]
    pub fn contains(&self, coord: PixelCoord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    /// Normalized plane coordinates of an arbitrary plane position.
    pub fn plane_uv(&self, x: f64, y: f64) -> DVec2 {
        DVec2::new(x / self.width as f64, y / self.height as f64)
    }

    pub fn pixel_to_sphere(&self, coord: PixelCoord) -> DVec3 {
        uv_to_sphere(self.plane_uv(coord.x as f64 + 0.5, coord.y as f64 + 0.5))
    }

    #[inline]
    pub fn index_to_sphere(&self, idx: usize) -> DVec3 {
        self.pixel_to_sphere(self.coord(idx))
    }

    pub fn corner_to_sphere(&self, corner: CornerCoord) -> DVec3 {
        uv_to_sphere(self.plane_uv(corner.x as f64, corner.y as f64))
    }

    /// Pixel containing `point`; the inverse of [`RasterGrid::pixel_to_sphere`].
    pub fn sphere_to_pixel(&self, point: DVec3) -> PixelCoord {
        let uv = sphere_to_uv(point);
        let w = self.width as i64;
        let h = self.height as i64;
        let x = ((uv.x * self.width as f64).floor() as i64).rem_euclid(w.max(1));
        let y = ((uv.y * self.height as f64).floor() as i64).clamp(0, (h - 1).max(0));
        UVec2::new(x as u32, y as u32)
    }

    /// Geodesic length of a single step between two pixel centers.
    #[inline]
    pub fn step_distance(&self, a: PixelCoord, b: PixelCoord) -> f64 {
        sphere_distance(self.pixel_to_sphere(a), self.pixel_to_sphere(b))
    }

    pub fn neighbors4(&self, coord: PixelCoord) -> Neighbors {
        self.collect_neighbors(coord, &DIRS_4)
    }

    pub fn neighbors8(&self, coord: PixelCoord) -> Neighbors {
        self.collect_neighbors(coord, &DIRS_8)
    }

    pub fn neighbors(&self, coord: PixelCoord, connectivity: Connectivity) -> Neighbors {
        match connectivity {
            Connectivity::Four => self.neighbors4(coord),
            Connectivity::Eight => self.neighbors8(coord),
        }
    }

    fn collect_neighbors(&self, coord: PixelCoord, dirs: &[(i32, i32)]) -> Neighbors {
        let mut out = Neighbors::empty();
        let w = self.width as i64;
        let h = self.height as i64;
        for &(dx, dy) in dirs {
            let ny = coord.y as i64 + dy as i64;
            if ny < 0 || ny >= h {
                continue;
            }
            let nx = (coord.x as i64 + dx as i64).rem_euclid(w);
            let next = UVec2::new(nx as u32, ny as u32);
            if next != coord {
                out.push_unique(next);
            }
        }
        out
    }
}

pub fn uv_to_sphere(uv: DVec2) -> DVec3 {
    let lon = (uv.x - 0.5) * TAU;
    let lat = (0.5 - uv.y) * PI;
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

pub fn sphere_to_uv(point: DVec3) -> DVec2 {
    let p = point.normalize_or_zero();
    let lon = p.y.atan2(p.x);
    let lat = p.z.clamp(-1.0, 1.0).asin();
    DVec2::new(lon / TAU + 0.5, 0.5 - lat / PI)
}

/// Great-circle angle between two unit vectors.
///
/// `atan2(|a x b|, a . b)` stays accurate for the tiny angles between
/// adjacent pixels, where `acos` loses most of its digits.
#[inline]
pub fn sphere_distance(a: DVec3, b: DVec3) -> f64 {
    a.cross(b).length().atan2(a.dot(b))
}
