use thiserror::Error;

use crate::fields::FieldId;
use crate::geodesic::PixelCoord;
use crate::queue::QueueError;

/// Fatal input-data violations that abandon a bake run.
///
/// Expected non-reachability (unset fields, fields that are not neighbors,
/// pairs without border segments) is reported through sentinel values and
/// never surfaces here.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("raster `{name}` has {actual} cells, expected {expected}")]
    RasterSize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("seed for field {field} at {coord} lies outside the raster")]
    SeedOutOfBounds { field: FieldId, coord: PixelCoord },
    #[error("field {field} is seeded more than once")]
    DuplicateSeed { field: FieldId },
    #[error("field id {field} is not below the field count {count}")]
    SparseFieldId { field: FieldId, count: usize },
    #[error("river mouth {coord} lies outside the raster")]
    MouthOutOfBounds { coord: PixelCoord },
    #[error("river mouth {coord} does not lie on a river cell")]
    MouthOffRiver { coord: PixelCoord },
    #[error("river crossing at {coord} between fields {a} and {b} does not resolve to a river")]
    UnresolvedRiverCrossing {
        a: FieldId,
        b: FieldId,
        coord: PixelCoord,
    },
    #[error("field {field} has no graph node")]
    FieldWithoutNode { field: FieldId },
    #[error(transparent)]
    Queue(#[from] QueueError),
}
