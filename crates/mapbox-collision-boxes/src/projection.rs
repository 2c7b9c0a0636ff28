//! Tile-to-screen projection matrices for symbol placement
//!
//! When the projection is switched at runtime (for instance mercator to globe), buckets built
//! before the switch keep geometry baked for their original projection. Their matrix is then
//! rebuilt from the bucket's own projection and the camera's current projection matrix, so
//! the old geometry lands where the renderer draws it without re-tessellating the bucket.

use crate::host::{OverscaledTileId, Projection, Transform};
use glam::{DMat4, Mat4};

/// Extent of tile-local coordinates
pub const EXTENT: f64 = 8192.0;

/// Matrix taking a tile's bucket geometry to clip space under the active projection
///
/// Fast path when the bucket was built with the runtime projection; otherwise the product
/// `transform.proj_matrix() * bucket_projection.create_tile_matrix(..)`, rounded to single
/// precision like the renderer's `Float32Array` result.
pub fn resolve_tile_projection_matrix(
    tile_id: &OverscaledTileId,
    bucket_projection: &dyn Projection,
    transform: &dyn Transform,
    runtime_projection: &str,
) -> DMat4 {
    let unwrapped = tile_id.to_unwrapped();
    if bucket_projection.name() == runtime_projection {
        return transform.calculate_proj_matrix(&unwrapped);
    }

    tracing::trace!(
        "Reconstructing tile matrix for {:?}: bucket projection {} differs from {}",
        tile_id,
        bucket_projection.name(),
        runtime_projection
    );
    let tile_matrix =
        bucket_projection.create_tile_matrix(transform, transform.world_size(), &unwrapped);
    round_to_f32(transform.proj_matrix() * tile_matrix)
}

#[inline]
fn round_to_f32(matrix: DMat4) -> DMat4 {
    Mat4::from_cols_array(&matrix.to_cols_array().map(|value| value as f32)).as_dmat4()
}

/// Per-tile inputs of the projection, scoped to one tile of one collection pass
#[derive(Clone, Copy)]
pub struct TileProjectionContext<'a> {
    pub tile_id: &'a OverscaledTileId,
    /// Tile size in pixels
    pub tile_size: f64,
    /// Projection the bucket was built with
    pub bucket_projection: &'a dyn Projection,
    /// Camera transform of the last placement
    pub transform: &'a dyn Transform,
    /// Name of the projection active at runtime
    pub runtime_projection: &'a str,
}

impl TileProjectionContext<'_> {
    /// Tile-to-screen matrix of the tile
    pub fn projection_matrix(&self) -> DMat4 {
        resolve_tile_projection_matrix(
            self.tile_id,
            self.bucket_projection,
            self.transform,
            self.runtime_projection,
        )
    }

    /// Screen pixels per tile unit, before perspective
    pub fn pixel_ratio(&self) -> f64 {
        self.tile_size / EXTENT
    }

    /// Whether the bucket is drawn with a projection other than the runtime one
    pub fn needs_reconstruction(&self) -> bool {
        self.bucket_projection.name() != self.runtime_projection
    }
}
