//! Screen-space collision box of one icon symbol
//!
//! Mirrors the box computation of the renderer's `CollisionIndex#placeCollisionBox` for
//! icons. Icons carry no text offset, so the shift term of that computation is always zero
//! and is left out.

use crate::capability::ProjectionCallArity;
use crate::config::BottomPadding;
use crate::host::{CollisionIndex, GLOBE_PROJECTION, Projection, SingleCollisionBox};
use crate::types::ScreenBox;
use glam::{DMat4, DVec3};

/// Inputs of the projection of one symbol's icon box
#[derive(Clone, Copy)]
pub struct CollisionBoxInput<'a> {
    /// Icon box in tile units, with its anchor
    pub collision_box: &'a SingleCollisionBox,
    /// Tile-to-screen matrix of the symbol's tile
    pub pos_matrix: &'a DMat4,
    /// Screen pixels per tile unit, before perspective
    pub pixel_ratio: f64,
    /// Icon scale of the symbol instance
    pub scale: f64,
    pub bucket_projection: &'a dyn Projection,
    pub bucket_projection_name: &'a str,
}

/// Project one symbol's icon box to screen space
///
/// The anchor is first lifted along the projection's up vector when the symbol floats above
/// the ground, then projected through `pos_matrix` by the host's collision index. The box is
/// scaled, padded and foreshortened around the projected point. Corners are returned as
/// computed, without reordering.
pub fn project_collision_box(
    input: &CollisionBoxInput<'_>,
    collision_index: &dyn CollisionIndex,
    projection_call: ProjectionCallArity,
    bottom_padding: BottomPadding,
) -> ScreenBox {
    let collision_box = input.collision_box;
    let transform = collision_index.transform();
    let elevation = collision_box.elevation.filter(|e| *e != 0.0 && !e.is_nan());

    let mut anchor = DVec3::from_array(collision_box.projected_anchor);
    if let (Some(elevation), Some(tile_id)) = (elevation, collision_box.tile_id.as_ref()) {
        let [tile_x, tile_y] = collision_box.tile_anchor;
        let up = input
            .bucket_projection
            .up_vector(&tile_id.canonical, tile_x, tile_y);
        let up_scale = input
            .bucket_projection
            .up_vector_scale(
                &tile_id.canonical,
                transform.center_lat(),
                transform.world_size(),
            )
            .meters_to_tile;
        anchor.x += up.x * elevation * up_scale;
        anchor.y += up.y * elevation * up_scale;
        anchor.z += up.z * elevation * up_scale;
    }

    let check_occlusion = input.bucket_projection_name == GLOBE_PROJECTION
        || elevation.is_some()
        || transform.pitch() > 0.0;

    let projected = collision_index.project_and_get_perspective_ratio(projection_call.request(
        input.pos_matrix,
        anchor,
        collision_box.tile_id.as_ref(),
        check_occlusion,
        input.bucket_projection,
    ));

    let tile_to_viewport = input.pixel_ratio * projected.perspective_ratio;
    let screen = projected.point;
    let scale = input.scale;
    let padding = collision_box.padding;

    ScreenBox {
        tl_x: (collision_box.x1 * scale - padding) * tile_to_viewport + screen.x,
        tl_y: (collision_box.y1 * scale - padding) * tile_to_viewport + screen.y,
        br_x: (collision_box.x2 * scale + padding) * tile_to_viewport + screen.x,
        br_y: (collision_box.y2 * scale + bottom_padding.signed(padding)) * tile_to_viewport
            + screen.y,
    }
}
