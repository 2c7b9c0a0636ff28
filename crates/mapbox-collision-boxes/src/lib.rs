//! Mapbox Collision Boxes - Screen-Space Icon Boxes from Live Placement State
//!
//! This library recovers, from the internal render state of a running Mapbox GL renderer,
//! the screen-space boxes that the label-placement engine reserved for the icons of a symbol
//! layer, and pairs every box with the feature it was drawn for. The renderer never exposes
//! this information itself, so the boxes are re-derived corner by corner the same way the
//! renderer's own placement step computes them.
//!
//! # Architecture
//!
//! - **[`host`]**: Read-only boundary traits over the renderer's internal objects
//! - **[`CapabilitySet`]** / **[`HostApi`]**: Structural probing of the host API generation
//! - **[`wait_for_placement`]**: Bounded poll until the placement pass is stable
//! - **[`evaluate_size_for_zoom`]**: Icon size interpolation at the current zoom
//! - **[`TileProjectionContext`]**: Tile-to-screen matrix, with reconstruction on projection change
//! - **[`project_collision_box`]**: The per-symbol box projection
//! - **[`CollisionBoxCollector`]**: Walks a layer's tiles and joins boxes to features
//!
//! # Example
//!
//! ```ignore
//! let boxes = mapbox_collision_boxes::collect_collision_boxes_and_features(&map, "pois").await?;
//! for FeatureBox { screen_box, feature } in &boxes {
//!     println!("{:?} at {:?}", feature.id, screen_box);
//! }
//! ```

mod capability;
mod collector;
mod collision;
mod config;
#[cfg(test)]
mod fixtures;
pub mod host;
mod placement;
mod projection;
mod symbol_size;
mod types;

// Public API exports
pub use capability::{
    CapabilitySet, FeatureLookupSignature, HostApi, ProjectionCallArity, RenderCacheAccessor,
};
pub use collector::{CollisionBoxCollector, collect_collision_boxes_and_features};
pub use collision::{CollisionBoxInput, project_collision_box};
pub use config::{BottomPadding, CollectorConfig};
pub use placement::{PlacementWaiter, WaitState, wait_for_placement};
pub use projection::{EXTENT, TileProjectionContext, resolve_tile_projection_matrix};
pub use symbol_size::{
    InterpolatedSize, InterpolationDescriptor, SizeDescriptor, UnitBezier, evaluate_size_for_zoom,
    interpolation_factor,
};
pub use types::{FeatureBox, ScreenBox, boxes_intersect};

/// Error types for collision box collection
#[derive(Debug, thiserror::Error)]
pub enum CollisionBoxError {
    #[error("no such layer: {0}")]
    NoSuchLayer(String),

    #[error("layer \"{0}\" is not a symbol layer")]
    NotASymbolLayer(String),

    #[error("placement timed out after {timeout:?}")]
    PlacementTimeout { timeout: std::time::Duration },

    #[error("no render cache available for layer \"{0}\"")]
    MissingRenderCache(String),

    #[error("host style exposes no serialized layers")]
    MissingSerializedLayers,

    #[error("unsupported host version: {0:?}")]
    UnsupportedHostVersion(CapabilitySet),
}

impl CollisionBoxError {
    /// Whether the error rejects the requested layer itself (missing or not a symbol layer).
    ///
    /// These are surfaced immediately and retrying the same call cannot succeed.
    pub fn is_invalid_layer(&self) -> bool {
        matches!(self, Self::NoSuchLayer(_) | Self::NotASymbolLayer(_))
    }
}

pub type Result<T> = std::result::Result<T, CollisionBoxError>;
