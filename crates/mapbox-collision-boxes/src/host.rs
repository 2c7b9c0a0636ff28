//! Read-only boundary over the host renderer's internal objects
//!
//! The renderer does not publish any of these objects, and their shape moves between
//! releases. Everything this crate reads goes through the traits below, and every call
//! whose signature differs between host generations takes a typed request enum with one
//! variant per generation (see [`ProjectionRequest`] and [`FeatureLookupRequest`]).
//!
//! Nothing here mutates the host: all methods take `&self`.

use crate::capability::RenderCacheAccessor;
use crate::symbol_size::{InterpolatedSize, SizeDescriptor};
use glam::{DMat4, DVec2, DVec3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Layer kind tag of symbol layers
pub const SYMBOL_LAYER_KIND: &str = "symbol";

/// Name of the spherical projection
pub const GLOBE_PROJECTION: &str = "globe";

/// Host members whose presence identifies an internal API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostMember {
    /// `style.getOwnLayerSourceCache` (v3.0 and later)
    StyleOwnLayerSourceCache,
    /// `map._isDragging` (v2.12 and later)
    MapIsDragging,
    /// `style._serializedLayers` (v3.7 and earlier)
    StyleSerializedLayers,
    /// Query-object overload of `featureIndex.lookupSymbolFeatures` (v3.9 and later)
    FeatureIndexQueryObject,
}

/// Style layer as registered in the host style
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StyleLayer {
    /// Layer identifier
    pub id: String,
    /// Fully-qualified identifier (includes the import scope, if any)
    pub fqid: String,
    /// Layer kind tag, e.g. `"symbol"`
    pub kind: String,
    /// Whether the layer renders in 3D without terrain
    pub is_3d: bool,
    /// Whether the layer renders in 3D while terrain is enabled
    pub is_3d_on_terrain: bool,
}

impl StyleLayer {
    /// Mirrors `StyleLayer#is3D(terrainEnabled)`
    pub fn is_3d(&self, terrain_enabled: bool) -> bool {
        if terrain_enabled {
            self.is_3d_on_terrain
        } else {
            self.is_3d
        }
    }

    /// Whether the layer is a symbol layer
    pub fn is_symbol_layer(&self) -> bool {
        self.kind == SYMBOL_LAYER_KIND
    }
}

/// Canonical (unwrapped, non-overscaled) tile coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanonicalTileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Canonical tile plus the world copy it is drawn in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnwrappedTileId {
    pub wrap: i32,
    pub canonical: CanonicalTileId,
}

/// Tile identity as held by the tile cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OverscaledTileId {
    pub overscaled_z: u8,
    pub wrap: i32,
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    pub fn new(overscaled_z: u8, wrap: i32, z: u8, x: u32, y: u32) -> Self {
        Self {
            overscaled_z,
            wrap,
            canonical: CanonicalTileId { z, x, y },
        }
    }

    /// Drops the overscaling, keeping the world copy
    pub fn to_unwrapped(&self) -> UnwrappedTileId {
        UnwrappedTileId {
            wrap: self.wrap,
            canonical: self.canonical,
        }
    }
}

/// Scale factors of a projection at a given location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationScale {
    /// Tile units per meter
    pub meters_to_tile: f64,
}

/// Camera transform of the renderer
pub trait Transform {
    fn world_size(&self) -> f64;
    fn zoom(&self) -> f64;
    /// Pitch in degrees
    fn pitch(&self) -> f64;
    /// Latitude of the map center in degrees
    fn center_lat(&self) -> f64;
    /// Top-level projection matrix of the active projection
    fn proj_matrix(&self) -> DMat4;
    /// Tile-to-clip matrix under the active projection (`calculateProjMatrix`)
    fn calculate_proj_matrix(&self, unwrapped_tile_id: &UnwrappedTileId) -> DMat4;
}

/// Projection implementation (mercator, globe, ...)
pub trait Projection {
    fn name(&self) -> &str;
    /// Tile-local matrix for `id` under this projection
    fn create_tile_matrix(
        &self,
        transform: &dyn Transform,
        world_size: f64,
        id: &UnwrappedTileId,
    ) -> DMat4;
    /// Outward direction at tile-local `(x, y)`
    fn up_vector(&self, id: &CanonicalTileId, x: f64, y: f64) -> DVec3;
    fn up_vector_scale(
        &self,
        id: &CanonicalTileId,
        latitude: f64,
        world_size: f64,
    ) -> EvaluationScale;
}

/// Result of projecting an anchor to the screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenAnchorPoint {
    /// Foreshortening of tile units at the projected point
    pub perspective_ratio: f64,
    /// Screen position in pixels
    pub point: DVec2,
}

/// `projectAndGetPerspectiveRatio` in v2.11.1 and earlier: the anchor is a packed `vec3`
#[derive(Clone, Copy)]
pub struct PackedProjectionRequest<'a> {
    pub pos_matrix: &'a DMat4,
    pub point: [f64; 3],
    pub tile_id: Option<&'a OverscaledTileId>,
    pub check_occlusion: bool,
    pub bucket_projection: &'a dyn Projection,
}

/// `projectAndGetPerspectiveRatio` in v2.12 and later: the anchor is spread over three arguments
#[derive(Clone, Copy)]
pub struct SplitProjectionRequest<'a> {
    pub pos_matrix: &'a DMat4,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub tile_id: Option<&'a OverscaledTileId>,
    pub check_occlusion: bool,
    pub bucket_projection: &'a dyn Projection,
}

/// Anchor projection call, one variant per host call signature
#[derive(Clone, Copy)]
pub enum ProjectionRequest<'a> {
    Packed(PackedProjectionRequest<'a>),
    Split(SplitProjectionRequest<'a>),
}

impl<'a> ProjectionRequest<'a> {
    pub fn pos_matrix(&self) -> &'a DMat4 {
        match self {
            Self::Packed(request) => request.pos_matrix,
            Self::Split(request) => request.pos_matrix,
        }
    }

    pub fn anchor(&self) -> DVec3 {
        match self {
            Self::Packed(request) => DVec3::from_array(request.point),
            Self::Split(request) => DVec3::new(request.x, request.y, request.z),
        }
    }

    pub fn tile_id(&self) -> Option<&'a OverscaledTileId> {
        match self {
            Self::Packed(request) => request.tile_id,
            Self::Split(request) => request.tile_id,
        }
    }

    pub fn check_occlusion(&self) -> bool {
        match self {
            Self::Packed(request) => request.check_occlusion,
            Self::Split(request) => request.check_occlusion,
        }
    }

    pub fn bucket_projection(&self) -> &'a dyn Projection {
        match self {
            Self::Packed(request) => request.bucket_projection,
            Self::Split(request) => request.bucket_projection,
        }
    }
}

/// The placement engine's collision index
pub trait CollisionIndex {
    fn transform(&self) -> &dyn Transform;
    fn project_and_get_perspective_ratio(&self, request: ProjectionRequest<'_>)
    -> ScreenAnchorPoint;
}

/// Collision box of one symbol, in tile-local units relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SingleCollisionBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub padding: f64,
    /// Anchor in the bucket's projected space
    pub projected_anchor: [f64; 3],
    /// Anchor in tile coordinates
    pub tile_anchor: [f64; 2],
    /// Elevation of the symbol in meters, if it floats above the ground
    pub elevation: Option<f64>,
    pub tile_id: Option<OverscaledTileId>,
}

/// Per-tile, per-layer render data
pub trait Bucket {
    /// Symbol buckets are the only buckets that carry symbol instances
    fn as_symbol_bucket(&self) -> Option<&dyn SymbolBucket> {
        None
    }
}

/// Bucket holding the symbol instances of a tile
pub trait SymbolBucket {
    fn bucket_instance_id(&self) -> u32;
    fn icon_size_data(&self) -> &SizeDescriptor;
    fn symbol_instance_count(&self) -> usize;
    /// Index of the feature that produced symbol instance `instance`
    fn feature_index(&self, instance: usize) -> usize;
    /// Icon collision box of symbol instance `instance`, if it has an icon
    fn icon_box(&self, instance: usize) -> Option<&SingleCollisionBox>;
    /// Projection the bucket's geometry was built with
    fn projection(&self) -> &dyn Projection;
    /// Name of the projection specification the bucket was built with
    fn projection_name(&self) -> &str {
        self.projection().name()
    }
    /// Icon scale of one symbol instance (`getSymbolInstanceIconSize`)
    fn symbol_instance_icon_size(
        &self,
        icon_size: &InterpolatedSize,
        zoom: f64,
        instance: usize,
    ) -> f64;
}

/// A loaded tile
pub trait Tile {
    fn tile_id(&self) -> &OverscaledTileId;
    /// Tile size in pixels
    fn tile_size(&self) -> f64;
    fn bucket(&self, layer: &StyleLayer) -> Option<&dyn Bucket>;
}

/// Per-layer render cache (the host's `SourceCache`)
pub trait SourceCache {
    fn renderable_ids(&self, symbol_layer: bool) -> Vec<u64>;
    fn tile_by_id(&self, id: u64) -> Option<&dyn Tile>;
}

/// Filter expression, as written in the style
pub type FilterSpec = serde_json::Value;

/// Feature as exposed by the renderer's query layer
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueryFeature {
    pub id: Option<serde_json::Value>,
    pub layer_id: String,
    pub source: String,
    pub source_layer: Option<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// One looked-up feature
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResultEntry {
    pub feature_index: usize,
    pub feature: QueryFeature,
}

/// Looked-up features grouped by originating style layer
pub type QueryResult = BTreeMap<String, Vec<QueryResultEntry>>;

/// Arguments shared by every `lookupSymbolFeatures` signature
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolFeatureBatch {
    pub symbol_feature_indexes: Vec<usize>,
    pub bucket_index: u32,
    pub source_layer_index: u32,
    pub available_images: Vec<String>,
}

/// Style layers keyed by layer id (`style._layers`)
pub type StyleLayerMap = BTreeMap<String, StyleLayer>;

/// Serialized style layers keyed by layer id (`style._serializedLayers`)
pub type SerializedLayerMap = BTreeMap<String, serde_json::Value>;

/// Layer tables of the host style, handed to the legacy lookup signatures
#[derive(Debug, Clone, Copy)]
pub struct StyleLayerTables<'a> {
    pub layers: &'a StyleLayerMap,
    /// Present up to v3.7
    pub serialized_layers: Option<&'a SerializedLayerMap>,
}

/// v3.7 and earlier: serialized layers precede the bucket index
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedLayersLookup<'a> {
    pub batch: SymbolFeatureBatch,
    pub serialized_layers: &'a SerializedLayerMap,
    pub filter_spec: Option<FilterSpec>,
    pub filter_layer_ids: Option<Vec<String>>,
    pub layers: &'a StyleLayerMap,
}

/// v3.8: the layer filter list became mandatory
#[derive(Debug, Clone, PartialEq)]
pub struct MandatoryFilterLookup<'a> {
    pub batch: SymbolFeatureBatch,
    pub filter_spec: Option<FilterSpec>,
    pub filter_layer_ids: Vec<String>,
    pub layers: &'a StyleLayerMap,
}

/// Filter target of one query layer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QrfTarget {
    pub filter: Option<FilterSpec>,
}

/// Layer entry of a query object
#[derive(Debug, Clone, PartialEq)]
pub struct QrfLayer {
    pub style_layer: StyleLayer,
    /// Must not be empty, or the lookup yields nothing
    pub targets: Vec<QrfTarget>,
}

/// Query object consumed by the v3.9 lookup
#[derive(Clone)]
pub struct QrfQuery<'a> {
    /// Keyed by fully-qualified layer id
    pub layers: BTreeMap<String, QrfLayer>,
    pub source_cache: &'a dyn SourceCache,
    pub has_3d_layers: bool,
}

/// v3.9 and later: layer scoping moved into a query object
#[derive(Clone)]
pub struct QueryObjectLookup<'a> {
    pub batch: SymbolFeatureBatch,
    pub query: QrfQuery<'a>,
}

/// Feature lookup call, one variant per host call signature
#[derive(Clone)]
pub enum FeatureLookupRequest<'a> {
    SerializedLayers(SerializedLayersLookup<'a>),
    MandatoryFilter(MandatoryFilterLookup<'a>),
    QueryObject(QueryObjectLookup<'a>),
}

impl FeatureLookupRequest<'_> {
    pub fn batch(&self) -> &SymbolFeatureBatch {
        match self {
            Self::SerializedLayers(lookup) => &lookup.batch,
            Self::MandatoryFilter(lookup) => &lookup.batch,
            Self::QueryObject(lookup) => &lookup.batch,
        }
    }
}

/// Feature index of a tile
pub trait FeatureIndex {
    fn lookup_symbol_features(&self, request: FeatureLookupRequest<'_>) -> QueryResult;
}

/// Query data the placement retains for one bucket
#[derive(Clone, Copy)]
pub struct RetainedQueryData<'a> {
    pub feature_index: &'a dyn FeatureIndex,
    pub bucket_index: u32,
    pub source_layer_index: u32,
}

/// Result of the last placement pass
pub trait Placement {
    /// Whether a new placement pass is pending
    fn is_stale(&self) -> bool;
    fn transform(&self) -> &dyn Transform;
    /// Name of the projection active at runtime
    fn projection_name(&self) -> &str;
    fn collision_index(&self) -> &dyn CollisionIndex;
    fn retained_query_data(&self, bucket_instance_id: u32) -> Option<RetainedQueryData<'_>>;
}

/// A running renderer instance (the host's `Map` with its `Style`)
pub trait HostRenderer {
    /// Whether the instance exposes `member`; used only for generation probing
    fn exposes(&self, member: HostMember) -> bool;
    fn style_layers(&self) -> &StyleLayerMap;
    /// `None` from v3.8 on
    fn serialized_layers(&self) -> Option<&SerializedLayerMap>;
    fn layer(&self, layer_id: &str) -> Option<&StyleLayer> {
        self.style_layers().get(layer_id)
    }
    fn placement(&self) -> &dyn Placement;
    fn render_cache(
        &self,
        layer: &StyleLayer,
        accessor: RenderCacheAccessor,
    ) -> Option<&dyn SourceCache>;
    fn available_images(&self) -> Vec<String>;
    fn terrain_enabled(&self) -> bool;
}
