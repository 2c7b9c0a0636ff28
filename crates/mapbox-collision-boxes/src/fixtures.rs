//! Synthetic host renderer for tests
//!
//! Matrices are picked so that every value involved is exact in binary floating point:
//! tile `(x, y)` maps to screen `(x / 4096 * 400, y / 4096 * 300)` on an 800x600 viewport,
//! with `w == 1` and therefore a perspective ratio of 1.

use crate::capability::RenderCacheAccessor;
use crate::host::{
    Bucket, CanonicalTileId, CollisionIndex, EvaluationScale, FeatureIndex, FeatureLookupRequest,
    HostMember, HostRenderer, OverscaledTileId, Placement, Projection, ProjectionRequest,
    QueryFeature, QueryResult, QueryResultEntry, RetainedQueryData, SYMBOL_LAYER_KIND,
    ScreenAnchorPoint, SerializedLayerMap, SingleCollisionBox, SourceCache, StyleLayer,
    StyleLayerMap, StyleLayerTables, SymbolBucket, Tile, Transform, UnwrappedTileId,
};
use crate::symbol_size::{InterpolatedSize, SizeDescriptor};
use glam::{DMat4, DVec2, DVec3, DVec4};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

pub(crate) const SYMBOL_LAYER: &str = "pois";
pub(crate) const LINE_LAYER: &str = "roads";
pub(crate) const SYMBOL_BUCKET_ID: u32 = 7;

/// Tile units to clip space: `clip = (x / 4096 - 1, 1 - y / 4096, z, 1)`
pub(crate) fn flat_tile_matrix() -> DMat4 {
    DMat4::from_cols(
        DVec4::new(1.0 / 4096.0, 0.0, 0.0, 0.0),
        DVec4::new(0.0, -1.0 / 4096.0, 0.0, 0.0),
        DVec4::new(0.0, 0.0, 1.0, 0.0),
        DVec4::new(-1.0, 1.0, 0.0, 1.0),
    )
}

/// Host API generations the fixture can impersonate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostGeneration {
    V2Legacy,
    V2,
    V3,
    V3_8,
    V3_9,
}

impl HostGeneration {
    fn exposes(self, member: HostMember) -> bool {
        match member {
            HostMember::MapIsDragging => self != Self::V2Legacy,
            HostMember::StyleOwnLayerSourceCache => {
                matches!(self, Self::V3 | Self::V3_8 | Self::V3_9)
            }
            HostMember::StyleSerializedLayers => matches!(self, Self::V2Legacy | Self::V2 | Self::V3),
            HostMember::FeatureIndexQueryObject => self == Self::V3_9,
        }
    }

    fn render_cache_accessor(self) -> RenderCacheAccessor {
        match self {
            Self::V2Legacy | Self::V2 => RenderCacheAccessor::LayerSourceCache,
            Self::V3 | Self::V3_8 | Self::V3_9 => RenderCacheAccessor::OwnLayerSourceCache,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FixtureTransform {
    pub world_size: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub center_lat: f64,
    pub proj_matrix: DMat4,
    pub tile_matrix: DMat4,
}

impl Default for FixtureTransform {
    fn default() -> Self {
        Self {
            world_size: 4096.0,
            zoom: 3.0,
            pitch: 0.0,
            center_lat: 0.0,
            proj_matrix: DMat4::IDENTITY,
            tile_matrix: flat_tile_matrix(),
        }
    }
}

impl Transform for FixtureTransform {
    fn world_size(&self) -> f64 {
        self.world_size
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn pitch(&self) -> f64 {
        self.pitch
    }

    fn center_lat(&self) -> f64 {
        self.center_lat
    }

    fn proj_matrix(&self) -> DMat4 {
        self.proj_matrix
    }

    fn calculate_proj_matrix(&self, _unwrapped_tile_id: &UnwrappedTileId) -> DMat4 {
        self.tile_matrix
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FixtureProjection {
    pub name: &'static str,
    pub meters_to_tile: f64,
    pub up: DVec3,
    pub tile_matrix: DMat4,
}

impl FixtureProjection {
    pub fn mercator() -> Self {
        Self {
            name: "mercator",
            meters_to_tile: 0.5,
            up: DVec3::Z,
            tile_matrix: flat_tile_matrix(),
        }
    }

    pub fn globe() -> Self {
        Self {
            name: "globe",
            meters_to_tile: 0.25,
            up: DVec3::new(0.0, 0.6, 0.8),
            tile_matrix: DMat4::from_cols(
                DVec4::new(1.0 / 8192.0, 0.0, 0.0, 0.0),
                DVec4::new(0.0, -1.0 / 8192.0, 0.0, 0.0),
                DVec4::new(0.0, 0.0, 1.0, 0.0),
                DVec4::new(-0.5, 0.5, 0.0, 1.0),
            ),
        }
    }
}

impl Projection for FixtureProjection {
    fn name(&self) -> &str {
        self.name
    }

    fn create_tile_matrix(
        &self,
        _transform: &dyn Transform,
        _world_size: f64,
        _id: &UnwrappedTileId,
    ) -> DMat4 {
        self.tile_matrix
    }

    fn up_vector(&self, _id: &CanonicalTileId, _x: f64, _y: f64) -> DVec3 {
        self.up
    }

    fn up_vector_scale(
        &self,
        _id: &CanonicalTileId,
        _latitude: f64,
        _world_size: f64,
    ) -> EvaluationScale {
        EvaluationScale {
            meters_to_tile: self.meters_to_tile,
        }
    }
}

/// What the collision index was last asked to project
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RecordedProjection {
    pub packed: bool,
    pub anchor: DVec3,
    pub check_occlusion: bool,
    pub tile_id: Option<OverscaledTileId>,
    pub perspective_ratio: f64,
}

#[derive(Debug)]
pub(crate) struct FixtureCollisionIndex {
    pub transform: FixtureTransform,
    pub width: f64,
    pub height: f64,
    pub camera_to_center_distance: f64,
    pub(crate) recorded: RefCell<Option<RecordedProjection>>,
}

impl Default for FixtureCollisionIndex {
    fn default() -> Self {
        Self {
            transform: FixtureTransform::default(),
            width: 800.0,
            height: 600.0,
            camera_to_center_distance: 1.0,
            recorded: RefCell::new(None),
        }
    }
}

impl FixtureCollisionIndex {
    /// Same projection as the renderer's collision index, without occlusion
    pub fn project_anchor(&self, pos_matrix: &DMat4, anchor: DVec3) -> ScreenAnchorPoint {
        let p = *pos_matrix * anchor.extend(1.0);
        ScreenAnchorPoint {
            perspective_ratio: (0.5 + 0.5 * (self.camera_to_center_distance / p.w)).min(1.5),
            point: DVec2::new(
                ((p.x / p.w + 1.0) / 2.0) * self.width,
                ((-p.y / p.w + 1.0) / 2.0) * self.height,
            ),
        }
    }

    pub fn last_request(&self) -> Option<RecordedProjection> {
        *self.recorded.borrow()
    }

    pub fn last_perspective_ratio(&self) -> f64 {
        self.last_request()
            .map(|recorded| recorded.perspective_ratio)
            .unwrap_or(f64::NAN)
    }
}

impl CollisionIndex for FixtureCollisionIndex {
    fn transform(&self) -> &dyn Transform {
        &self.transform
    }

    fn project_and_get_perspective_ratio(
        &self,
        request: ProjectionRequest<'_>,
    ) -> ScreenAnchorPoint {
        let projected = self.project_anchor(request.pos_matrix(), request.anchor());
        *self.recorded.borrow_mut() = Some(RecordedProjection {
            packed: matches!(request, ProjectionRequest::Packed(_)),
            anchor: request.anchor(),
            check_occlusion: request.check_occlusion(),
            tile_id: request.tile_id().copied(),
            perspective_ratio: projected.perspective_ratio,
        });
        projected
    }
}

/// Shape of a lookup the feature index received
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordedLookup {
    SerializedLayers {
        serialized_layers: Vec<String>,
        filter_layer_ids: Option<Vec<String>>,
        style_layers: Vec<String>,
    },
    MandatoryFilter {
        filter_layer_ids: Vec<String>,
        style_layers: Vec<String>,
    },
    QueryObject {
        layers: Vec<String>,
        has_3d_layers: bool,
    },
}

#[derive(Debug, Default)]
pub(crate) struct FixtureFeatureIndex {
    pub features: BTreeMap<usize, QueryFeature>,
    pub lookups: RefCell<Vec<(RecordedLookup, Vec<usize>)>>,
}

impl FixtureFeatureIndex {
    pub fn recorded(&self) -> Vec<(RecordedLookup, Vec<usize>)> {
        self.lookups.borrow().clone()
    }
}

impl FeatureIndex for FixtureFeatureIndex {
    fn lookup_symbol_features(&self, request: FeatureLookupRequest<'_>) -> QueryResult {
        let indexes = request.batch().symbol_feature_indexes.clone();
        let (recorded, has_targets) = match &request {
            FeatureLookupRequest::SerializedLayers(lookup) => (
                RecordedLookup::SerializedLayers {
                    serialized_layers: lookup.serialized_layers.keys().cloned().collect(),
                    filter_layer_ids: lookup.filter_layer_ids.clone(),
                    style_layers: lookup.layers.keys().cloned().collect(),
                },
                true,
            ),
            FeatureLookupRequest::MandatoryFilter(lookup) => (
                RecordedLookup::MandatoryFilter {
                    filter_layer_ids: lookup.filter_layer_ids.clone(),
                    style_layers: lookup.layers.keys().cloned().collect(),
                },
                true,
            ),
            FeatureLookupRequest::QueryObject(lookup) => (
                RecordedLookup::QueryObject {
                    layers: lookup.query.layers.keys().cloned().collect(),
                    has_3d_layers: lookup.query.has_3d_layers,
                },
                lookup
                    .query
                    .layers
                    .values()
                    .all(|layer| !layer.targets.is_empty()),
            ),
        };
        self.lookups.borrow_mut().push((recorded, indexes.clone()));

        let mut result = QueryResult::new();
        if !has_targets {
            return result;
        }
        for index in indexes {
            if let Some(feature) = self.features.get(&index) {
                result
                    .entry(feature.layer_id.clone())
                    .or_default()
                    .push(QueryResultEntry {
                        feature_index: index,
                        feature: feature.clone(),
                    });
            }
        }
        result
    }
}

pub(crate) struct FixtureRetainedQueryData {
    pub feature_index: FixtureFeatureIndex,
    pub bucket_index: u32,
    pub source_layer_index: u32,
}

pub(crate) struct FixturePlacement {
    stale_remaining: Cell<u32>,
    always_stale: bool,
    reads: Cell<u32>,
    pub transform: FixtureTransform,
    pub projection_name: &'static str,
    pub collision_index: FixtureCollisionIndex,
    pub query_data: BTreeMap<u32, FixtureRetainedQueryData>,
}

impl FixturePlacement {
    /// Stale for the first `reads` checks, stable afterwards
    pub fn stale_for(reads: u32) -> Self {
        Self {
            stale_remaining: Cell::new(reads),
            always_stale: false,
            reads: Cell::new(0),
            transform: FixtureTransform::default(),
            projection_name: "mercator",
            collision_index: FixtureCollisionIndex::default(),
            query_data: BTreeMap::new(),
        }
    }

    pub fn always_stale() -> Self {
        Self {
            always_stale: true,
            ..Self::stale_for(0)
        }
    }

    /// Number of times the stale flag was read
    pub fn stale_reads(&self) -> u32 {
        self.reads.get()
    }
}

impl Placement for FixturePlacement {
    fn is_stale(&self) -> bool {
        self.reads.set(self.reads.get() + 1);
        if self.always_stale {
            return true;
        }
        let remaining = self.stale_remaining.get();
        if remaining > 0 {
            self.stale_remaining.set(remaining - 1);
            true
        } else {
            false
        }
    }

    fn transform(&self) -> &dyn Transform {
        &self.transform
    }

    fn projection_name(&self) -> &str {
        self.projection_name
    }

    fn collision_index(&self) -> &dyn CollisionIndex {
        &self.collision_index
    }

    fn retained_query_data(&self, bucket_instance_id: u32) -> Option<RetainedQueryData<'_>> {
        self.query_data
            .get(&bucket_instance_id)
            .map(|data| RetainedQueryData {
                feature_index: &data.feature_index,
                bucket_index: data.bucket_index,
                source_layer_index: data.source_layer_index,
            })
    }
}

pub(crate) struct FixtureSymbolBucket {
    pub id: u32,
    pub icon_size: SizeDescriptor,
    /// `(feature index, icon box)` per symbol instance
    pub instances: Vec<(usize, Option<SingleCollisionBox>)>,
    pub projection: FixtureProjection,
}

impl Bucket for FixtureSymbolBucket {
    fn as_symbol_bucket(&self) -> Option<&dyn SymbolBucket> {
        Some(self)
    }
}

impl SymbolBucket for FixtureSymbolBucket {
    fn bucket_instance_id(&self) -> u32 {
        self.id
    }

    fn icon_size_data(&self) -> &SizeDescriptor {
        &self.icon_size
    }

    fn symbol_instance_count(&self) -> usize {
        self.instances.len()
    }

    fn feature_index(&self, instance: usize) -> usize {
        self.instances[instance].0
    }

    fn icon_box(&self, instance: usize) -> Option<&SingleCollisionBox> {
        self.instances[instance].1.as_ref()
    }

    fn projection(&self) -> &dyn Projection {
        &self.projection
    }

    fn symbol_instance_icon_size(
        &self,
        icon_size: &InterpolatedSize,
        _zoom: f64,
        _instance: usize,
    ) -> f64 {
        icon_size.size
    }
}

/// Bucket of a non-symbol layer
pub(crate) struct FixtureLineBucket;

impl Bucket for FixtureLineBucket {}

pub(crate) struct FixtureTile {
    pub id: OverscaledTileId,
    pub size: f64,
    pub buckets: BTreeMap<String, Box<dyn Bucket>>,
}

impl Tile for FixtureTile {
    fn tile_id(&self) -> &OverscaledTileId {
        &self.id
    }

    fn tile_size(&self) -> f64 {
        self.size
    }

    fn bucket(&self, layer: &StyleLayer) -> Option<&dyn Bucket> {
        self.buckets.get(&layer.id).map(|bucket| bucket.as_ref())
    }
}

#[derive(Default)]
pub(crate) struct FixtureSourceCache {
    pub tiles: BTreeMap<u64, FixtureTile>,
    /// Extra ids reported as renderable without a loaded tile
    pub missing_ids: Vec<u64>,
    pub symbol_layer_flags: RefCell<Vec<bool>>,
}

impl SourceCache for FixtureSourceCache {
    fn renderable_ids(&self, symbol_layer: bool) -> Vec<u64> {
        self.symbol_layer_flags.borrow_mut().push(symbol_layer);
        self.tiles
            .keys()
            .copied()
            .chain(self.missing_ids.iter().copied())
            .collect()
    }

    fn tile_by_id(&self, id: u64) -> Option<&dyn Tile> {
        self.tiles.get(&id).map(|tile| tile as &dyn Tile)
    }
}

pub(crate) struct FixtureRenderer {
    pub generation: HostGeneration,
    pub layers: StyleLayerMap,
    /// Only for generations that still serialize their layers
    pub serialized_layers: Option<SerializedLayerMap>,
    pub placement: FixturePlacement,
    pub source_cache: Option<FixtureSourceCache>,
    pub available_images: Vec<String>,
    pub terrain_enabled: bool,
    mercator: FixtureProjection,
}

fn layer(id: &str, kind: &str) -> StyleLayer {
    StyleLayer {
        id: id.to_string(),
        fqid: id.to_string(),
        kind: kind.to_string(),
        is_3d: false,
        is_3d_on_terrain: false,
    }
}

pub(crate) fn feature(id: u64, name: &str) -> QueryFeature {
    let mut properties = serde_json::Map::new();
    properties.insert("name".to_string(), serde_json::Value::from(name));
    QueryFeature {
        id: Some(serde_json::Value::from(id)),
        layer_id: SYMBOL_LAYER.to_string(),
        source: "animals".to_string(),
        source_layer: None,
        properties,
    }
}

/// Icon box anchored at tile `(2048, 1024)`, i.e. screen `(200, 75)`
pub(crate) fn icon_box() -> SingleCollisionBox {
    SingleCollisionBox {
        x1: -10.0,
        y1: -8.0,
        x2: 10.0,
        y2: 8.0,
        padding: 2.0,
        projected_anchor: [2048.0, 1024.0, 0.0],
        tile_anchor: [2048.0, 1024.0],
        elevation: None,
        tile_id: Some(OverscaledTileId::new(1, 0, 1, 0, 0)),
    }
}

impl FixtureRenderer {
    /// Renderer with a symbol layer and a line layer but no tiles
    pub fn empty(generation: HostGeneration) -> Self {
        let layers: StyleLayerMap = [
            layer(SYMBOL_LAYER, SYMBOL_LAYER_KIND),
            layer(LINE_LAYER, "line"),
        ]
        .into_iter()
        .map(|layer| (layer.id.clone(), layer))
        .collect();
        let serialized_layers = generation
            .exposes(HostMember::StyleSerializedLayers)
            .then(|| {
                layers
                    .values()
                    .map(|layer| {
                        let json = serde_json::json!({ "id": layer.id, "type": layer.kind });
                        (layer.id.clone(), json)
                    })
                    .collect()
            });
        Self {
            generation,
            layers,
            serialized_layers,
            placement: FixturePlacement::stale_for(0),
            source_cache: Some(FixtureSourceCache::default()),
            available_images: vec!["cat".to_string(), "dog".to_string()],
            terrain_enabled: false,
            mercator: FixtureProjection::mercator(),
        }
    }

    /// One symbol layer over two tiles
    ///
    /// Tile 1 holds the symbol bucket: instance 0 (feature 0, "cat") has an icon box,
    /// instance 1 (feature 1, "dog") has none. Tile 2 has no bucket for the layer.
    pub fn two_tile_scene(generation: HostGeneration) -> Self {
        let mut renderer = Self::empty(generation);

        let bucket = FixtureSymbolBucket {
            id: SYMBOL_BUCKET_ID,
            icon_size: SizeDescriptor::Constant { layout_size: 1.5 },
            instances: vec![(0, Some(icon_box())), (1, None)],
            projection: FixtureProjection::mercator(),
        };
        let mut buckets: BTreeMap<String, Box<dyn Bucket>> = BTreeMap::new();
        buckets.insert(SYMBOL_LAYER.to_string(), Box::new(bucket));

        let mut cache = FixtureSourceCache::default();
        cache.tiles.insert(
            1,
            FixtureTile {
                id: OverscaledTileId::new(1, 0, 1, 0, 0),
                size: 512.0,
                buckets,
            },
        );
        cache.tiles.insert(
            2,
            FixtureTile {
                id: OverscaledTileId::new(1, 0, 1, 1, 0),
                size: 512.0,
                buckets: BTreeMap::new(),
            },
        );
        renderer.source_cache = Some(cache);

        let feature_index = FixtureFeatureIndex {
            features: [(0, feature(0, "cat")), (1, feature(1, "dog"))]
                .into_iter()
                .collect(),
            ..FixtureFeatureIndex::default()
        };
        renderer.placement.query_data.insert(
            SYMBOL_BUCKET_ID,
            FixtureRetainedQueryData {
                feature_index,
                bucket_index: 0,
                source_layer_index: 0,
            },
        );
        renderer
    }

    pub fn mercator(&self) -> &FixtureProjection {
        &self.mercator
    }

    pub fn symbol_layer(&self) -> &StyleLayer {
        &self.layers[SYMBOL_LAYER]
    }

    pub fn style_tables(&self) -> StyleLayerTables<'_> {
        StyleLayerTables {
            layers: &self.layers,
            serialized_layers: self.serialized_layers.as_ref(),
        }
    }

    pub fn source_cache(&self) -> &dyn SourceCache {
        self.source_cache
            .as_ref()
            .expect("fixture renderer has a source cache")
    }

    pub fn fixture_cache(&self) -> &FixtureSourceCache {
        self.source_cache
            .as_ref()
            .expect("fixture renderer has a source cache")
    }

    pub fn tile_mut(&mut self, id: u64) -> &mut FixtureTile {
        self.source_cache
            .as_mut()
            .and_then(|cache| cache.tiles.get_mut(&id))
            .expect("fixture tile exists")
    }

    pub fn feature_index(&self) -> &FixtureFeatureIndex {
        &self.placement.query_data[&SYMBOL_BUCKET_ID].feature_index
    }
}

impl HostRenderer for FixtureRenderer {
    fn exposes(&self, member: HostMember) -> bool {
        self.generation.exposes(member)
    }

    fn style_layers(&self) -> &StyleLayerMap {
        &self.layers
    }

    fn serialized_layers(&self) -> Option<&SerializedLayerMap> {
        self.serialized_layers.as_ref()
    }

    fn placement(&self) -> &dyn Placement {
        &self.placement
    }

    fn render_cache(
        &self,
        _layer: &StyleLayer,
        accessor: RenderCacheAccessor,
    ) -> Option<&dyn SourceCache> {
        if accessor != self.generation.render_cache_accessor() {
            return None;
        }
        self.source_cache
            .as_ref()
            .map(|cache| cache as &dyn SourceCache)
    }

    fn available_images(&self) -> Vec<String> {
        self.available_images.clone()
    }

    fn terrain_enabled(&self) -> bool {
        self.terrain_enabled
    }
}
