//! Host API generation probing
//!
//! The host does not report a reliable version string, so the generation is inferred from
//! which internal members the instance exposes. The raw flags ([`CapabilitySet`]) are then
//! resolved once into a [`HostApi`]: one tag per behavioral axis that differs between
//! generations. Downstream code only matches on those tags.

use crate::host::{
    FeatureLookupRequest, HostMember, HostRenderer, MandatoryFilterLookup, OverscaledTileId,
    PackedProjectionRequest, Projection, ProjectionRequest, QrfLayer, QrfQuery, QrfTarget,
    QueryObjectLookup, SerializedLayersLookup, SourceCache, SplitProjectionRequest, StyleLayer,
    StyleLayerTables, SymbolFeatureBatch,
};
use crate::{CollisionBoxError, Result};
use glam::{DMat4, DVec3};
use std::collections::BTreeMap;

/// Capability flags probed from a live host instance
///
/// Probing is cheap and side-effect free, so the set is recomputed on every collection
/// instead of being cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    /// v2.11.1 or earlier: anchors are passed to the projection call as a packed `vec3`
    pub is_legacy_api: bool,
    /// v3.0 or later: the style exposes `getOwnLayerSourceCache`
    pub has_v3_style: bool,
    /// v3.8 or later: serialized layers are gone and the filter layer list is mandatory
    pub has_v3_8_query: bool,
    /// v3.9 or later: feature lookups take a query object
    pub has_v3_9_query: bool,
}

impl CapabilitySet {
    /// Probe the members of a host instance
    pub fn probe<R: HostRenderer + ?Sized>(renderer: &R) -> Self {
        Self {
            is_legacy_api: !renderer.exposes(HostMember::MapIsDragging),
            has_v3_style: renderer.exposes(HostMember::StyleOwnLayerSourceCache),
            has_v3_8_query: !renderer.exposes(HostMember::StyleSerializedLayers),
            has_v3_9_query: renderer.exposes(HostMember::FeatureIndexQueryObject),
        }
    }
}

/// Signature of `CollisionIndex#projectAndGetPerspectiveRatio`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionCallArity {
    /// `(posMatrix, [x, y, z], tileID, checkOcclusion, projection)`
    Packed,
    /// `(posMatrix, x, y, z, tileID, checkOcclusion, projection)`
    Split,
}

impl ProjectionCallArity {
    /// Build the projection request for an anchor
    pub fn request<'a>(
        self,
        pos_matrix: &'a DMat4,
        anchor: DVec3,
        tile_id: Option<&'a OverscaledTileId>,
        check_occlusion: bool,
        bucket_projection: &'a dyn Projection,
    ) -> ProjectionRequest<'a> {
        match self {
            Self::Packed => ProjectionRequest::Packed(PackedProjectionRequest {
                pos_matrix,
                point: anchor.to_array(),
                tile_id,
                check_occlusion,
                bucket_projection,
            }),
            Self::Split => ProjectionRequest::Split(SplitProjectionRequest {
                pos_matrix,
                x: anchor.x,
                y: anchor.y,
                z: anchor.z,
                tile_id,
                check_occlusion,
                bucket_projection,
            }),
        }
    }
}

/// Accessor for the per-layer render cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCacheAccessor {
    /// `style._getLayerSourceCache(layer)` (v2)
    LayerSourceCache,
    /// `style.getOwnLayerSourceCache(layer)` (v3)
    OwnLayerSourceCache,
}

/// Signature of `FeatureIndex#lookupSymbolFeatures`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLookupSignature {
    /// 8 arguments, serialized layers second; the layer filter list may be absent
    SerializedLayers,
    /// 7 arguments; the layer filter list is mandatory
    MandatoryFilter,
    /// Query object scoping the lookup to the style layer
    QueryObject,
}

impl FeatureLookupSignature {
    /// Build the lookup request for a batch of feature indexes of `layer`
    ///
    /// # Errors
    /// [`CollisionBoxError::MissingSerializedLayers`] if the serialized-layers signature is
    /// selected but the style carries no serialized layers.
    pub fn request<'a>(
        self,
        batch: SymbolFeatureBatch,
        layer: &StyleLayer,
        style: StyleLayerTables<'a>,
        source_cache: &'a dyn SourceCache,
        terrain_enabled: bool,
    ) -> Result<FeatureLookupRequest<'a>> {
        let request = match self {
            Self::SerializedLayers => {
                let serialized_layers = style
                    .serialized_layers
                    .ok_or(CollisionBoxError::MissingSerializedLayers)?;
                FeatureLookupRequest::SerializedLayers(SerializedLayersLookup {
                    batch,
                    serialized_layers,
                    filter_spec: None,
                    filter_layer_ids: None,
                    layers: style.layers,
                })
            }
            Self::MandatoryFilter => FeatureLookupRequest::MandatoryFilter(MandatoryFilterLookup {
                batch,
                filter_spec: None,
                filter_layer_ids: Vec::new(),
                layers: style.layers,
            }),
            Self::QueryObject => FeatureLookupRequest::QueryObject(QueryObjectLookup {
                batch,
                query: query_for_style_layer(layer, source_cache, terrain_enabled),
            }),
        };
        Ok(request)
    }
}

/// Query object covering a single style layer with an unfiltered target
fn query_for_style_layer<'a>(
    layer: &StyleLayer,
    source_cache: &'a dyn SourceCache,
    terrain_enabled: bool,
) -> QrfQuery<'a> {
    let mut layers = BTreeMap::new();
    layers.insert(
        layer.fqid.clone(),
        QrfLayer {
            style_layer: layer.clone(),
            targets: vec![QrfTarget::default()],
        },
    );
    QrfQuery {
        layers,
        source_cache,
        has_3d_layers: layer.is_3d(terrain_enabled),
    }
}

/// Resolved API of one host generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostApi {
    pub projection_call: ProjectionCallArity,
    pub render_cache: RenderCacheAccessor,
    pub feature_lookup: FeatureLookupSignature,
}

impl HostApi {
    /// Probe a host instance and resolve its API
    pub fn probe<R: HostRenderer + ?Sized>(renderer: &R) -> Result<Self> {
        let api = Self::try_from(CapabilitySet::probe(renderer))?;
        tracing::debug!("Resolved host API: {:?}", api);
        Ok(api)
    }
}

impl TryFrom<CapabilitySet> for HostApi {
    type Error = CollisionBoxError;

    /// Fails closed on flag combinations no known generation produces
    fn try_from(capabilities: CapabilitySet) -> Result<Self> {
        let CapabilitySet {
            is_legacy_api,
            has_v3_style,
            has_v3_8_query,
            has_v3_9_query,
        } = capabilities;

        let consistent = !(has_v3_9_query && !has_v3_8_query)
            && !(has_v3_8_query && !has_v3_style)
            && !(is_legacy_api && has_v3_style);
        if !consistent {
            return Err(CollisionBoxError::UnsupportedHostVersion(capabilities));
        }

        Ok(Self {
            projection_call: if is_legacy_api {
                ProjectionCallArity::Packed
            } else {
                ProjectionCallArity::Split
            },
            render_cache: if has_v3_style {
                RenderCacheAccessor::OwnLayerSourceCache
            } else {
                RenderCacheAccessor::LayerSourceCache
            },
            feature_lookup: if has_v3_9_query {
                FeatureLookupSignature::QueryObject
            } else if has_v3_8_query {
                FeatureLookupSignature::MandatoryFilter
            } else {
                FeatureLookupSignature::SerializedLayers
            },
        })
    }
}
