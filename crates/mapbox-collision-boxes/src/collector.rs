//! CollisionBoxCollector - Collects the icon boxes of a symbol layer with their features
//!
//! Sequences the rest of the crate: probe the host API, wait for placement, then for every
//! renderable tile of the layer resolve the tile matrix, evaluate the icon size, project each
//! icon box, and join the boxes to the features returned by the tile's query index.

use crate::capability::HostApi;
use crate::collision::{CollisionBoxInput, project_collision_box};
use crate::config::CollectorConfig;
use crate::host::{
    HostRenderer, Placement, SourceCache, StyleLayer, StyleLayerTables, SymbolFeatureBatch, Tile,
};
use crate::placement::wait_for_placement;
use crate::projection::TileProjectionContext;
use crate::symbol_size::evaluate_size_for_zoom;
use crate::types::{FeatureBox, ScreenBox};
use crate::{CollisionBoxError, Result};
use std::collections::HashMap;

/// Collects collision boxes of symbol layers
#[derive(Debug, Clone, Default)]
pub struct CollisionBoxCollector {
    config: CollectorConfig,
}

/// Everything shared by the tiles of one collection pass
struct LayerPass<'a> {
    api: HostApi,
    layer: &'a StyleLayer,
    placement: &'a dyn Placement,
    source_cache: &'a dyn SourceCache,
    style: StyleLayerTables<'a>,
    available_images: Vec<String>,
    terrain_enabled: bool,
    zoom: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CollisionBoxCollector {
    /// Create a collector with the given configuration
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collect the icon boxes of `layer_id` and the features they belong to
    ///
    /// Waits for the pending placement pass first. Tiles without a bucket for the layer are
    /// skipped, and boxes whose feature is not returned by the query index are dropped.
    ///
    /// # Errors
    /// - [`CollisionBoxError::UnsupportedHostVersion`] if the host generation is not recognized
    /// - [`CollisionBoxError::NoSuchLayer`] / [`CollisionBoxError::NotASymbolLayer`]
    /// - [`CollisionBoxError::PlacementTimeout`] if the placement does not settle in time
    /// - [`CollisionBoxError::MissingRenderCache`] if the layer has no render cache
    /// - [`CollisionBoxError::MissingSerializedLayers`] if a pre-v3.8 style lacks its
    ///   serialized layers
    pub async fn collect<R: HostRenderer + ?Sized>(
        &self,
        renderer: &R,
        layer_id: &str,
    ) -> Result<Vec<FeatureBox>> {
        let api = HostApi::probe(renderer)?;
        let layer = renderer
            .layer(layer_id)
            .ok_or_else(|| CollisionBoxError::NoSuchLayer(layer_id.to_string()))?;
        if !layer.is_symbol_layer() {
            return Err(CollisionBoxError::NotASymbolLayer(layer_id.to_string()));
        }

        let placement = renderer.placement();
        wait_for_placement(
            placement,
            self.config.placement_timeout,
            self.config.poll_interval,
        )
        .await?;

        let source_cache = renderer
            .render_cache(layer, api.render_cache)
            .ok_or_else(|| CollisionBoxError::MissingRenderCache(layer_id.to_string()))?;

        let pass = LayerPass {
            api,
            layer,
            placement,
            source_cache,
            style: StyleLayerTables {
                layers: renderer.style_layers(),
                serialized_layers: renderer.serialized_layers(),
            },
            available_images: renderer.available_images(),
            terrain_enabled: renderer.terrain_enabled(),
            zoom: placement.transform().zoom(),
        };

        let mut feature_boxes = Vec::new();
        for id in source_cache.renderable_ids(true) {
            match source_cache.tile_by_id(id) {
                Some(tile) => self.collect_tile(&pass, tile, &mut feature_boxes)?,
                None => tracing::debug!("Renderable tile {} is not loaded", id),
            }
        }
        Ok(feature_boxes)
    }

    fn collect_tile(
        &self,
        pass: &LayerPass<'_>,
        tile: &dyn Tile,
        out: &mut Vec<FeatureBox>,
    ) -> Result<()> {
        let layer_id = &pass.layer.id;
        let Some(bucket) = tile.bucket(pass.layer) else {
            // tile may not contain any symbols
            tracing::debug!("Tile {:?} has no bucket for layer \"{}\"", tile.tile_id(), layer_id);
            return Ok(());
        };
        let Some(bucket) = bucket.as_symbol_bucket() else {
            tracing::warn!("layer \"{}\" must be associated with a SymbolBucket", layer_id);
            return Ok(());
        };

        let transform = pass.placement.transform();
        let context = TileProjectionContext {
            tile_id: tile.tile_id(),
            tile_size: tile.tile_size(),
            bucket_projection: bucket.projection(),
            transform,
            runtime_projection: pass.placement.projection_name(),
        };
        let pos_matrix = context.projection_matrix();
        let pixel_ratio = context.pixel_ratio();
        let icon_size = evaluate_size_for_zoom(bucket.icon_size_data(), pass.zoom);
        let bucket_projection_name = bucket.projection_name();
        let collision_index = pass.placement.collision_index();

        let instance_count = bucket.symbol_instance_count();
        let mut feature_indexes = Vec::with_capacity(instance_count);
        let mut boxes: HashMap<usize, ScreenBox> = HashMap::new();
        for instance in 0..instance_count {
            let feature_index = bucket.feature_index(instance);
            feature_indexes.push(feature_index);

            let Some(icon_box) = bucket.icon_box(instance) else {
                continue;
            };
            let input = CollisionBoxInput {
                collision_box: icon_box,
                pos_matrix: &pos_matrix,
                pixel_ratio,
                scale: bucket.symbol_instance_icon_size(&icon_size, pass.zoom, instance),
                bucket_projection: bucket.projection(),
                bucket_projection_name,
            };
            boxes.insert(
                feature_index,
                project_collision_box(
                    &input,
                    collision_index,
                    pass.api.projection_call,
                    self.config.bottom_padding,
                ),
            );
        }

        let Some(query_data) = pass.placement.retained_query_data(bucket.bucket_instance_id())
        else {
            tracing::warn!(
                "No query data retained for bucket {} of layer \"{}\"",
                bucket.bucket_instance_id(),
                layer_id
            );
            return Ok(());
        };

        let batch = SymbolFeatureBatch {
            symbol_feature_indexes: feature_indexes,
            bucket_index: query_data.bucket_index,
            source_layer_index: query_data.source_layer_index,
            available_images: pass.available_images.clone(),
        };
        let request = pass.api.feature_lookup.request(
            batch,
            pass.layer,
            pass.style,
            pass.source_cache,
            pass.terrain_enabled,
        )?;
        let results = query_data.feature_index.lookup_symbol_features(request);

        for entry in results.into_values().flatten() {
            match boxes.get(&entry.feature_index) {
                Some(screen_box) => out.push(FeatureBox {
                    screen_box: *screen_box,
                    feature: entry.feature,
                }),
                None => tracing::debug!(
                    "Dropping feature {} without an icon box",
                    entry.feature_index
                ),
            }
        }
        Ok(())
    }
}

/// Collect the icon boxes of `layer_id` with the default configuration
///
/// Waits at most five seconds for the pending placement pass.
///
/// # Errors
/// See [`CollisionBoxCollector::collect`].
pub async fn collect_collision_boxes_and_features<R: HostRenderer + ?Sized>(
    renderer: &R,
    layer_id: &str,
) -> Result<Vec<FeatureBox>> {
    CollisionBoxCollector::default()
        .collect(renderer, layer_id)
        .await
}
