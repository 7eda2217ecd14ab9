//! In-memory map surface that keeps layers as styled GeoJSON.
//!
//! Used by the batch exporter and the HTTP host. Each layer keeps an R-tree
//! over feature bounding boxes so coordinates can be turned into clicks.

use crate::binding::{FeatureClick, InspectorPopup, MapSurface, PopupId, StyleFn, SurfaceFeature};
use crate::style::FeatureStyle;
use crate::types::{FeatureId, LatLng};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry};
use parking_lot::{Mutex, RwLock};
use rstar::{RTree, RTreeObject, AABB};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// R-tree entry pointing at a feature of a layer.
struct FeatureEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

#[derive(Default)]
struct Layer {
    features: Vec<SurfaceFeature>,
    overrides: HashMap<FeatureId, FeatureStyle>,
    style_fn: Option<StyleFn>,
    tree: RTree<FeatureEnvelope>,
}

impl Layer {
    fn reindex(&mut self) {
        let items = self
            .features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let rect = feature.geometry.bounding_rect()?;
                Some(FeatureEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        self.tree = RTree::bulk_load(items);
    }

    fn style_of(&self, feature: &SurfaceFeature) -> Option<FeatureStyle> {
        self.overrides
            .get(&feature.id)
            .copied()
            .or_else(|| self.style_fn.as_ref().map(|style| style(feature)))
    }
}

#[derive(Default)]
pub struct GeoJsonSurface {
    ready: AtomicBool,
    layers: RwLock<HashMap<String, Layer>>,
    popups: Mutex<BTreeMap<PopupId, InspectorPopup>>,
    next_popup: AtomicU64,
}

impl GeoJsonSurface {
    /// A surface that is not ready until [`mark_ready`](Self::mark_ready).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready() -> Self {
        let surface = Self::default();
        surface.mark_ready();
        surface
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn feature_count(&self, layer: &str) -> usize {
        self.layers.read().get(layer).map_or(0, |l| l.features.len())
    }

    pub fn style_of(&self, layer: &str, id: FeatureId) -> Option<FeatureStyle> {
        let layers = self.layers.read();
        let layer = layers.get(layer)?;
        let feature = layer.features.iter().find(|f| f.id == id)?;
        layer.style_of(feature)
    }

    /// The click a pointer at `at` would produce on `layer`.
    pub fn feature_at(&self, layer: &str, at: LatLng) -> Option<FeatureClick> {
        let layers = self.layers.read();
        let layer = layers.get(layer)?;
        let point = Point::new(at.lng, at.lat);
        let envelope = AABB::from_point([at.lng, at.lat]);

        let click = layer
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| layer.features.get(candidate.index))
            .find(|feature| feature.geometry.contains(&point))
            .map(|feature| FeatureClick {
                feature: json!({
                    "type": "Feature",
                    "id": feature.id.0,
                    "properties": Value::Object(feature.properties.clone()),
                }),
                geometry: Some(Arc::clone(&feature.geometry)),
                pointer: at,
            });
        click
    }

    /// The layer as a FeatureCollection, each feature carrying its resolved
    /// style under the `style` property.
    pub fn styled_collection(&self, layer: &str) -> FeatureCollection {
        let layers = self.layers.read();
        let features = layers
            .get(layer)
            .map(|layer| {
                layer
                    .features
                    .iter()
                    .map(|feature| {
                        let mut properties = feature.properties.clone();
                        if let Some(style) = layer.style_of(feature) {
                            if let Ok(value) = serde_json::to_value(style) {
                                properties.insert("style".to_string(), value);
                            }
                        }
                        Feature {
                            bbox: None,
                            geometry: Some(Geometry::new(geojson::Value::from(feature.geometry.as_ref()))),
                            id: Some(Id::Number(feature.id.0.into())),
                            properties: Some(properties),
                            foreign_members: None,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    pub fn popup(&self, id: PopupId) -> Option<InspectorPopup> {
        self.popups.lock().get(&id).cloned()
    }

    pub fn open_popups(&self) -> Vec<InspectorPopup> {
        self.popups.lock().values().cloned().collect()
    }
}

impl MapSurface for GeoJsonSurface {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn add_features(&self, layer: &str, features: &[SurfaceFeature]) {
        let mut layers = self.layers.write();
        let layer = layers.entry(layer.to_string()).or_default();
        layer.features.extend_from_slice(features);
        layer.reindex();
    }

    fn set_feature_style(&self, layer: &str, id: FeatureId, style: &FeatureStyle) {
        let mut layers = self.layers.write();
        layers.entry(layer.to_string()).or_default().overrides.insert(id, *style);
    }

    fn set_style_fn(&self, layer: &str, style: StyleFn) {
        let mut layers = self.layers.write();
        layers.entry(layer.to_string()).or_default().style_fn = Some(style);
    }

    fn remove_all_features(&self, layer: &str) {
        if let Some(layer) = self.layers.write().get_mut(layer) {
            layer.features.clear();
            layer.overrides.clear();
            layer.tree = RTree::new();
        }
    }

    fn open_popup(&self, popup: InspectorPopup) -> PopupId {
        let id = PopupId(self.next_popup.fetch_add(1, Ordering::SeqCst));
        self.popups.lock().insert(id, popup);
        id
    }

    fn close_popup(&self, id: PopupId) {
        self.popups.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::ColorRule;
    use geo::{polygon, MultiPolygon};

    fn square(id: usize, x: f64) -> SurfaceFeature {
        let p = polygon![(x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0)];
        let properties = json!({"countyName": format!("County {id}")}).as_object().cloned().unwrap();
        SurfaceFeature {
            id: FeatureId(id),
            geometry: Arc::new(MultiPolygon::new(vec![p])),
            properties,
        }
    }

    #[test]
    fn test_feature_at_hits_containing_polygon() {
        let surface = GeoJsonSurface::ready();
        surface.add_features("population", &[square(0, 0.0), square(1, 2.0)]);

        let click = surface.feature_at("population", LatLng::new(0.5, 2.5)).unwrap();
        assert_eq!(click.feature["id"], json!(1));
        assert_eq!(click.feature["properties"]["countyName"], json!("County 1"));
        assert!(surface.feature_at("population", LatLng::new(0.5, 1.5)).is_none());
        assert!(surface.feature_at("economic", LatLng::new(0.5, 0.5)).is_none());
    }

    #[test]
    fn test_override_wins_over_style_fn() {
        let surface = GeoJsonSurface::ready();
        let rule = ColorRule::default();
        surface.add_features("population", &[square(0, 0.0), square(1, 2.0)]);

        let fallback = FeatureStyle::for_change(&rule, None);
        surface.set_style_fn("population", Arc::new(move |_: &SurfaceFeature| fallback));
        let growth = FeatureStyle::for_change(&rule, Some(8.0));
        surface.set_feature_style("population", FeatureId(0), &growth);

        assert_eq!(surface.style_of("population", FeatureId(0)), Some(growth));
        assert_eq!(surface.style_of("population", FeatureId(1)), Some(fallback));

        let collection = surface.styled_collection("population");
        assert_eq!(collection.features.len(), 2);
        let props = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(props["style"]["fillColor"], json!(growth.fill_color.to_string()));
    }

    #[test]
    fn test_remove_all_features_clears_layer() {
        let surface = GeoJsonSurface::ready();
        surface.add_features("population", &[square(0, 0.0)]);
        surface.remove_all_features("population");
        assert_eq!(surface.feature_count("population"), 0);
        assert!(surface.feature_at("population", LatLng::new(0.5, 0.5)).is_none());
        assert!(surface.styled_collection("population").features.is_empty());
    }

    #[test]
    fn test_popups_open_and_close() {
        let surface = GeoJsonSurface::new();
        assert!(!surface.is_ready());
        let popup = InspectorPopup {
            layer: "population".into(),
            position: LatLng::new(0.0, 0.0),
            title: "Boulder".into(),
            zone: None,
            rows: vec![],
            note: None,
        };
        let a = surface.open_popup(popup.clone());
        let b = surface.open_popup(popup);
        assert_ne!(a, b);
        surface.close_popup(a);
        assert_eq!(surface.open_popups().len(), 1);
        assert!(surface.popup(b).is_some());
    }
}
