//! Pushes enriched features into a map surface and answers clicks.

use crate::matcher::UNKNOWN_COUNTY;
use crate::normalize::expand_state_suffix;
use crate::profile::{InspectorRow, OverlayProfile, RowFormat, NAME_KEY, ZONE_KEY};
use crate::style::{FeatureStyle, StyleBasis};
use crate::types::{EnrichedFeature, FeatureId, LatLng, Zone};
use geo::{BoundingRect, Centroid, MultiPolygon};
use geojson::JsonObject;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const NO_DATA: &str = "no data";

/// Style callback a surface applies to features it adds later.
pub type StyleFn = Arc<dyn Fn(&SurfaceFeature) -> FeatureStyle + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PopupId(pub u64);

/// A feature as handed to the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceFeature {
    pub id: FeatureId,
    pub geometry: Arc<MultiPolygon<f64>>,
    pub properties: JsonObject,
}

impl From<&EnrichedFeature> for SurfaceFeature {
    fn from(feature: &EnrichedFeature) -> Self {
        Self {
            id: feature.id,
            geometry: Arc::clone(&feature.geometry),
            properties: feature.properties.clone(),
        }
    }
}

/// A click as reported by the surface.
///
/// `feature` is whatever object the surface keeps for the clicked shape:
/// either a GeoJSON-like object with a nested `properties` member or a flat
/// object with the properties merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureClick {
    pub feature: Value,
    pub geometry: Option<Arc<MultiPolygon<f64>>>,
    pub pointer: LatLng,
}

/// The interactive map the overlays draw on.
pub trait MapSurface: Send + Sync {
    fn is_ready(&self) -> bool;
    fn add_features(&self, layer: &str, features: &[SurfaceFeature]);
    fn set_feature_style(&self, layer: &str, id: FeatureId, style: &FeatureStyle);
    fn set_style_fn(&self, layer: &str, style: StyleFn);
    fn remove_all_features(&self, layer: &str);
    fn open_popup(&self, popup: InspectorPopup) -> PopupId;
    fn close_popup(&self, id: PopupId);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSummary {
    pub zone: Zone,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupRow {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectorPopup {
    pub layer: String,
    pub position: LatLng,
    pub title: String,
    pub zone: Option<ZoneSummary>,
    pub rows: Vec<PopupRow>,
    pub note: Option<String>,
}

/// Reads `key` from a clicked feature, looking in the nested `properties`
/// object before the flattened form. Null counts as absent.
pub fn read_feature_property<'a>(feature: &'a Value, key: &str) -> Option<&'a Value> {
    let nested = feature
        .get("properties")
        .and_then(|props| props.get(key))
        .filter(|v| !v.is_null());
    nested.or_else(|| feature.get(key).filter(|v| !v.is_null()))
}

/// Binding of one overlay's enriched collection to its surface layer.
pub struct RenderBinding {
    layer: String,
    surface: Arc<dyn MapSurface>,
    data: Option<Arc<[EnrichedFeature]>>,
    bound: bool,
    popup: Option<PopupId>,
}

impl RenderBinding {
    pub fn new(layer: impl Into<String>, surface: Arc<dyn MapSurface>) -> Self {
        Self {
            layer: layer.into(),
            surface,
            data: None,
            bound: false,
            popup: None,
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Replaces the enriched collection. The next `try_bind` pushes it.
    pub fn set_data(&mut self, features: Vec<EnrichedFeature>) {
        self.data = Some(features.into());
        self.bound = false;
    }

    pub fn data(&self) -> Option<&Arc<[EnrichedFeature]>> {
        self.data.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Pushes the data once both it and the surface are ready. Returns
    /// whether the layer is bound afterwards.
    pub fn try_bind(&mut self, profile: &Arc<OverlayProfile>) -> bool {
        if self.bound {
            return true;
        }
        let Some(data) = self.data.clone() else {
            return false;
        };
        if !self.surface.is_ready() {
            debug!(layer = %self.layer, "Surface not ready, deferring render");
            return false;
        }

        self.surface.remove_all_features(&self.layer);
        let features: Vec<SurfaceFeature> = data.iter().map(SurfaceFeature::from).collect();
        self.surface.add_features(&self.layer, &features);
        for feature in data.iter() {
            self.surface
                .set_feature_style(&self.layer, feature.id, &profile.style(&feature.derived));
        }

        let style_profile = Arc::clone(profile);
        self.surface.set_style_fn(
            &self.layer,
            Arc::new(move |feature: &SurfaceFeature| {
                style_profile.style_for_value(feature.properties.get(style_profile.style_key()))
            }),
        );

        debug!(layer = %self.layer, features = features.len(), "Rendered overlay layer");
        self.bound = true;
        true
    }

    /// Clears the layer, drops the enriched collection and closes the popup.
    pub fn release(&mut self) {
        if self.bound {
            self.surface.remove_all_features(&self.layer);
        }
        if let Some(popup) = self.popup.take() {
            self.surface.close_popup(popup);
        }
        self.data = None;
        self.bound = false;
    }

    /// Opens the inspector for a click, replacing any open popup. Clicks
    /// before the layer is rendered are ignored.
    pub fn handle_click(&mut self, profile: &OverlayProfile, click: &FeatureClick) -> Option<PopupId> {
        if !self.bound {
            return None;
        }
        let popup = build_popup(profile, &self.layer, click);
        if let Some(previous) = self.popup.take() {
            self.surface.close_popup(previous);
        }
        let id = self.surface.open_popup(popup);
        self.popup = Some(id);
        Some(id)
    }
}

pub fn build_popup(profile: &OverlayProfile, layer: &str, click: &FeatureClick) -> InspectorPopup {
    let feature = &click.feature;
    let title = read_feature_property(feature, NAME_KEY)
        .and_then(Value::as_str)
        .map(expand_state_suffix)
        .unwrap_or_else(|| UNKNOWN_COUNTY.to_string());

    let mut rows = Vec::new();
    let mut zone = None;
    if profile.basis() == StyleBasis::Zone {
        let parsed = read_feature_property(feature, ZONE_KEY)
            .and_then(Value::as_str)
            .and_then(Zone::parse);
        match parsed {
            Some(z) => {
                let (label, description) = profile.zone_summary(z);
                zone = Some(ZoneSummary {
                    zone: z,
                    label: label.to_string(),
                    description,
                });
            }
            None => rows.push(PopupRow {
                label: "Opportunity Zone".into(),
                text: NO_DATA.into(),
            }),
        }
    }

    rows.extend(profile.inspector_rows().iter().map(|row| popup_row(feature, row)));

    InspectorPopup {
        layer: layer.to_string(),
        position: popup_position(click),
        title,
        zone,
        rows,
        note: profile.note.clone(),
    }
}

fn popup_row(feature: &Value, row: &InspectorRow) -> PopupRow {
    let value = read_feature_property(feature, &row.key)
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .filter(|v: &f64| v.is_finite());
    PopupRow {
        label: row.label.clone(),
        text: value
            .map(|v| format_value(v, row.format))
            .unwrap_or_else(|| NO_DATA.to_string()),
    }
}

/// Centroid of the clicked shape, then its bounding-box center, then the
/// pointer itself.
pub fn popup_position(click: &FeatureClick) -> LatLng {
    let Some(geometry) = &click.geometry else {
        return click.pointer;
    };
    geometry
        .centroid()
        .map(|p| LatLng::new(p.y(), p.x()))
        .or_else(|| {
            geometry.bounding_rect().map(|rect| {
                let center = rect.center();
                LatLng::new(center.y, center.x)
            })
        })
        .filter(|p| p.lat.is_finite() && p.lng.is_finite())
        .unwrap_or(click.pointer)
}

pub fn format_value(value: f64, format: RowFormat) -> String {
    match format {
        RowFormat::Percent => format!("{value:+.2}%"),
        RowFormat::Count => group_thousands(value),
        RowFormat::Dollars => format_millions(value / 1000.0),
    }
}

fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let grouped = group_digits(&format!("{:.0}", rounded.abs()));
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// `$48,000.0M` style: one decimal, grouped whole part.
fn format_millions(millions: f64) -> String {
    let fixed = format!("{:.1}", millions.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "0"));
    let sign = if millions < 0.0 && fixed != "0.0" { "-" } else { "" };
    format!("{sign}${}.{fraction}M", group_digits(whole))
}

fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
