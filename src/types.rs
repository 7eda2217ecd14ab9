use geo::MultiPolygon;
use geojson::JsonObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One county polygon as loaded from the boundary source.
///
/// The geometry is shared and never changes after load; enrichment works on
/// copies of `properties`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub geometry: Arc<MultiPolygon<f64>>,
    pub properties: JsonObject,
    /// Human-readable name resolved from the name-like properties at load.
    pub display_name: Option<String>,
}

/// One row of a statistics dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatRecord {
    /// Normalized five-digit county code, absent for legacy datasets.
    pub geo_code: Option<String>,
    pub name: String,
    /// Reporting period label (`"2010"`) to value. Missing cells are `None`.
    pub values: BTreeMap<String, Option<f64>>,
    /// Percent change precomputed by the data provider.
    pub change: Option<f64>,
}

impl StatRecord {
    pub fn value(&self, period: &str) -> Option<f64> {
        self.values.get(period).copied().flatten()
    }
}

/// Three-valued opportunity classification of a county.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    High,
    Moderate,
    Low,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::High => "high",
            Zone::Moderate => "moderate",
            Zone::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Zone::High),
            "moderate" => Some(Zone::Moderate),
            "low" => Some(Zone::Low),
            _ => None,
        }
    }
}

/// Which identifier tier produced a statistical match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedBy {
    Code,
    Name,
}

/// Fields computed from the matched records of one feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFields {
    /// Property key to value, in insertion order.
    pub values: Vec<(String, Option<f64>)>,
    pub change: Option<f64>,
    pub zone: Option<Zone>,
}

/// A boundary feature copy carrying resolved name and derived metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedFeature {
    /// Position of the feature in the boundary collection.
    pub id: FeatureId,
    pub geometry: Arc<MultiPolygon<f64>>,
    pub properties: JsonObject,
    pub display_name: String,
    /// Match tier per lookup, `None` where the lookup had no record.
    pub matched: Vec<Option<MatchedBy>>,
    pub derived: DerivedFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}
