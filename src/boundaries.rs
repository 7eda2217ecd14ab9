use crate::error::{OverlayError, OverlayResult};
use crate::matcher::display_name;
use crate::types::BoundaryFeature;
use async_trait::async_trait;
use geo::MultiPolygon;
use geojson::{feature::Id, GeoJson, JsonObject};
use serde_json::Value;
use shapefile::dbase::FieldValue;
use shapefile::Reader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Public US county boundaries keyed by five-digit FIPS `id`.
pub const DEFAULT_BOUNDARY_URL: &str =
    "https://raw.githubusercontent.com/plotly/datasets/master/geojson-counties-fips.json";

/// dBase attributes copied from shapefile records into the properties bag.
const SHAPEFILE_KEYS: &[&str] = &[
    "GEOID", "GEO_ID", "NAME", "NAMELSAD", "NAME_LSAD", "LSAD", "STATE", "COUNTY", "STATEFP",
    "COUNTYFP",
];

/// Something that can produce the county polygon collection.
#[async_trait]
pub trait BoundarySource: Send + Sync {
    async fn fetch(&self) -> OverlayResult<Vec<BoundaryFeature>>;
}

/// Reads a GeoJSON FeatureCollection or an ESRI shapefile from disk.
pub struct FileBoundarySource {
    path: PathBuf,
}

impl FileBoundarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BoundarySource for FileBoundarySource {
    async fn fetch(&self) -> OverlayResult<Vec<BoundaryFeature>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_boundaries(&path))
            .await
            .map_err(|e| OverlayError::unavailable("county boundaries", e))?
    }
}

/// Downloads a GeoJSON FeatureCollection.
pub struct HttpBoundarySource {
    url: String,
    client: reqwest::Client,
}

impl HttpBoundarySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBoundarySource {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY_URL)
    }
}

#[async_trait]
impl BoundarySource for HttpBoundarySource {
    async fn fetch(&self) -> OverlayResult<Vec<BoundaryFeature>> {
        let unavailable = |e: reqwest::Error| OverlayError::unavailable(&self.url, e);
        info!(url = %self.url, "Downloading county boundaries");
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)?;
        parse_geojson(&body).map_err(|reason| OverlayError::unavailable(&self.url, reason))
    }
}

/// Per-overlay boundary cache.
///
/// The first successful fetch is kept for the lifetime of the loader. A failed
/// fetch leaves the cache empty so the next load retries.
pub struct BoundaryLoader {
    source: Arc<dyn BoundarySource>,
    cache: OnceCell<Arc<[BoundaryFeature]>>,
}

impl BoundaryLoader {
    pub fn new(source: Arc<dyn BoundarySource>) -> Self {
        Self {
            source,
            cache: OnceCell::new(),
        }
    }

    pub async fn load(&self) -> OverlayResult<Arc<[BoundaryFeature]>> {
        let features = self
            .cache
            .get_or_try_init(|| async {
                let features = self.source.fetch().await?;
                info!("Loaded {} county boundaries", features.len());
                Ok::<_, OverlayError>(Arc::from(features))
            })
            .await?;
        Ok(Arc::clone(features))
    }

    pub fn is_cached(&self) -> bool {
        self.cache.initialized()
    }
}

/// Loads boundaries from a `.shp`, `.json` or `.geojson` file.
pub fn load_boundaries(path: &Path) -> OverlayResult<Vec<BoundaryFeature>> {
    let what = format!("county boundaries {:?}", path);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| OverlayError::unavailable(&what, "file has no extension"))?;

    match extension.as_str() {
        "shp" => load_shapefile(path).map_err(|reason| OverlayError::unavailable(&what, reason)),
        "json" | "geojson" => {
            let content =
                std::fs::read_to_string(path).map_err(|e| OverlayError::unavailable(&what, e))?;
            parse_geojson(&content).map_err(|reason| OverlayError::unavailable(&what, reason))
        }
        other => Err(OverlayError::unavailable(
            &what,
            format!("unsupported geometry format: {other}"),
        )),
    }
}

/// Parses a FeatureCollection, keeping polygon and multipolygon features.
pub fn parse_geojson(content: &str) -> Result<Vec<BoundaryFeature>, String> {
    let geojson: GeoJson = content
        .parse()
        .map_err(|e| format!("failed to parse GeoJSON: {e}"))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err("GeoJSON must be a FeatureCollection".to_string()),
    };

    let mut features = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;

    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(geom) => {
                let geometry: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| format!("failed to convert geometry: {e:?}"))?;
                match geometry {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        skipped += 1;
                        continue;
                    }
                }
            }
            None => {
                skipped += 1;
                continue;
            }
        };

        let mut properties = feature.properties.unwrap_or_default();
        // Numeric top-level ids are feature ordinals, not county codes.
        if let Some(Id::String(id)) = feature.id {
            properties.entry("id").or_insert(Value::String(id));
        }

        features.push(boundary_feature(geometry, properties));
    }

    if skipped > 0 {
        debug!("Skipped {} non-polygon features", skipped);
    }
    Ok(features)
}

fn load_shapefile(path: &Path) -> Result<Vec<BoundaryFeature>, String> {
    let mut reader =
        Reader::from_path(path).map_err(|e| format!("failed to open shapefile: {e}"))?;

    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| e.to_string())?;

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| format!("failed to convert polygon: {e:?}"))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| format!("failed to convert polygonM: {e:?}"))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| format!("failed to convert polygonZ: {e:?}"))?,
            _ => continue,
        };

        let mut properties = JsonObject::new();
        for key in SHAPEFILE_KEYS {
            let value = match record.get(key) {
                Some(FieldValue::Character(Some(s))) => Value::String(s.trim().to_string()),
                Some(FieldValue::Numeric(Some(n))) => serde_json::Number::from_f64(*n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                _ => continue,
            };
            properties.insert((*key).to_string(), value);
        }

        features.push(boundary_feature(geometry, properties));
    }

    Ok(features)
}

fn boundary_feature(geometry: MultiPolygon<f64>, properties: JsonObject) -> BoundaryFeature {
    let display_name = display_name(&properties);
    BoundaryFeature {
        geometry: Arc::new(geometry),
        properties,
        display_name,
    }
}
