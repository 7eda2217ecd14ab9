use async_trait::async_trait;
use county_overlay::binding::{FeatureClick, MapSurface, NO_DATA};
use county_overlay::boundaries::{parse_geojson, BoundaryLoader, BoundarySource};
use county_overlay::error::{OverlayError, OverlayResult};
use county_overlay::overlay::{Overlay, OverlayState};
use county_overlay::profile::OverlayProfile;
use county_overlay::surface::GeoJsonSurface;
use county_overlay::types::{BoundaryFeature, LatLng, StatRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

const COUNTIES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": {"GEOID": "08013", "NAME": "Boulder", "LSAD": "County"},
            "geometry": {"type": "Polygon", "coordinates": [[[-105.7, 39.9], [-105.0, 39.9], [-105.0, 40.3], [-105.7, 40.3], [-105.7, 39.9]]]}
        },
        {
            "type": "Feature",
            "properties": {"GEOID": "56029", "NAME": "Park"},
            "geometry": {"type": "Polygon", "coordinates": [[[-110.0, 44.0], [-109.0, 44.0], [-109.0, 45.0], [-110.0, 45.0], [-110.0, 44.0]]]}
        }
    ]
}"#;

const BOULDER: LatLng = LatLng { lat: 40.1, lng: -105.3 };
const PARK: LatLng = LatLng { lat: 44.5, lng: -109.5 };

fn counties() -> Vec<BoundaryFeature> {
    parse_geojson(COUNTIES).unwrap()
}

fn population(later: f64) -> Arc<[StatRecord]> {
    Arc::from(vec![StatRecord {
        geo_code: Some("08013".into()),
        name: "Boulder County, Colorado".into(),
        values: BTreeMap::from([("2010".into(), Some(100_000.0)), ("2020".into(), Some(later))]),
        change: None,
    }])
}

/// Returns the counties, failing the first `failures` fetches.
struct FlakySource {
    calls: AtomicUsize,
    failures: usize,
}

impl FlakySource {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures,
        })
    }
}

#[async_trait]
impl BoundarySource for FlakySource {
    async fn fetch(&self) -> OverlayResult<Vec<BoundaryFeature>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(OverlayError::unavailable("county boundaries", "connection reset"));
        }
        Ok(counties())
    }
}

/// Holds every fetch until released.
#[derive(Default)]
struct GatedSource {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl BoundarySource for GatedSource {
    async fn fetch(&self) -> OverlayResult<Vec<BoundaryFeature>> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(counties())
    }
}

fn overlay_on(profile: OverlayProfile, source: Arc<dyn BoundarySource>, surface: &Arc<GeoJsonSurface>) -> Arc<Overlay> {
    let surface: Arc<dyn MapSurface> = surface.clone();
    Arc::new(Overlay::new(profile, BoundaryLoader::new(source), surface))
}

#[tokio::test]
async fn test_show_renders_every_feature() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let overlay = overlay_on(OverlayProfile::population(), FlakySource::new(0), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();

    assert_eq!(overlay.state(), OverlayState::Hidden);
    assert_eq!(surface.feature_count("population"), 0);

    overlay.show().await.unwrap();
    assert_eq!(overlay.state(), OverlayState::Ready);
    assert_eq!(surface.feature_count("population"), 2);

    let features = overlay.features().unwrap();
    assert_eq!(features[0].derived.change, Some(8.0));
    assert_eq!(features[1].derived.change, None);
    assert_eq!(
        surface.styled_collection("population").features[1].properties.as_ref().unwrap()["style"]["fillColor"],
        Value::from("#cccccc")
    );
}

#[tokio::test]
async fn test_hidden_mid_fetch_pushes_nothing() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let gate = Arc::new(GatedSource::default());
    let overlay = overlay_on(OverlayProfile::population(), gate.clone(), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();

    let loading = {
        let overlay = Arc::clone(&overlay);
        tokio::spawn(async move { overlay.show().await })
    };
    gate.started.notified().await;
    assert_eq!(overlay.state(), OverlayState::Loading);

    overlay.hide();
    gate.release.notify_one();

    assert!(loading.await.unwrap().is_ok());
    assert_eq!(overlay.state(), OverlayState::Hidden);
    assert_eq!(surface.feature_count("population"), 0);
    assert!(overlay.features().is_none());
}

#[tokio::test]
async fn test_render_waits_for_surface() {
    let surface = Arc::new(GeoJsonSurface::new());
    let overlay = overlay_on(OverlayProfile::population(), FlakySource::new(0), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();

    overlay.show().await.unwrap();
    assert_eq!(overlay.state(), OverlayState::Loading);
    assert!(overlay.features().is_some());
    assert_eq!(surface.feature_count("population"), 0);

    surface.mark_ready();
    assert!(overlay.surface_ready());
    assert_eq!(overlay.state(), OverlayState::Ready);
    assert_eq!(surface.feature_count("population"), 2);
}

#[tokio::test]
async fn test_failure_then_retry_on_next_show() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let source = FlakySource::new(1);
    let overlay = overlay_on(OverlayProfile::population(), source.clone(), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();

    let err = overlay.show().await.unwrap_err();
    assert!(matches!(err, OverlayError::SourceUnavailable { .. }));
    assert!(matches!(overlay.state(), OverlayState::Failed(msg) if msg.contains("connection reset")));
    assert_eq!(surface.feature_count("population"), 0);

    overlay.show().await.unwrap();
    assert_eq!(overlay.state(), OverlayState::Ready);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_new_inputs_replace_enrichment() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let source = FlakySource::new(0);
    let overlay = overlay_on(OverlayProfile::population(), source.clone(), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();
    overlay.show().await.unwrap();

    overlay.set_inputs(vec![population(90_000.0)]).await.unwrap();
    assert_eq!(overlay.state(), OverlayState::Ready);
    assert_eq!(overlay.features().unwrap()[0].derived.change, Some(-10.0));
    assert_eq!(surface.feature_count("population"), 2);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_new_inputs_supersede_pending_load() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let gate = Arc::new(GatedSource::default());
    let overlay = overlay_on(OverlayProfile::population(), gate.clone(), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();

    let loading = {
        let overlay = Arc::clone(&overlay);
        tokio::spawn(async move { overlay.show().await })
    };
    gate.started.notified().await;
    assert_eq!(overlay.state(), OverlayState::Loading);

    // The update waits on the same fetch, so one release serves both.
    let (updated, ()) = tokio::join!(overlay.set_inputs(vec![population(90_000.0)]), async {
        gate.release.notify_one();
    });
    updated.unwrap();
    assert!(loading.await.unwrap().is_ok());

    assert_eq!(overlay.state(), OverlayState::Ready);
    assert_eq!(overlay.features().unwrap()[0].derived.change, Some(-10.0));
    assert_eq!(surface.feature_count("population"), 2);
}

#[tokio::test]
async fn test_nested_and_flat_clicks_give_same_popup() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let overlay = overlay_on(OverlayProfile::population(), FlakySource::new(0), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();
    overlay.show().await.unwrap();

    let nested = surface.feature_at("population", BOULDER).unwrap();
    let first = overlay.handle_click(&nested).unwrap();
    let nested_popup = surface.popup(first).unwrap();

    let flat = FeatureClick {
        feature: nested.feature["properties"].clone(),
        ..nested
    };
    let second = overlay.handle_click(&flat).unwrap();
    let flat_popup = surface.popup(second).unwrap();

    assert_eq!(nested_popup, flat_popup);
    assert!(surface.popup(first).is_none());
    assert_eq!(nested_popup.title, "Boulder County");
    assert_eq!(nested_popup.rows[0].text, "+8.00%");
    assert_eq!(nested_popup.rows[1].text, "108,000");
    assert!((nested_popup.position.lat - 40.1).abs() < 1e-6);
}

#[tokio::test]
async fn test_unmatched_county_reads_no_data() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let overlay = overlay_on(OverlayProfile::population(), FlakySource::new(0), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();
    overlay.show().await.unwrap();

    let click = surface.feature_at("population", PARK).unwrap();
    let popup = surface.popup(overlay.handle_click(&click).unwrap()).unwrap();
    assert_eq!(popup.title, "Park");
    assert!(popup.rows.iter().all(|row| row.text == NO_DATA));
}

#[tokio::test]
async fn test_hide_clears_layer_and_popup() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let overlay = overlay_on(OverlayProfile::population(), FlakySource::new(0), &surface);
    overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();
    overlay.show().await.unwrap();

    let click = surface.feature_at("population", BOULDER).unwrap();
    overlay.handle_click(&click).unwrap();
    assert_eq!(surface.open_popups().len(), 1);

    overlay.hide();
    assert_eq!(surface.feature_count("population"), 0);
    assert!(surface.open_popups().is_empty());
    assert!(overlay.features().is_none());
    assert!(overlay.handle_click(&click).is_none());
}

#[tokio::test]
async fn test_overlays_share_surface_on_separate_layers() {
    let surface = Arc::new(GeoJsonSurface::ready());
    let source = FlakySource::new(0);
    let population_overlay = overlay_on(OverlayProfile::population(), source.clone(), &surface);
    let correlation = overlay_on(OverlayProfile::correlation(), source.clone(), &surface);

    population_overlay.set_inputs(vec![population(108_000.0)]).await.unwrap();
    correlation.set_inputs(vec![population(108_000.0), Arc::from(Vec::new())]).await.unwrap();
    population_overlay.show().await.unwrap();
    correlation.show().await.unwrap();

    assert_eq!(surface.feature_count("population"), 2);
    assert_eq!(surface.feature_count("correlation"), 2);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    correlation.hide();
    assert_eq!(surface.feature_count("population"), 2);
    assert_eq!(surface.feature_count("correlation"), 0);
}
