use crate::binding::InspectorPopup;
use crate::config::AppConfig;
use crate::error::OverlayError;
use crate::overlay::{Overlay, OverlayState};
use crate::profile::OverlayKind;
use crate::session::OverlaySet;
use crate::style::LegendEntry;
use crate::surface::GeoJsonSurface;
use crate::types::LatLng;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct AppState {
    pub overlays: OverlaySet,
    pub surface: Arc<GeoJsonSurface>,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
pub struct VisibilityRequest {
    visible: bool,
}

#[derive(Serialize)]
pub struct OverlaySummary {
    name: String,
    kind: OverlayKind,
    visible: bool,
    #[serde(flatten)]
    state: OverlayState,
}

impl OverlaySummary {
    fn of(overlay: &Overlay) -> Self {
        Self {
            name: overlay.name().to_string(),
            kind: overlay.profile().kind,
            visible: overlay.is_visible(),
            state: overlay.state(),
        }
    }
}

impl IntoResponse for OverlayError {
    fn into_response(self) -> Response {
        let status = match &self {
            OverlayError::UnknownOverlay(_) => StatusCode::NOT_FOUND,
            OverlayError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OverlayError::Enhancement(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/overlays", get(list_handler))
        .route("/api/overlays/{name}/visibility", post(visibility_handler))
        .route("/api/overlays/{name}/features", get(features_handler))
        .route("/api/overlays/{name}/legend", get(legend_handler))
        .route("/api/overlays/{name}/inspect", get(inspect_handler))
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    // The host is the map: it can take features as soon as it exists.
    let surface = Arc::new(GeoJsonSurface::ready());
    let overlays = OverlaySet::from_config(&config, surface.clone()).await?;
    let state = Arc::new(AppState { overlays, surface });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let static_dir = config
        .server
        .static_dir
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());
    let app = router(state)
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn find_overlay(state: &AppState, name: &str) -> Result<Arc<Overlay>, OverlayError> {
    state
        .overlays
        .get(name)
        .cloned()
        .ok_or_else(|| OverlayError::UnknownOverlay(name.to_string()))
}

async fn list_handler(State(state): State<Arc<AppState>>) -> Json<Vec<OverlaySummary>> {
    Json(state.overlays.iter().map(|o| OverlaySummary::of(o)).collect())
}

/// Showing starts the load in the background; poll the listing for progress.
async fn visibility_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<VisibilityRequest>,
) -> Result<Json<OverlaySummary>, OverlayError> {
    let overlay = find_overlay(&state, &name)?;
    if request.visible {
        let loading = Arc::clone(&overlay);
        tokio::spawn(async move {
            if let Err(err) = loading.show().await {
                warn!(overlay = %loading.name(), error = %err, "Overlay failed to load");
            }
        });
    } else {
        overlay.hide();
    }
    Ok(Json(OverlaySummary::of(&overlay)))
}

async fn features_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<FeatureCollection>, OverlayError> {
    let overlay = find_overlay(&state, &name)?;
    Ok(Json(state.surface.styled_collection(overlay.name())))
}

async fn legend_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<LegendEntry>>, OverlayError> {
    let overlay = find_overlay(&state, &name)?;
    Ok(Json(overlay.profile().legend()))
}

async fn inspect_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Option<InspectorPopup>>, OverlayError> {
    let overlay = find_overlay(&state, &name)?;
    let popup = state
        .surface
        .feature_at(overlay.name(), LatLng::new(params.lat, params.lon))
        .and_then(|click| overlay.handle_click(&click))
        .and_then(|id| state.surface.popup(id));
    Ok(Json(popup))
}
