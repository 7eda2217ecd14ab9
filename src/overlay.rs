//! One independently toggled overlay and its load/render cycle.
//!
//! Every operation bumps a generation counter. A load that resumes after an
//! await only applies its result if the overlay is still visible and no newer
//! operation has started; otherwise the result is dropped silently.

use crate::binding::{FeatureClick, MapSurface, PopupId, RenderBinding};
use crate::boundaries::BoundaryLoader;
use crate::enhance::enhance;
use crate::error::{OverlayError, OverlayResult};
use crate::profile::OverlayProfile;
use crate::stats::StatLookup;
use crate::types::{EnrichedFeature, StatRecord};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum OverlayState {
    Hidden,
    Loading,
    Ready,
    /// Loading failed; showing the overlay again retries.
    Failed(String),
}

struct Inner {
    visible: bool,
    generation: u64,
    state: OverlayState,
    lookups: Option<Arc<[StatLookup]>>,
    binding: RenderBinding,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.visible && self.generation == generation
    }
}

pub struct Overlay {
    profile: Arc<OverlayProfile>,
    loader: BoundaryLoader,
    inner: Mutex<Inner>,
}

impl Overlay {
    pub fn new(profile: OverlayProfile, loader: BoundaryLoader, surface: Arc<dyn MapSurface>) -> Self {
        let binding = RenderBinding::new(profile.name.clone(), surface);
        Self {
            profile: Arc::new(profile),
            loader,
            inner: Mutex::new(Inner {
                visible: false,
                generation: 0,
                state: OverlayState::Hidden,
                lookups: None,
                binding,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &Arc<OverlayProfile> {
        &self.profile
    }

    pub fn state(&self) -> OverlayState {
        self.inner.lock().state.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.inner.lock().visible
    }

    /// The enriched collection currently held, if any.
    pub fn features(&self) -> Option<Arc<[EnrichedFeature]>> {
        self.inner.lock().binding.data().cloned()
    }

    /// Makes the overlay visible and loads it. A no-op while already loading
    /// or ready.
    pub async fn show(&self) -> OverlayResult<()> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.visible && matches!(inner.state, OverlayState::Loading | OverlayState::Ready) {
                return Ok(());
            }
            inner.visible = true;
            inner.generation += 1;
            inner.state = OverlayState::Loading;
            inner.generation
        };
        info!(overlay = %self.name(), "Showing overlay");
        self.refresh(generation).await
    }

    /// Hides the overlay, clearing its layer and releasing the enriched
    /// collection. Any load in flight is discarded when it resumes.
    pub fn hide(&self) {
        let mut inner = self.inner.lock();
        inner.visible = false;
        inner.generation += 1;
        inner.state = OverlayState::Hidden;
        inner.binding.release();
        info!(overlay = %self.name(), "Hid overlay");
    }

    /// Replaces the statistics feeding this overlay, one record set per
    /// metric. A visible overlay re-enhances; a pending pass is superseded.
    pub async fn set_inputs(&self, datasets: Vec<Arc<[StatRecord]>>) -> OverlayResult<()> {
        let lookups: Arc<[StatLookup]> = datasets.iter().map(|records| StatLookup::build(records)).collect();
        let generation = {
            let mut inner = self.inner.lock();
            inner.lookups = Some(lookups);
            inner.generation += 1;
            if !inner.visible {
                return Ok(());
            }
            inner.state = OverlayState::Loading;
            inner.generation
        };
        self.refresh(generation).await
    }

    /// Called once the map surface can accept features. Finishes a render
    /// that was waiting on it and returns whether the overlay is ready.
    pub fn surface_ready(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.visible && inner.state == OverlayState::Loading && inner.binding.try_bind(&self.profile) {
            inner.state = OverlayState::Ready;
            info!(overlay = %self.name(), "Overlay ready");
        }
        inner.state == OverlayState::Ready
    }

    pub fn handle_click(&self, click: &FeatureClick) -> Option<PopupId> {
        let mut inner = self.inner.lock();
        if inner.state != OverlayState::Ready {
            return None;
        }
        inner.binding.handle_click(&self.profile, click)
    }

    async fn refresh(&self, generation: u64) -> OverlayResult<()> {
        let boundaries = match self.loader.load().await {
            Ok(boundaries) => boundaries,
            Err(err) => return self.fail(generation, err),
        };

        let lookups = {
            let inner = self.inner.lock();
            if !inner.is_current(generation) {
                debug!(overlay = %self.name(), "Discarding boundaries for a superseded load");
                return Ok(());
            }
            inner.lookups.clone()
        };
        let Some(lookups) = lookups else {
            debug!(overlay = %self.name(), "Waiting for statistics inputs");
            return Ok(());
        };

        let profile = Arc::clone(&self.profile);
        let enhanced = tokio::task::spawn_blocking(move || {
            enhance(&boundaries, &lookups, &|records| profile.derive(records))
        })
        .await;
        let enriched = match enhanced {
            Ok(enriched) => enriched,
            Err(err) => return self.fail(generation, OverlayError::Enhancement(err.to_string())),
        };

        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            debug!(overlay = %self.name(), "Discarding enrichment for a superseded load");
            return Ok(());
        }
        inner.binding.set_data(enriched);
        if inner.binding.try_bind(&self.profile) {
            inner.state = OverlayState::Ready;
            info!(overlay = %self.name(), "Overlay ready");
        }
        Ok(())
    }

    /// Records a failure for the current load; stale failures are dropped.
    fn fail(&self, generation: u64, err: OverlayError) -> OverlayResult<()> {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            debug!(overlay = %self.name(), error = %err, "Ignoring failure of a superseded load");
            return Ok(());
        }
        warn!(overlay = %self.name(), error = %err, "Unable to load overlay");
        inner.state = OverlayState::Failed(err.to_string());
        Err(err)
    }
}
