//! Wires the configured overlays to their boundary source and datasets.

use crate::binding::MapSurface;
use crate::boundaries::{BoundaryLoader, BoundarySource, FileBoundarySource, HttpBoundarySource};
use crate::config::{AppConfig, InputConfig};
use crate::overlay::Overlay;
use crate::stats::load_dataset;
use crate::types::StatRecord;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct OverlaySet {
    overlays: Vec<Arc<Overlay>>,
}

impl OverlaySet {
    /// Loads every referenced dataset once and creates the overlays, hidden,
    /// with their inputs set. Each overlay gets its own boundary cache.
    pub async fn from_config(config: &AppConfig, surface: Arc<dyn MapSurface>) -> Result<Self> {
        let source = boundary_source(&config.input);
        let profiles = config.profiles();

        let mut datasets: HashMap<String, Arc<[StatRecord]>> = HashMap::new();
        for id in profiles.iter().flat_map(|p| p.datasets()) {
            if datasets.contains_key(id) {
                continue;
            }
            let dataset = config
                .input
                .datasets
                .get(id)
                .with_context(|| format!("Dataset '{}' is not configured", id))?;
            let records = load_dataset(id, dataset)?;
            datasets.insert(id.to_string(), records.into());
        }

        let mut overlays = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let inputs = profile
                .datasets()
                .map(|id| {
                    datasets
                        .get(id)
                        .cloned()
                        .with_context(|| format!("Dataset '{}' was not loaded", id))
                })
                .collect::<Result<Vec<_>>>()?;
            let loader = BoundaryLoader::new(Arc::clone(&source));
            let overlay = Arc::new(Overlay::new(profile, loader, Arc::clone(&surface)));
            overlay.set_inputs(inputs).await?;
            overlays.push(overlay);
        }

        info!("Configured {} overlays", overlays.len());
        Ok(Self { overlays })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Overlay>> {
        self.overlays.iter().find(|o| o.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Overlay>> {
        self.overlays.iter()
    }
}

/// Local file when configured, otherwise GeoJSON over HTTP.
pub fn boundary_source(input: &InputConfig) -> Arc<dyn BoundarySource> {
    match (&input.boundaries, &input.boundaries_url) {
        (Some(path), _) => Arc::new(FileBoundarySource::new(path.clone())),
        (None, Some(url)) => Arc::new(HttpBoundarySource::new(url.clone())),
        (None, None) => Arc::new(HttpBoundarySource::default()),
    }
}
