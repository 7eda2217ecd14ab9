use crate::metrics::CorrelationPolicy;
use crate::profile::{MetricDef, OverlayKind, OverlayProfile};
use crate::style::ColorRule;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default = "default_overlays")]
    pub overlays: Vec<OverlayConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Local `.geojson`/`.json`/`.shp` boundary file.
    pub boundaries: Option<PathBuf>,
    /// Remote GeoJSON, used when no local file is configured.
    pub boundaries_url: Option<String>,
    pub datasets: HashMap<String, DatasetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub code_column: Option<String>,
    pub name_column: String,
    pub change_column: Option<String>,
    /// Period label to CSV column.
    pub periods: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OverlayConfig {
    pub name: String,
    pub kind: OverlayKind,
    pub metrics: Vec<MetricDef>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub correlation: CorrelationPolicy,
    #[serde(default)]
    pub colors: ColorRule,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every overlay metric points at a configured dataset and
    /// that overlay kinds have the right number of metrics.
    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for overlay in &self.overlays {
            if seen.contains(&overlay.name) {
                return Err(anyhow!("Duplicate overlay name '{}'", overlay.name));
            }
            seen.push(overlay.name.clone());

            let expected = match overlay.kind {
                OverlayKind::Correlation => 2,
                OverlayKind::Population | OverlayKind::Economic => 1,
            };
            if overlay.metrics.len() != expected {
                return Err(anyhow!(
                    "Overlay '{}' needs {} metric(s), found {}",
                    overlay.name,
                    expected,
                    overlay.metrics.len()
                ));
            }
            for metric in &overlay.metrics {
                let dataset = self.input.datasets.get(&metric.dataset).ok_or_else(|| {
                    anyhow!(
                        "Overlay '{}' references unknown dataset '{}'",
                        overlay.name,
                        metric.dataset
                    )
                })?;
                for period in [&metric.earlier, &metric.later] {
                    if !dataset.periods.contains_key(period) {
                        return Err(anyhow!(
                            "Dataset '{}' has no period '{}' (overlay '{}')",
                            metric.dataset,
                            period,
                            overlay.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn profiles(&self) -> Vec<OverlayProfile> {
        self.overlays
            .iter()
            .map(|overlay| {
                OverlayProfile::new(overlay.name.clone(), overlay.kind, overlay.metrics.clone())
                    .with_note(overlay.note.clone())
                    .with_colors(self.policy.colors.clone())
                    .with_correlation(self.policy.correlation)
            })
            .collect()
    }
}

fn default_overlays() -> Vec<OverlayConfig> {
    [OverlayProfile::population(), OverlayProfile::economic(), OverlayProfile::correlation()]
        .into_iter()
        .map(|profile| OverlayConfig {
            name: profile.name,
            kind: profile.kind,
            metrics: profile.metrics,
            note: profile.note,
        })
        .collect()
}
