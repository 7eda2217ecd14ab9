//! The overlay variants: which datasets feed an overlay, what it derives per
//! county, how it is colored and what its inspector shows.

use crate::metrics::{classify_correlation_with, effective_change, percent_change, CorrelationPolicy};
use crate::style::{ColorRule, FeatureStyle, LegendEntry, StyleBasis};
use crate::types::{DerivedFields, StatRecord, Zone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property holding the resolved county name.
pub const NAME_KEY: &str = "countyName";
/// Property holding the primary percent change of single-metric overlays.
pub const CHANGE_KEY: &str = "change";
/// Property holding the correlation zone (`"high"`, `"moderate"`, `"low"`).
pub const ZONE_KEY: &str = "correlationZone";

pub const GDP_SECTOR_NOTE: &str = "The gross domestic product (GDP) shown is only for Accommodations, \
Food Service, Recreation, Entertainment and Art.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Population,
    Economic,
    Correlation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueUnit {
    #[default]
    Count,
    /// Values reported in thousands of dollars.
    ThousandDollars,
}

/// An extra percent-change window shown alongside a metric's main change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthWindow {
    pub key: String,
    pub label: String,
    pub from: String,
    pub to: String,
}

/// One statistical metric of an overlay, read from one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDef {
    pub dataset: String,
    /// Property prefix, e.g. `population` gives `population2010`.
    pub key: String,
    pub label: String,
    pub earlier: String,
    pub later: String,
    #[serde(default)]
    pub unit: ValueUnit,
    pub change_label: Option<String>,
    #[serde(default)]
    pub windows: Vec<GrowthWindow>,
}

impl MetricDef {
    pub fn value_key(&self, period: &str) -> String {
        format!("{}{}", self.key, period)
    }

    pub fn change_key(&self) -> String {
        format!("{}Change", self.key)
    }

    pub fn change_label(&self) -> String {
        self.change_label
            .clone()
            .unwrap_or_else(|| format!("{} Change ({}-{})", self.label, self.earlier, self.later))
    }

    /// Pushes this metric's fields and returns its change. A missing record
    /// still pushes every key, with null values.
    fn derive_into(&self, record: Option<&StatRecord>, out: &mut Vec<(String, Option<f64>)>) -> Option<f64> {
        let value = |period: &str| record.and_then(|r| r.value(period));
        let change = record.and_then(|r| effective_change(r, &self.earlier, &self.later));

        out.push((self.value_key(&self.earlier), value(self.earlier.as_str())));
        out.push((self.value_key(&self.later), value(self.later.as_str())));
        out.push((self.change_key(), change));
        for window in &self.windows {
            out.push((window.key.clone(), percent_change(value(window.from.as_str()), value(window.to.as_str()))));
        }
        change
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowFormat {
    Percent,
    Count,
    Dollars,
}

/// A labelled line of the inspector popup, read from one feature property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectorRow {
    pub label: String,
    pub key: String,
    pub format: RowFormat,
}

impl InspectorRow {
    fn new(label: impl Into<String>, key: impl Into<String>, format: RowFormat) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayProfile {
    pub name: String,
    pub kind: OverlayKind,
    pub metrics: Vec<MetricDef>,
    pub colors: ColorRule,
    pub correlation: CorrelationPolicy,
    pub note: Option<String>,
}

impl OverlayProfile {
    pub fn new(name: impl Into<String>, kind: OverlayKind, metrics: Vec<MetricDef>) -> Self {
        Self {
            name: name.into(),
            kind,
            metrics,
            colors: ColorRule::default(),
            correlation: CorrelationPolicy::default(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn with_colors(mut self, colors: ColorRule) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_correlation(mut self, policy: CorrelationPolicy) -> Self {
        self.correlation = policy;
        self
    }

    pub fn population() -> Self {
        Self::new("population", OverlayKind::Population, vec![population_metric()])
    }

    pub fn economic() -> Self {
        Self::new("economic", OverlayKind::Economic, vec![gdp_metric()]).with_note(Some(GDP_SECTOR_NOTE.to_string()))
    }

    pub fn correlation() -> Self {
        Self::new(
            "correlation",
            OverlayKind::Correlation,
            vec![population_metric(), gdp_metric()],
        )
    }

    pub fn basis(&self) -> StyleBasis {
        match self.kind {
            OverlayKind::Correlation => StyleBasis::Zone,
            OverlayKind::Population | OverlayKind::Economic => StyleBasis::Change,
        }
    }

    /// Dataset ids in lookup order.
    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.dataset.as_str())
    }

    /// Fields for one county from its matched records, one slot per metric.
    pub fn derive(&self, records: &[Option<&StatRecord>]) -> DerivedFields {
        let mut fields = DerivedFields::default();
        let changes: Vec<Option<f64>> = self
            .metrics
            .iter()
            .enumerate()
            .map(|(i, metric)| metric.derive_into(records.get(i).copied().flatten(), &mut fields.values))
            .collect();

        match self.basis() {
            StyleBasis::Zone => {
                let first = changes.first().copied().flatten();
                let second = changes.get(1).copied().flatten();
                fields.zone = classify_correlation_with(first, second, &self.correlation);
            }
            StyleBasis::Change => fields.change = changes.first().copied().flatten(),
        }
        fields
    }

    pub fn style(&self, derived: &DerivedFields) -> FeatureStyle {
        match self.basis() {
            StyleBasis::Change => FeatureStyle::for_change(&self.colors, derived.change),
            StyleBasis::Zone => FeatureStyle::for_zone(&self.colors, derived.zone),
        }
    }

    /// Property the style function reads.
    pub fn style_key(&self) -> &'static str {
        match self.basis() {
            StyleBasis::Change => CHANGE_KEY,
            StyleBasis::Zone => ZONE_KEY,
        }
    }

    /// Style from the raw `style_key` property value of a rendered feature.
    pub fn style_for_value(&self, value: Option<&Value>) -> FeatureStyle {
        match self.basis() {
            StyleBasis::Change => FeatureStyle::for_change(&self.colors, value.and_then(Value::as_f64)),
            StyleBasis::Zone => {
                let zone = value.and_then(Value::as_str).and_then(Zone::parse);
                FeatureStyle::for_zone(&self.colors, zone)
            }
        }
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.colors.legend(self.basis())
    }

    pub fn inspector_rows(&self) -> Vec<InspectorRow> {
        let mut rows = Vec::new();
        for metric in &self.metrics {
            rows.push(InspectorRow::new(metric.change_label(), metric.change_key(), RowFormat::Percent));
            if self.kind == OverlayKind::Correlation {
                continue;
            }
            for window in &metric.windows {
                rows.push(InspectorRow::new(&window.label, &window.key, RowFormat::Percent));
            }
            let format = match metric.unit {
                ValueUnit::Count => RowFormat::Count,
                ValueUnit::ThousandDollars => RowFormat::Dollars,
            };
            for period in [&metric.later, &metric.earlier] {
                rows.push(InspectorRow::new(
                    format!("{} {}", period, metric.label),
                    metric.value_key(period),
                    format,
                ));
            }
        }
        rows
    }

    /// Label and description shown for a correlation zone.
    pub fn zone_summary(&self, zone: Zone) -> (&'static str, String) {
        match zone {
            Zone::High => (
                "High Opportunity",
                format!("Both metrics showing strong growth (>{}%)", self.correlation.strong_growth),
            ),
            Zone::Moderate => (
                "Moderate Opportunity",
                "One metric showing strong growth or both showing positive growth".to_string(),
            ),
            Zone::Low => ("Low Opportunity", "Both metrics declining".to_string()),
        }
    }
}

fn population_metric() -> MetricDef {
    MetricDef {
        dataset: "population".into(),
        key: "population".into(),
        label: "Population".into(),
        earlier: "2010".into(),
        later: "2020".into(),
        unit: ValueUnit::Count,
        change_label: Some("Population Change (2010-2020)".into()),
        windows: Vec::new(),
    }
}

fn gdp_metric() -> MetricDef {
    MetricDef {
        dataset: "gdp".into(),
        key: "gdp".into(),
        label: "GDP".into(),
        earlier: "2019".into(),
        later: "2023".into(),
        unit: ValueUnit::ThousandDollars,
        change_label: Some("Average Year-over-Year Growth (2001-2023)".into()),
        windows: vec![
            GrowthWindow {
                key: "gdpRecentGrowth".into(),
                label: "Recent Growth (2022-2023)".into(),
                from: "2022".into(),
                to: "2023".into(),
            },
            GrowthWindow {
                key: "gdpGrowthSince2019".into(),
                label: "Growth Since 2019".into(),
                from: "2019".into(),
                to: "2023".into(),
            },
        ],
    }
}
