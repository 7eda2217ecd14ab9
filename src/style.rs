//! Choropleth colors and feature styles.

use crate::types::Zone;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (leading `#` optional). Invalid channels read as 0.
    pub fn from_hex(hex: &str) -> Self {
        let hex = hex.trim().trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .unwrap_or(0)
        };
        Self::rgb(channel(0..2), channel(2..4), channel(4..6))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Ok(Color::from_hex(&hex))
    }
}

/// Named bucket of the five-step change scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeBucket {
    StrongDecline,
    Decline,
    Flat,
    Growth,
    StrongGrowth,
}

impl ChangeBucket {
    pub const ALL: [ChangeBucket; 5] = [
        ChangeBucket::StrongDecline,
        ChangeBucket::Decline,
        ChangeBucket::Flat,
        ChangeBucket::Growth,
        ChangeBucket::StrongGrowth,
    ];
}

/// What an overlay colors its counties by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleBasis {
    Change,
    Zone,
}

/// Thresholds and colors for change and zone rendering.
///
/// `breakpoints[i]` is the exclusive upper bound of bucket `i`; the last
/// bucket takes everything above the final breakpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorRule {
    pub breakpoints: [f64; 4],
    pub change_colors: [Color; 5],
    pub high: Color,
    pub moderate: Color,
    pub low: Color,
    pub unknown: Color,
}

impl Default for ColorRule {
    fn default() -> Self {
        Self {
            breakpoints: [-5.0, -1.0, 1.0, 10.0],
            change_colors: [
                Color::from_hex("#1e3a8a"),
                Color::from_hex("#60a5fa"),
                Color::from_hex("#dbeafe"),
                Color::from_hex("#f97316"),
                Color::from_hex("#dc2626"),
            ],
            high: Color::from_hex("#16a34a"),
            moderate: Color::from_hex("#eab308"),
            low: Color::from_hex("#dc2626"),
            unknown: Color::from_hex("#cccccc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
}

impl ColorRule {
    /// `None` for missing or NaN values, which are not "flat".
    pub fn change_bucket(&self, value: Option<f64>) -> Option<ChangeBucket> {
        let value = value.filter(|v| !v.is_nan())?;
        let index = self
            .breakpoints
            .iter()
            .position(|bound| value < *bound)
            .unwrap_or(self.breakpoints.len());
        Some(ChangeBucket::ALL[index])
    }

    pub fn color_for_change(&self, value: Option<f64>) -> Color {
        match self.change_bucket(value) {
            Some(bucket) => self.change_colors[bucket as usize],
            None => self.unknown,
        }
    }

    pub fn color_for_zone(&self, zone: Option<Zone>) -> Color {
        match zone {
            Some(Zone::High) => self.high,
            Some(Zone::Moderate) => self.moderate,
            Some(Zone::Low) => self.low,
            None => self.unknown,
        }
    }

    pub fn legend(&self, basis: StyleBasis) -> Vec<LegendEntry> {
        match basis {
            StyleBasis::Change => self.change_legend(),
            StyleBasis::Zone => self.zone_legend(),
        }
    }

    pub fn change_legend(&self) -> Vec<LegendEntry> {
        let [a, b, c, d] = self.breakpoints;
        let labels = [
            format!("< {a:+}%"),
            format!("{a:+}% to {b:+}%"),
            format!("{b:+}% to {c:+}%"),
            format!("{c:+}% to {d:+}%"),
            format!("> {d:+}%"),
        ];
        labels
            .into_iter()
            .zip(self.change_colors)
            .map(|(label, color)| LegendEntry { label, color })
            .chain(std::iter::once(self.no_data_entry()))
            .collect()
    }

    pub fn zone_legend(&self) -> Vec<LegendEntry> {
        vec![
            LegendEntry {
                label: "High Opportunity".into(),
                color: self.high,
            },
            LegendEntry {
                label: "Moderate Opportunity".into(),
                color: self.moderate,
            },
            LegendEntry {
                label: "Low Opportunity".into(),
                color: self.low,
            },
            self.no_data_entry(),
        ]
    }

    fn no_data_entry(&self) -> LegendEntry {
        LegendEntry {
            label: "No data".into(),
            color: self.unknown,
        }
    }
}

/// Fill and stroke applied to one rendered county.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStyle {
    pub fill_color: Color,
    pub fill_opacity: f64,
    pub stroke_color: Color,
    pub stroke_weight: f64,
    pub stroke_opacity: f64,
}

const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);

impl FeatureStyle {
    /// Style for change overlays; growth is drawn slightly more opaque.
    pub fn for_change(rule: &ColorRule, change: Option<f64>) -> Self {
        let growing = change.is_some_and(|c| c > 0.0);
        Self {
            fill_color: rule.color_for_change(change),
            fill_opacity: if growing { 0.7 } else { 0.65 },
            stroke_color: WHITE,
            stroke_weight: 1.0,
            stroke_opacity: 0.9,
        }
    }

    /// Style for the correlation overlay; unclassified counties are faded.
    pub fn for_zone(rule: &ColorRule, zone: Option<Zone>) -> Self {
        Self {
            fill_color: rule.color_for_zone(zone),
            fill_opacity: if zone.is_some() { 0.6 } else { 0.3 },
            stroke_color: WHITE,
            stroke_weight: 1.0,
            stroke_opacity: if zone.is_some() { 0.8 } else { 0.5 },
        }
    }
}
