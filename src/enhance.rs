//! Boundary features plus matched statistics → enriched features.

use crate::matcher::{display_name, fallback_label, UNKNOWN_COUNTY};
use crate::profile::{CHANGE_KEY, NAME_KEY, ZONE_KEY};
use crate::stats::StatLookup;
use crate::types::{BoundaryFeature, DerivedFields, EnrichedFeature, FeatureId, MatchedBy, StatRecord};
use geojson::JsonObject;
use rayon::prelude::*;
use serde_json::{Number, Value};
use tracing::info;

/// Derive function shared by every overlay: one record slot per lookup.
pub type DeriveFn<'a> = dyn Fn(&[Option<&StatRecord>]) -> DerivedFields + Sync + 'a;

/// Enriches every boundary feature in parallel.
///
/// Features without a match are kept with null fields. The boundaries are
/// only read, and the output follows their order.
pub fn enhance(boundaries: &[BoundaryFeature], lookups: &[StatLookup], derive: &DeriveFn<'_>) -> Vec<EnrichedFeature> {
    let enriched: Vec<EnrichedFeature> = boundaries
        .par_iter()
        .enumerate()
        .map(|(index, feature)| enrich_feature(FeatureId(index), feature, lookups, derive))
        .collect();

    let by_code = count_matches(&enriched, MatchedBy::Code);
    let by_name = count_matches(&enriched, MatchedBy::Name);
    let unmatched = enriched
        .iter()
        .filter(|f| f.matched.iter().all(Option::is_none))
        .count();
    info!(
        features = enriched.len(),
        by_code, by_name, unmatched, "Enhanced boundary features"
    );
    enriched
}

fn enrich_feature(
    id: FeatureId,
    feature: &BoundaryFeature,
    lookups: &[StatLookup],
    derive: &DeriveFn<'_>,
) -> EnrichedFeature {
    let matches: Vec<_> = lookups.iter().map(|lookup| lookup.resolve(feature)).collect();
    let records: Vec<Option<&StatRecord>> = matches.iter().map(|m| m.map(|m| m.record)).collect();
    let derived = derive(&records);

    let name = feature
        .display_name
        .clone()
        .or_else(|| display_name(&feature.properties))
        .or_else(|| fallback_label(&feature.properties))
        .unwrap_or_else(|| UNKNOWN_COUNTY.to_string());

    EnrichedFeature {
        id,
        geometry: feature.geometry.clone(),
        properties: enriched_properties(&feature.properties, &name, &derived),
        display_name: name,
        matched: matches.iter().map(|m| m.map(|m| m.matched_by)).collect(),
        derived,
    }
}

fn enriched_properties(base: &JsonObject, name: &str, derived: &DerivedFields) -> JsonObject {
    let mut props = base.clone();
    props.insert(NAME_KEY.to_string(), Value::String(name.to_string()));
    for (key, value) in &derived.values {
        props.insert(key.clone(), number(*value));
    }
    props.insert(CHANGE_KEY.to_string(), number(derived.change));
    props.insert(
        ZONE_KEY.to_string(),
        derived
            .zone
            .map(|zone| Value::String(zone.as_str().to_string()))
            .unwrap_or(Value::Null),
    );
    props
}

fn number(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn count_matches(features: &[EnrichedFeature], tier: MatchedBy) -> usize {
    features
        .iter()
        .flat_map(|f| f.matched.iter())
        .filter(|m| **m == Some(tier))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::OverlayProfile;
    use geo::{polygon, MultiPolygon};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn boundary(props: Value) -> BoundaryFeature {
        let properties = props.as_object().cloned().unwrap();
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        BoundaryFeature {
            geometry: Arc::new(MultiPolygon::new(vec![square])),
            display_name: display_name(&properties),
            properties,
        }
    }

    fn population(code: Option<&str>, name: &str, earlier: f64, later: f64) -> StatRecord {
        StatRecord {
            geo_code: code.map(str::to_string),
            name: name.into(),
            values: BTreeMap::from([("2010".into(), Some(earlier)), ("2020".into(), Some(later))]),
            change: None,
        }
    }

    #[test]
    fn test_enhance_attaches_fields() {
        let profile = OverlayProfile::population();
        let lookup = StatLookup::build(&[population(Some("08013"), "Boulder", 100_000.0, 108_000.0)]);
        let boundaries = vec![boundary(json!({"GEOID": "08013", "NAME": "Boulder"}))];

        let out = enhance(&boundaries, &[lookup], &|records| profile.derive(records));
        let feature = &out[0];
        assert_eq!(feature.display_name, "Boulder");
        assert_eq!(feature.matched, vec![Some(MatchedBy::Code)]);
        assert_eq!(feature.properties[NAME_KEY], json!("Boulder"));
        assert_eq!(feature.properties["change"], json!(8.0));
        assert_eq!(feature.properties["population2020"], json!(108_000.0));
        assert_eq!(feature.properties[ZONE_KEY], Value::Null);
        assert!(!boundaries[0].properties.contains_key(NAME_KEY));
    }

    #[test]
    fn test_unmatched_features_are_kept_with_nulls() {
        let profile = OverlayProfile::population();
        let boundaries = vec![
            boundary(json!({"STATE": "01", "COUNTY": "001"})),
            boundary(json!({})),
        ];
        let out = enhance(&boundaries, &[StatLookup::default()], &|records| profile.derive(records));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].display_name, "County 001, Alabama");
        assert_eq!(out[1].display_name, UNKNOWN_COUNTY);
        assert_eq!(out[1].properties["change"], Value::Null);
        assert_eq!(out[1].properties["population2010"], Value::Null);
        assert_eq!(out[1].matched, vec![None]);
    }

    #[test]
    fn test_enhance_is_ordered_and_idempotent() {
        let profile = OverlayProfile::population();
        let records: Vec<_> = (1..=40)
            .map(|i| population(Some(&format!("08{i:03}")), &format!("County {i}"), 100.0, 100.0 + i as f64))
            .collect();
        let lookup = StatLookup::build(&records);
        let boundaries: Vec<_> = (1..=40).map(|i| boundary(json!({ "GEOID": format!("08{i:03}") }))).collect();
        let before = boundaries.clone();

        let derive = |records: &[Option<&StatRecord>]| profile.derive(records);
        let first = enhance(&boundaries, std::slice::from_ref(&lookup), &derive);
        let second = enhance(&boundaries, std::slice::from_ref(&lookup), &derive);

        assert_eq!(first, second);
        assert_eq!(boundaries, before);
        for (i, feature) in first.iter().enumerate() {
            assert_eq!(feature.id, FeatureId(i));
            assert_eq!(feature.derived.change, Some((i + 1) as f64));
        }
    }

    #[test]
    fn test_correlation_uses_both_lookups() {
        let profile = OverlayProfile::correlation();
        let people = StatLookup::build(&[population(Some("08013"), "Boulder", 100.0, 106.2)]);
        let gdp = StatLookup::build(&[StatRecord {
            geo_code: None,
            name: "Boulder".into(),
            values: BTreeMap::from([("2019".into(), Some(100.0)), ("2023".into(), Some(107.1))]),
            change: None,
        }]);
        let boundaries = vec![boundary(json!({"GEOID": "08013", "NAME": "Boulder"}))];

        let out = enhance(&boundaries, &[people, gdp], &|records| profile.derive(records));
        assert_eq!(out[0].matched, vec![Some(MatchedBy::Code), Some(MatchedBy::Name)]);
        assert_eq!(out[0].properties[ZONE_KEY], json!("high"));
        assert_eq!(out[0].properties["change"], Value::Null);
    }
}
