use county_overlay::enhance::enhance;
use county_overlay::metrics::{classify_correlation, percent_change};
use county_overlay::profile::OverlayProfile;
use county_overlay::stats::StatLookup;
use county_overlay::style::ChangeBucket;
use county_overlay::types::{BoundaryFeature, MatchedBy, StatRecord, Zone};
use geo::{polygon, MultiPolygon};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn boulder_feature() -> BoundaryFeature {
    let properties = json!({"GEOID": "08013", "NAME": "Boulder"}).as_object().cloned().unwrap();
    let shape = polygon![(x: -105.7, y: 39.9), (x: -105.0, y: 39.9), (x: -105.0, y: 40.3), (x: -105.7, y: 40.3)];
    BoundaryFeature {
        geometry: Arc::new(MultiPolygon::new(vec![shape])),
        display_name: county_overlay::matcher::display_name(&properties),
        properties,
    }
}

fn boulder_population(code: Option<&str>) -> StatRecord {
    StatRecord {
        geo_code: code.map(str::to_string),
        name: "Boulder".into(),
        values: BTreeMap::from([("2010".into(), Some(100_000.0)), ("2020".into(), Some(108_000.0))]),
        change: None,
    }
}

#[test]
fn test_boulder_by_code_is_growth() {
    let profile = OverlayProfile::population();
    let lookup = StatLookup::build(&[boulder_population(Some("08013"))]);
    let out = enhance(&[boulder_feature()], &[lookup], &|records| profile.derive(records));

    let feature = &out[0];
    assert_eq!(feature.matched, vec![Some(MatchedBy::Code)]);
    assert_eq!(feature.derived.change, Some(8.0));
    assert_eq!(feature.properties["change"], json!(8.0));
    assert_eq!(profile.colors.change_bucket(feature.derived.change), Some(ChangeBucket::Growth));
    assert_eq!(
        profile.style(&feature.derived).fill_color,
        profile.colors.change_colors[ChangeBucket::Growth as usize]
    );
}

#[test]
fn test_boulder_by_name_when_codes_are_empty() {
    let profile = OverlayProfile::population();
    let legacy = boulder_population(None);
    let lookup = StatLookup {
        by_code: HashMap::new(),
        by_name: HashMap::from([("boulder".to_string(), Arc::new(legacy))]),
    };
    let out = enhance(&[boulder_feature()], &[lookup], &|records| profile.derive(records));
    assert_eq!(out[0].matched, vec![Some(MatchedBy::Name)]);
    assert_eq!(out[0].derived.change, Some(8.0));
}

#[test]
fn test_code_match_beats_name_match_to_other_record() {
    let profile = OverlayProfile::population();
    let mut impostor = boulder_population(None);
    impostor.values.insert("2020".into(), Some(50_000.0));

    let lookup = StatLookup {
        by_code: HashMap::from([("08013".to_string(), Arc::new(boulder_population(Some("08013"))))]),
        by_name: HashMap::from([("boulder".to_string(), Arc::new(impostor))]),
    };
    let out = enhance(&[boulder_feature()], &[lookup], &|records| profile.derive(records));
    assert_eq!(out[0].derived.change, Some(8.0));
}

#[test]
fn test_metric_scenarios() {
    assert_eq!(percent_change(Some(100_000.0), Some(108_000.0)), Some(8.0));
    assert_eq!(percent_change(Some(0.0), Some(5.0)), None);
    assert_eq!(percent_change(None, Some(5.0)), None);
    assert_eq!(classify_correlation(Some(6.2), Some(7.1)), Some(Zone::High));
    assert_eq!(classify_correlation(Some(-3.0), Some(-1.0)), Some(Zone::Low));
    assert_eq!(classify_correlation(Some(6.0), Some(-2.0)), Some(Zone::Moderate));
}

#[test]
fn test_enhance_leaves_input_untouched_and_repeats_equal() {
    let profile = OverlayProfile::correlation();
    let boundaries = vec![boulder_feature()];
    let before = boundaries.clone();
    let lookups = vec![StatLookup::build(&[boulder_population(Some("08013"))]), StatLookup::default()];

    let first = enhance(&boundaries, &lookups, &|records| profile.derive(records));
    let second = enhance(&boundaries, &lookups, &|records| profile.derive(records));
    assert_eq!(first, second);
    assert_eq!(boundaries, before);
    assert_eq!(first[0].derived.zone, None);
    assert_eq!(first[0].properties["correlationZone"], Value::Null);
    assert_eq!(first[0].properties["gdpChange"], Value::Null);
}
