//! Resolves the statistical record behind a boundary feature.
//!
//! Geographic codes are authoritative and collision-free, so a code hit
//! short-circuits. Names are only consulted when no code matches, since
//! identically named counties exist in different states.

use crate::normalize::{combine_state_county, normalize_geo_code, normalize_name, state_name_for_fips};
use crate::types::{BoundaryFeature, MatchedBy, StatRecord};
use geojson::JsonObject;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Single-field code properties, in priority order.
pub const CODE_KEYS: &[&str] = &["GEOID", "GEO_ID", "geoid", "id"];

/// Two-part (state, county) code properties, tried after `CODE_KEYS`.
pub const COMPOSITE_CODE_KEYS: &[(&str, &str)] = &[("STATE", "COUNTY"), ("STATEFP", "COUNTYFP")];

pub const UNKNOWN_COUNTY: &str = "Unknown County";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatMatch<'a> {
    pub record: &'a StatRecord,
    pub matched_by: MatchedBy,
}

/// Finds the record for `feature`, preferring `by_code` over `by_name`.
///
/// Every code candidate is tried against `by_code` before names are used.
pub fn match_feature<'a>(
    feature: &BoundaryFeature,
    by_code: &'a HashMap<String, Arc<StatRecord>>,
    by_name: &'a HashMap<String, Arc<StatRecord>>,
) -> Option<StatMatch<'a>> {
    let by_code_hit = code_candidates(&feature.properties)
        .into_iter()
        .find_map(|code| by_code.get(&code));
    if let Some(record) = by_code_hit {
        return Some(StatMatch {
            record: record.as_ref(),
            matched_by: MatchedBy::Code,
        });
    }

    let name = feature
        .display_name
        .clone()
        .or_else(|| display_name(&feature.properties))?;
    by_name.get(&normalize_name(&name)).map(|record| StatMatch {
        record: record.as_ref(),
        matched_by: MatchedBy::Name,
    })
}

/// The first five-digit county code found in a properties bag.
pub fn geo_code(props: &JsonObject) -> Option<String> {
    code_candidates(props).into_iter().next()
}

/// Every county code a properties bag yields, in priority order, without
/// duplicates. `id` only counts when it is a string: numeric ids are
/// feature ordinals, not codes.
pub fn code_candidates(props: &JsonObject) -> Vec<String> {
    let single = CODE_KEYS.iter().filter_map(|key| {
        let value = props.get(*key)?;
        let raw = match (*key, value) {
            ("id", Value::String(_)) => value_text(value)?,
            ("id", _) => return None,
            _ => value_text(value)?,
        };
        normalize_geo_code(&raw)
    });
    let composite = COMPOSITE_CODE_KEYS.iter().filter_map(|(state, county)| {
        let state = props.get(*state).and_then(value_text)?;
        let county = props.get(*county).and_then(value_text)?;
        combine_state_county(&state, &county)
    });

    let mut codes: Vec<String> = Vec::new();
    for code in single.chain(composite) {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

/// Name fallback chain: fully qualified name, then name plus legal suffix,
/// then the bare name.
pub fn display_name(props: &JsonObject) -> Option<String> {
    let text = |key: &str| {
        props
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(full) = text("NAMELSAD").or_else(|| text("NAME_LSAD")) {
        return Some(full.to_string());
    }
    let name = text("NAME")?;
    match text("LSAD") {
        Some(lsad) if !name.contains(lsad) => Some(format!("{name} {lsad}")),
        _ => Some(name.to_string()),
    }
}

/// Label for features without any name property, built from the numeric
/// state and county parts (`"County 013, Colorado"`).
pub fn fallback_label(props: &JsonObject) -> Option<String> {
    let state = props.get("STATE").and_then(value_text)?;
    let county = props.get("COUNTY").and_then(value_text)?;
    let state_name = state_name_for_fips(&state)
        .map(str::to_string)
        .unwrap_or_else(|| format!("State {state:0>2}"));
    Some(format!("County {county:0>3}, {state_name}"))
}

/// Text form of a string or integral number property.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.to_string())
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| format!("{f:.0}"))),
        _ => None,
    }
}
