//! Canonical keys for county names, state names and county codes.
//!
//! Every function here is total: unrecognized input produces a best-effort
//! string (or `None` for codes) instead of an error.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// (postal code, full name, FIPS code)
const STATES: &[(&str, &str, &str)] = &[
    ("AL", "Alabama", "01"),
    ("AK", "Alaska", "02"),
    ("AZ", "Arizona", "04"),
    ("AR", "Arkansas", "05"),
    ("CA", "California", "06"),
    ("CO", "Colorado", "08"),
    ("CT", "Connecticut", "09"),
    ("DE", "Delaware", "10"),
    ("DC", "District of Columbia", "11"),
    ("FL", "Florida", "12"),
    ("GA", "Georgia", "13"),
    ("HI", "Hawaii", "15"),
    ("ID", "Idaho", "16"),
    ("IL", "Illinois", "17"),
    ("IN", "Indiana", "18"),
    ("IA", "Iowa", "19"),
    ("KS", "Kansas", "20"),
    ("KY", "Kentucky", "21"),
    ("LA", "Louisiana", "22"),
    ("ME", "Maine", "23"),
    ("MD", "Maryland", "24"),
    ("MA", "Massachusetts", "25"),
    ("MI", "Michigan", "26"),
    ("MN", "Minnesota", "27"),
    ("MS", "Mississippi", "28"),
    ("MO", "Missouri", "29"),
    ("MT", "Montana", "30"),
    ("NE", "Nebraska", "31"),
    ("NV", "Nevada", "32"),
    ("NH", "New Hampshire", "33"),
    ("NJ", "New Jersey", "34"),
    ("NM", "New Mexico", "35"),
    ("NY", "New York", "36"),
    ("NC", "North Carolina", "37"),
    ("ND", "North Dakota", "38"),
    ("OH", "Ohio", "39"),
    ("OK", "Oklahoma", "40"),
    ("OR", "Oregon", "41"),
    ("PA", "Pennsylvania", "42"),
    ("RI", "Rhode Island", "44"),
    ("SC", "South Carolina", "45"),
    ("SD", "South Dakota", "46"),
    ("TN", "Tennessee", "47"),
    ("TX", "Texas", "48"),
    ("UT", "Utah", "49"),
    ("VT", "Vermont", "50"),
    ("VA", "Virginia", "51"),
    ("WA", "Washington", "53"),
    ("WV", "West Virginia", "54"),
    ("WI", "Wisconsin", "55"),
    ("WY", "Wyoming", "56"),
    ("AS", "American Samoa", "60"),
    ("GU", "Guam", "66"),
    ("MP", "Northern Mariana Islands", "69"),
    ("PR", "Puerto Rico", "72"),
    ("VI", "U.S. Virgin Islands", "78"),
];

/// Token-wise expansions applied after punctuation is stripped.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("st", "saint"),
    ("ste", "sainte"),
    ("mt", "mount"),
    ("ft", "fort"),
];

/// Length of a combined state+county code.
pub const COUNTY_CODE_LEN: usize = 5;

/// Canonical comparison key for a free-text name.
///
/// Lowercases, strips diacritics, drops punctuation (hyphens and slashes
/// separate words), collapses whitespace and expands common abbreviations:
/// `"St. Mary's Parish"` becomes `"saint marys parish"`.
pub fn normalize_name(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for c in raw.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            folded.extend(c.to_lowercase());
        } else if c.is_whitespace() || matches!(c, '-' | '/' | '_' | '&') {
            folded.push(' ');
        }
    }

    folded
        .split_whitespace()
        .map(|token| {
            ABBREVIATIONS
                .iter()
                .find(|(short, _)| *short == token)
                .map_or(token, |(_, long)| *long)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expands a two-letter postal code to the full state name.
///
/// Unknown input is returned unchanged.
pub fn normalize_state_abbreviation(raw: &str) -> String {
    let code = raw.trim();
    if code.len() == 2 {
        if let Some((_, name, _)) = STATES
            .iter()
            .find(|(abbr, _, _)| abbr.eq_ignore_ascii_case(code))
        {
            return (*name).to_string();
        }
    }
    raw.to_string()
}

/// Reverse lookup: full state name to postal code.
pub fn state_abbreviation(name: &str) -> Option<&'static str> {
    let wanted = normalize_name(name);
    STATES
        .iter()
        .find(|(_, full, _)| normalize_name(full) == wanted)
        .map(|(abbr, _, _)| *abbr)
}

pub fn state_name_for_fips(code: &str) -> Option<&'static str> {
    let code = code.trim();
    if code.is_empty() || code.len() > 2 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{code:0>2}");
    STATES
        .iter()
        .find(|(_, _, fips)| *fips == padded)
        .map(|(_, name, _)| *name)
}

/// Rewrites a trailing `", XX"` postal code into the full state name.
///
/// `"Park, WY"` becomes `"Park, Wyoming"`; anything else is returned as is.
pub fn expand_state_suffix(name: &str) -> String {
    match name.rsplit_once(',') {
        Some((county, state))
            if state.trim().len() == 2 && state.trim().bytes().all(|b| b.is_ascii_alphabetic()) =>
        {
            format!("{}, {}", county.trim_end(), normalize_state_abbreviation(state))
        }
        _ => name.to_string(),
    }
}

/// Canonical five-digit county code.
///
/// Accepts bare digit strings (`"8013"` → `"08013"`) and census geography ids
/// (`"0500000US08013"`). Anything longer than a county code, such as a tract
/// GEOID, is not a county and yields `None`.
pub fn normalize_geo_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits = match trimmed.rfind("US") {
        Some(pos) => &trimmed[pos + 2..],
        None => trimmed,
    };
    if digits.is_empty() || digits.len() > COUNTY_CODE_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(pad_code(digits, COUNTY_CODE_LEN))
}

/// Joins separate state and county parts (`"8"`, `"13"`) into `"08013"`.
pub fn combine_state_county(state: &str, county: &str) -> Option<String> {
    let (state, county) = (state.trim(), county.trim());
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !numeric(state) || !numeric(county) || state.len() > 2 || county.len() > 3 {
        return None;
    }
    Some(format!("{}{}", pad_code(state, 2), pad_code(county, 3)))
}

fn pad_code(digits: &str, width: usize) -> String {
    format!("{digits:0>width$}")
}
