//! Percent change and two-metric correlation classification.

use crate::types::{StatRecord, Zone};
use serde::{Deserialize, Serialize};

/// Strong-growth threshold (percent) both metrics must exceed for a
/// [`Zone::High`] classification.
pub const DEFAULT_STRONG_GROWTH: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPolicy {
    pub strong_growth: f64,
}

impl Default for CorrelationPolicy {
    fn default() -> Self {
        Self {
            strong_growth: DEFAULT_STRONG_GROWTH,
        }
    }
}

/// Percent change from `earlier` to `later`, rounded to two decimals.
///
/// Returns `None` when either value is missing or not finite, or when
/// `earlier` is not strictly positive.
pub fn percent_change(earlier: Option<f64>, later: Option<f64>) -> Option<f64> {
    let (earlier, later) = (earlier?, later?);
    if !earlier.is_finite() || !later.is_finite() || earlier <= 0.0 {
        return None;
    }
    let change = round2((later - earlier) / earlier * 100.0);
    change.is_finite().then_some(change)
}

pub fn classify_correlation(a: Option<f64>, b: Option<f64>) -> Option<Zone> {
    classify_correlation_with(a, b, &CorrelationPolicy::default())
}

/// High when both metrics exceed the strong-growth threshold, low when both
/// decline, moderate for every other pair.
pub fn classify_correlation_with(
    a: Option<f64>,
    b: Option<f64>,
    policy: &CorrelationPolicy,
) -> Option<Zone> {
    let (a, b) = (a?, b?);
    if a.is_nan() || b.is_nan() {
        return None;
    }
    if a > policy.strong_growth && b > policy.strong_growth {
        Some(Zone::High)
    } else if a < 0.0 && b < 0.0 {
        Some(Zone::Low)
    } else {
        Some(Zone::Moderate)
    }
}

/// The provider's precomputed change when usable, otherwise the change
/// between the two named periods.
pub fn effective_change(record: &StatRecord, earlier: &str, later: &str) -> Option<f64> {
    record
        .change
        .filter(|c| c.is_finite())
        .or_else(|| percent_change(record.value(earlier), record.value(later)))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
