//! Per-layer normalization to a 0–100 score.
//!
//! Raw layers span wildly different magnitudes (a few POIs per km² in the
//! countryside, thousands in central Tokyo), so values are compressed
//! with `log1p` before min–max scaling.

use std::collections::BTreeMap;

use urbanity_map_geography_models::RegionCode;

/// Rounds to one decimal place, ties to even.
#[must_use]
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round_ties_even() / 10.0
}

/// `log1p` of a raw value, treating missing and negative values as 0.
#[must_use]
pub fn log_transform(raw: Option<f64>) -> f64 {
    raw.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0).ln_1p()
}

/// Min–max scales `values` to `[0, 100]`.
///
/// Returns `None` when the range is zero (fewer than two distinct values).
#[must_use]
pub fn min_max_scale(values: &[f64]) -> Option<Vec<f64>> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return None;
    }
    Some(values.iter().map(|v| (v - min) / range * 100.0).collect())
}

/// A normalized layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedLayer {
    /// Score per region, 0–100, one decimal.
    pub scores: BTreeMap<RegionCode, f64>,
    /// `true` when every region had the same transformed value, in which
    /// case every score is 0.
    pub degenerate: bool,
}

/// Normalizes one raw layer.
///
/// `None` and `0` both map to the transform's zero point. With at least
/// two distinct raw values the minimum scores 0 and the maximum 100.
#[must_use]
pub fn normalize(raw: &BTreeMap<RegionCode, Option<f64>>) -> NormalizedLayer {
    let transformed: Vec<f64> = raw.values().map(|v| log_transform(*v)).collect();

    let Some(scaled) = min_max_scale(&transformed) else {
        return NormalizedLayer {
            scores: raw.keys().map(|code| (code.clone(), 0.0)).collect(),
            degenerate: true,
        };
    };

    NormalizedLayer {
        scores: raw
            .keys()
            .zip(scaled)
            .map(|(code, score)| (code.clone(), round1(score)))
            .collect(),
        degenerate: false,
    }
}
