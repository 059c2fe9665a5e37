//! PCA-weighted fusion of raw layers into one composite score.
//!
//! Regions with no signal in any layer (uninhabited islands, lakes
//! mapped as their own unit) would otherwise dominate the covariance
//! structure, so they are excluded from fitting and score 0.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, SymmetricEigen};
use serde::Serialize;
use urbanity_map_geography_models::RegionCode;

use crate::FusionError;
use crate::normalize::{log_transform, min_max_scale, round1};
use crate::remap::PiecewiseRemap;

/// Variance below this is treated as zero.
const VARIANCE_EPSILON: f64 = 1e-12;

/// Diagnostic summary of one fusion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionReport {
    /// Layer names, in column order.
    pub layers: Vec<String>,
    /// Layer used to orient the component.
    pub base_layer: String,
    /// Absolute first-component loadings normalized to sum 1, per layer.
    pub weights: BTreeMap<String, f64>,
    /// Share of total standardized variance explained by the component.
    pub explained_variance_ratio: f64,
    /// Whether the component was negated to agree with the base layer.
    pub sign_flipped: bool,
    /// Regions used for fitting.
    pub restricted: usize,
    /// Regions with no signal in any layer.
    pub excluded: usize,
}

/// Composite scores plus the report that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    /// Composite score per region, 0–100, one decimal.
    pub scores: BTreeMap<RegionCode, f64>,
    /// Fit diagnostics.
    pub report: FusionReport,
}

/// Fuses raw layers along their first principal component.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    layers: Vec<String>,
    base: usize,
    remap: PiecewiseRemap,
}

impl FusionEngine {
    /// Creates an engine over `layers`, oriented by `base_layer`.
    ///
    /// # Errors
    ///
    /// * [`FusionError::NoLayers`] if `layers` is empty
    /// * [`FusionError::UnknownBaseLayer`] if `base_layer` is not listed
    pub fn new(
        layers: Vec<String>,
        base_layer: &str,
        remap: PiecewiseRemap,
    ) -> Result<Self, FusionError> {
        if layers.is_empty() {
            return Err(FusionError::NoLayers);
        }
        let base = layers
            .iter()
            .position(|l| l == base_layer)
            .ok_or_else(|| FusionError::UnknownBaseLayer {
                name: base_layer.to_string(),
            })?;
        Ok(Self {
            layers,
            base,
            remap,
        })
    }

    /// Layer names, in column order.
    #[must_use]
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Computes composite scores from raw layer values.
    ///
    /// Each row holds one raw value per layer, in [`Self::layers`] order;
    /// `None` means no data and counts as 0.
    ///
    /// # Errors
    ///
    /// * [`FusionError::RaggedRow`] if a row has the wrong length
    /// * [`FusionError::NothingToFuse`] if no region has any nonzero value
    pub fn fuse(
        &self,
        rows: &BTreeMap<RegionCode, Vec<Option<f64>>>,
    ) -> Result<FusionOutcome, FusionError> {
        let p = self.layers.len();
        for (code, row) in rows {
            if row.len() != p {
                return Err(FusionError::RaggedRow {
                    code: code.to_string(),
                    expected: p,
                    got: row.len(),
                });
            }
        }

        let restricted: Vec<(&RegionCode, Vec<f64>)> = rows
            .iter()
            .filter(|(_, row)| row.iter().any(|v| v.is_some_and(|x| x > 0.0)))
            .map(|(code, row)| (code, row.iter().map(|v| log_transform(*v)).collect()))
            .collect();
        if restricted.is_empty() {
            return Err(FusionError::NothingToFuse);
        }

        let n = restricted.len();
        let x = DMatrix::from_fn(n, p, |i, j| restricted[i].1[j]);
        let z = standardize(&x);

        #[allow(clippy::cast_precision_loss)]
        let covariance = (z.transpose() * &z) / n as f64;
        let trace = covariance.trace();

        let (weights, projection, explained, flipped) = if trace <= VARIANCE_EPSILON {
            log::warn!("Fusion input has no variance across {n} regions; all scores are 0");
            #[allow(clippy::cast_precision_loss)]
            let uniform = vec![1.0 / p as f64; p];
            (uniform, vec![0.0; n], 0.0, false)
        } else {
            let eigen = SymmetricEigen::new(covariance);
            let (top, lambda) = eigen
                .eigenvalues
                .iter()
                .copied()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, l)| {
                    if l > best.1 { (i, l) } else { best }
                });
            let component = eigen.eigenvectors.column(top).into_owned();

            let abs_sum: f64 = component.iter().map(|v| v.abs()).sum();
            let weights: Vec<f64> = component.iter().map(|v| v.abs() / abs_sum).collect();

            let mut projection: Vec<f64> = (z * &component).iter().copied().collect();
            let base_column: Vec<f64> = x.column(self.base).iter().copied().collect();
            let flipped = pearson(&projection, &base_column) < 0.0;
            if flipped {
                for v in &mut projection {
                    *v = -*v;
                }
            }
            (weights, projection, lambda / trace, flipped)
        };

        let scaled = min_max_scale(&projection).unwrap_or_else(|| vec![0.0; n]);

        let mut scores: BTreeMap<RegionCode, f64> =
            rows.keys().map(|code| (code.clone(), 0.0)).collect();
        for ((code, _), s) in restricted.iter().zip(scaled) {
            scores.insert((*code).clone(), round1(self.remap.apply(s)));
        }

        let report = FusionReport {
            layers: self.layers.clone(),
            base_layer: self.layers[self.base].clone(),
            weights: self.layers.iter().cloned().zip(weights).collect(),
            explained_variance_ratio: explained,
            sign_flipped: flipped,
            restricted: n,
            excluded: rows.len() - n,
        };
        log::info!(
            "Fused {} layers over {} regions ({} excluded); weights {:?}, explained variance {:.3}",
            p,
            report.restricted,
            report.excluded,
            report.weights,
            report.explained_variance_ratio
        );

        Ok(FusionOutcome { scores, report })
    }
}

/// Column-wise standardization with population standard deviation.
/// Zero-variance columns are centred only.
fn standardize(x: &DMatrix<f64>) -> DMatrix<f64> {
    let mut z = x.clone();
    #[allow(clippy::cast_precision_loss)]
    let n = x.nrows() as f64;
    for mut column in z.column_iter_mut() {
        let mean = column.sum() / n;
        column.add_scalar_mut(-mean);
        let std = (column.norm_squared() / n).sqrt();
        if std > VARIANCE_EPSILON {
            column /= std;
        }
    }
    z
}

/// Pearson correlation; 0 when either side has no variance.
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (da, db) = (x - mean_a, y - mean_b);
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= VARIANCE_EPSILON || var_b <= VARIANCE_EPSILON {
        return 0.0;
    }
    cov / (var_a * var_b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FusionEngine {
        FusionEngine::new(
            vec![
                "night_light".to_string(),
                "population".to_string(),
                "poi".to_string(),
            ],
            "night_light",
            PiecewiseRemap::default(),
        )
        .unwrap()
    }

    fn code(s: &str) -> RegionCode {
        RegionCode::parse(s).unwrap()
    }

    fn rows(data: &[(&str, [Option<f64>; 3])]) -> BTreeMap<RegionCode, Vec<Option<f64>>> {
        data.iter().map(|(c, r)| (code(c), r.to_vec())).collect()
    }

    fn sample() -> BTreeMap<RegionCode, Vec<Option<f64>>> {
        rows(&[
            ("13101", [Some(60.0), Some(60_000.0), Some(900.0)]),
            ("13102", [Some(40.0), Some(150_000.0), Some(400.0)]),
            ("01101", [Some(25.0), Some(240_000.0), Some(150.0)]),
            ("02201", [Some(8.0), Some(280_000.0), Some(30.0)]),
            ("03201", [Some(3.0), Some(190_000.0), Some(10.0)]),
            ("46303", [Some(0.5), Some(2_000.0), Some(1.0)]),
            ("47999", [None, None, None]),
        ])
    }

    #[test]
    fn weights_are_non_negative_and_sum_to_one() {
        let outcome = engine().fuse(&sample()).unwrap();
        let sum: f64 = outcome.report.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(outcome.report.weights.values().all(|w| *w >= 0.0));
        assert!(outcome.report.explained_variance_ratio > 0.0);
        assert!(outcome.report.explained_variance_ratio <= 1.0 + 1e-9);
    }

    #[test]
    fn scores_span_range_and_follow_base_layer() {
        let data = sample();
        let outcome = engine().fuse(&data).unwrap();

        let max = outcome.scores.values().copied().fold(f64::MIN, f64::max);
        assert!((max - 100.0).abs() < f64::EPSILON);
        assert!(outcome.scores.values().all(|s| (0.0..=100.0).contains(s)));

        let restricted: Vec<&RegionCode> = data
            .iter()
            .filter(|(_, r)| r.iter().any(Option::is_some))
            .map(|(c, _)| c)
            .collect();
        let composite: Vec<f64> = restricted.iter().map(|c| outcome.scores[*c]).collect();
        let base: Vec<f64> = restricted
            .iter()
            .map(|c| log_transform(data[*c][0]))
            .collect();
        assert!(pearson(&composite, &base) >= 0.0);
    }

    #[test]
    fn excluded_regions_score_zero() {
        let outcome = engine().fuse(&sample()).unwrap();
        assert!(outcome.scores[&code("47999")].abs() < f64::EPSILON);
        assert_eq!(outcome.report.excluded, 1);
        assert_eq!(outcome.report.restricted, 6);
        assert_eq!(outcome.scores.len(), 7);
    }

    #[test]
    fn single_signal_region_is_restricted_alone() {
        let data = rows(&[
            ("01101", [Some(50.0), Some(0.0), Some(0.0)]),
            ("01102", [None, None, None]),
        ]);
        let outcome = engine().fuse(&data).unwrap();
        assert_eq!(outcome.report.restricted, 1);
        assert_eq!(outcome.report.excluded, 1);
        assert!(outcome.scores[&code("01102")].abs() < f64::EPSILON);
        assert!(outcome.scores[&code("01101")].abs() < f64::EPSILON);
        let sum: f64 = outcome.report.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn perfectly_correlated_layers_share_weight() {
        let data = rows(&[
            ("01101", [Some(1.0), Some(1.0), Some(5.0)]),
            ("01102", [Some(10.0), Some(10.0), Some(5.0)]),
            ("01103", [Some(100.0), Some(100.0), Some(5.0)]),
        ]);
        let outcome = engine().fuse(&data).unwrap();
        let w = &outcome.report.weights;
        assert!((w["night_light"] - 0.5).abs() < 1e-6);
        assert!((w["population"] - 0.5).abs() < 1e-6);
        assert!(w["poi"].abs() < 1e-6);
        assert!((outcome.report.explained_variance_ratio - 1.0).abs() < 1e-9);

        assert!(outcome.scores[&code("01101")].abs() < f64::EPSILON);
        assert!((outcome.scores[&code("01103")] - 100.0).abs() < f64::EPSILON);
        assert!(outcome.scores[&code("01102")] > 0.0);
    }

    #[test]
    fn deterministic_across_runs() {
        let a = engine().fuse(&sample()).unwrap();
        let b = engine().fuse(&sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nothing_to_fuse_is_fatal() {
        let data = rows(&[("01101", [None, Some(0.0), None])]);
        assert!(matches!(
            engine().fuse(&data),
            Err(FusionError::NothingToFuse)
        ));
    }

    #[test]
    fn rejects_unknown_base_and_ragged_rows() {
        assert!(matches!(
            FusionEngine::new(vec!["a".to_string()], "b", PiecewiseRemap::default()),
            Err(FusionError::UnknownBaseLayer { .. })
        ));

        let mut data = sample();
        data.insert(code("99999"), vec![Some(1.0)]);
        assert!(matches!(
            engine().fuse(&data),
            Err(FusionError::RaggedRow { .. })
        ));
    }
}
