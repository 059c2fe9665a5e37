//! Distribution summaries and rank bands for finished scores.

use std::fmt;

use serde::Serialize;

/// Percentiles reported by [`summarize`].
pub const PERCENTILES: [u8; 7] = [10, 25, 50, 75, 90, 95, 99];

/// Histogram bin width over the 0–100 score range.
pub const HISTOGRAM_BIN_WIDTH: u8 = 5;

/// One histogram bin, `[lower, upper)` except for the last, which
/// includes 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistogramBin {
    /// Inclusive lower edge.
    pub lower: u8,
    /// Upper edge.
    pub upper: u8,
    /// Scores in the bin.
    pub count: usize,
}

/// Descriptive statistics of a score distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// `(percentile, value)` pairs, linear interpolation.
    pub percentiles: Vec<(u8, f64)>,
    pub histogram: Vec<HistogramBin>,
}

/// Percentile of sorted data with linear interpolation between ranks.
///
/// # Panics
///
/// Panics if `sorted` is empty.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - rank.floor();
    (sorted[hi] - sorted[lo]).mul_add(frac, sorted[lo])
}

/// Histogram over `[0, 100]` in [`HISTOGRAM_BIN_WIDTH`]-point bins.
/// Values outside the range are not counted.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn histogram(values: &[f64]) -> Vec<HistogramBin> {
    let bins = usize::from(100 / HISTOGRAM_BIN_WIDTH);
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| {
            let lower = i as u8 * HISTOGRAM_BIN_WIDTH;
            HistogramBin {
                lower,
                upper: lower + HISTOGRAM_BIN_WIDTH,
                count: 0,
            }
        })
        .collect();

    for v in values {
        if !(0.0..=100.0).contains(v) {
            continue;
        }
        let i = ((v / f64::from(HISTOGRAM_BIN_WIDTH)).floor() as usize).min(bins - 1);
        out[i].count += 1;
    }
    out
}

/// Summarizes finite `values`; `None` if there are none.
#[must_use]
pub fn summarize(values: &[f64]) -> Option<DistributionSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some(DistributionSummary {
        count: sorted.len(),
        mean,
        median: percentile(&sorted, 50.0),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        std_dev: variance.sqrt(),
        percentiles: PERCENTILES
            .iter()
            .map(|p| (*p, percentile(&sorted, f64::from(*p))))
            .collect(),
        histogram: histogram(&sorted),
    })
}

impl fmt::Display for DistributionSummary {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "count:  {}", self.count)?;
        writeln!(f, "mean:   {:.2}", self.mean)?;
        writeln!(f, "median: {:.2}", self.median)?;
        writeln!(f, "min:    {:.2}", self.min)?;
        writeln!(f, "max:    {:.2}", self.max)?;
        writeln!(f, "std:    {:.2}", self.std_dev)?;

        writeln!(f, "\npercentiles")?;
        for (p, v) in &self.percentiles {
            writeln!(f, "  {p:>2}%: {v:.2}")?;
        }

        writeln!(f, "\n{:<10} | {:<5} | distribution", "range", "count")?;
        writeln!(f, "{}", "-".repeat(40))?;
        let peak = self.histogram.iter().map(|b| b.count).max().unwrap_or(0);
        for bin in &self.histogram {
            let bar = if peak == 0 {
                0
            } else {
                (bin.count as f64 * 50.0 / peak as f64) as usize
            };
            writeln!(
                f,
                "{:>3} - {:>3}  | {:>5} | {}",
                bin.lower,
                bin.upper,
                bin.count,
                "#".repeat(bar)
            )?;
        }
        Ok(())
    }
}

/// A named region and its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRegion {
    /// Display name.
    pub name: String,
    /// Composite score.
    pub score: f64,
}

/// Regions in one ten-point score band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankBand {
    /// Band level, 1 (0–10) to 10 (90–100).
    pub level: u8,
    /// Inclusive lower score.
    pub lower: u8,
    /// Upper score (exclusive except for the top band).
    pub upper: u8,
    /// Regions in the band.
    pub count: usize,
    /// Highest-scoring regions in the band, best first.
    pub top: Vec<RankedRegion>,
}

/// Groups regions into ten absolute score bands, highest band first.
///
/// A score of 100 belongs to the top band; negative scores to the bottom.
/// Ties keep input order.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rank_bands(mut regions: Vec<RankedRegion>, per_band: usize) -> Vec<RankBand> {
    regions.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut bands: Vec<RankBand> = (0..10u8)
        .rev()
        .map(|i| RankBand {
            level: i + 1,
            lower: i * 10,
            upper: (i + 1) * 10,
            count: 0,
            top: Vec::new(),
        })
        .collect();

    for region in regions {
        let index = (region.score / 10.0).floor().clamp(0.0, 9.0) as usize;
        let band = &mut bands[9 - index];
        band.count += 1;
        if band.top.len() < per_band {
            band.top.push(region);
        }
    }
    bands
}

impl fmt::Display for RankBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "level {} (score {}-{}): {} regions",
            self.level, self.lower, self.upper, self.count
        )?;
        for region in &self.top {
            writeln!(f, "  - {}: {}", region.name, region.score)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&sorted, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&sorted, 100.0) - 4.0).abs() < 1e-12);
        assert!((percentile(&sorted, 10.0) - 1.3).abs() < 1e-12);
    }

    #[test]
    fn histogram_includes_100_in_last_bin() {
        let bins = histogram(&[0.0, 4.9, 5.0, 99.9, 100.0, 101.0, -1.0]);
        assert_eq!(bins.len(), 20);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 1);
        assert_eq!(bins[19].count, 2);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 5);
    }

    #[test]
    fn summarizes_basic_statistics() {
        let s = summarize(&[0.0, 10.0, 20.0, 30.0, f64::NAN]).unwrap();
        assert_eq!(s.count, 4);
        assert!((s.mean - 15.0).abs() < 1e-12);
        assert!((s.median - 15.0).abs() < 1e-12);
        assert!((s.std_dev - 125.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(s.percentiles.len(), PERCENTILES.len());
        assert!(summarize(&[]).is_none());
        assert!(s.to_string().contains("median: 15.00"));
    }

    #[test]
    fn bands_are_absolute_and_capped() {
        let regions = vec![
            RankedRegion {
                name: "千代田区".to_string(),
                score: 100.0,
            },
            RankedRegion {
                name: "中央区".to_string(),
                score: 95.5,
            },
            RankedRegion {
                name: "港区".to_string(),
                score: 97.0,
            },
            RankedRegion {
                name: "檜原村".to_string(),
                score: 3.2,
            },
        ];
        let bands = rank_bands(regions, 2);

        assert_eq!(bands.len(), 10);
        assert_eq!(bands[0].level, 10);
        assert_eq!(bands[0].count, 3);
        let top: Vec<&str> = bands[0].top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(top, vec!["千代田区", "港区"]);
        assert_eq!(bands[9].level, 1);
        assert_eq!(bands[9].count, 1);
        assert!(bands[0].to_string().starts_with("level 10 (score 90-100): 3 regions"));
    }
}
