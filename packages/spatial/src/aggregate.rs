//! Zonal aggregation of raw samples onto regions.
//!
//! Three sample shapes are supported: points (optionally carrying a
//! numeric attribute), polygon mesh cells reduced to their centroid, and
//! raster cells. Region lookup runs in parallel; reduction runs in input
//! order so floating-point sums are reproducible.

use std::collections::BTreeMap;

use geo::{Centroid, MultiPolygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use urbanity_map_geography_models::RegionCode;

use crate::raster::Raster;
use crate::{Region, RegionIndex};

/// A raw point observation in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
    /// Attached attribute, if the source had a usable one.
    pub value: Option<f64>,
}

impl PointSample {
    /// A point with no attribute (counted, never summed).
    #[must_use]
    pub const fn at(lon: f64, lat: f64) -> Self {
        Self {
            lon,
            lat,
            value: None,
        }
    }

    fn has_valid_coordinates(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// A polygon mesh cell with its count attribute.
#[derive(Debug, Clone)]
pub struct MeshCell {
    /// Cell outline in WGS84 degrees.
    pub polygon: MultiPolygon<f64>,
    /// Count attribute (e.g. residents); missing counts contribute zero.
    pub count: Option<f64>,
}

/// How point samples are reduced per region.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PointReduction {
    /// Number of points inside the region.
    #[default]
    Count,
    /// Sum of the point attribute.
    Sum,
    /// Arithmetic mean of the point attribute.
    Mean,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// Per-region aggregate, for regions that received a value.
    pub values: BTreeMap<RegionCode, f64>,
    /// Samples assigned to a region.
    pub assigned: u64,
    /// Samples that fell outside every region.
    pub unassigned: u64,
    /// Samples skipped for bad coordinates or a missing attribute.
    pub invalid: u64,
}

/// Maps samples onto the regions of a [`RegionIndex`].
pub struct GeometryAggregator<'a> {
    index: RegionIndex<'a>,
}

impl<'a> GeometryAggregator<'a> {
    /// Builds the region index once for all aggregation passes.
    #[must_use]
    pub fn new(regions: &'a [Region]) -> Self {
        Self {
            index: RegionIndex::build(regions),
        }
    }

    /// The regions being aggregated onto.
    #[must_use]
    pub const fn regions(&self) -> &'a [Region] {
        self.index.regions()
    }

    /// Assigns each point to at most one region and reduces per region.
    ///
    /// For [`PointReduction::Sum`] and [`PointReduction::Mean`], points
    /// without an attribute are counted as invalid and a region that
    /// received no valid attribute gets no value at all.
    #[must_use]
    pub fn aggregate_points(
        &self,
        samples: &[PointSample],
        reduction: PointReduction,
    ) -> Aggregation {
        let located: Vec<Option<Option<usize>>> = samples
            .par_iter()
            .map(|s| {
                s.has_valid_coordinates()
                    .then(|| self.index.locate(s.lon, s.lat))
            })
            .collect();

        let mut sums: BTreeMap<usize, (f64, u64)> = BTreeMap::new();
        let mut out = Aggregation::default();

        for (sample, location) in samples.iter().zip(located) {
            let Some(location) = location else {
                out.invalid += 1;
                continue;
            };
            let Some(region) = location else {
                out.unassigned += 1;
                continue;
            };
            let contribution = match reduction {
                PointReduction::Count => 1.0,
                PointReduction::Sum | PointReduction::Mean => {
                    match sample.value.filter(|v| v.is_finite()) {
                        Some(v) => v,
                        None => {
                            out.invalid += 1;
                            continue;
                        }
                    }
                }
            };
            out.assigned += 1;

            let entry = sums.entry(region).or_insert((0.0, 0));
            entry.0 += contribution;
            entry.1 += 1;
        }

        let regions = self.regions();
        out.values = sums
            .into_iter()
            .map(|(i, (sum, n))| {
                #[allow(clippy::cast_precision_loss)]
                let value = match reduction {
                    PointReduction::Count | PointReduction::Sum => sum,
                    PointReduction::Mean => sum / n as f64,
                };
                (regions[i].code.clone(), value)
            })
            .collect();

        log::info!(
            "Aggregated {} points ({reduction}) onto {} regions ({} unassigned, {} invalid)",
            out.assigned,
            out.values.len(),
            out.unassigned,
            out.invalid
        );
        out
    }

    /// Reduces each mesh cell to its centroid and sums cell counts per
    /// containing region.
    #[must_use]
    pub fn aggregate_mesh(&self, cells: &[MeshCell]) -> Aggregation {
        let samples: Vec<PointSample> = cells
            .par_iter()
            .map(|cell| {
                cell.polygon.centroid().map_or(
                    PointSample {
                        lon: f64::NAN,
                        lat: f64::NAN,
                        value: None,
                    },
                    |c| PointSample {
                        lon: c.x(),
                        lat: c.y(),
                        value: Some(cell.count.filter(|v| v.is_finite()).unwrap_or(0.0)),
                    },
                )
            })
            .collect();

        self.aggregate_points(&samples, PointReduction::Sum)
    }

    /// Mean of valid raster cells strictly inside each region.
    ///
    /// Every region receives a value; regions with no valid cell get 0.
    #[must_use]
    pub fn zonal_mean(&self, raster: &Raster) -> Aggregation {
        let sums: Vec<_> = self
            .regions()
            .par_iter()
            .map(|region| raster.zonal_sum(&region.polygon))
            .collect();

        let mut out = Aggregation::default();
        let mut empty = 0u64;
        for (region, acc) in self.regions().iter().zip(sums) {
            out.assigned += acc.count;
            if acc.count == 0 {
                empty += 1;
            }
            out.values.insert(region.code.clone(), acc.mean_or_zero());
        }

        log::info!(
            "Zonal mean over {} regions from {} valid cells ({empty} regions without cells)",
            out.values.len(),
            out.assigned
        );
        out
    }

    /// Converts per-region totals into densities per square kilometre.
    ///
    /// Every region receives a value: regions absent from `totals` or with
    /// a non-positive area have density 0.
    #[must_use]
    pub fn density(&self, totals: &BTreeMap<RegionCode, f64>) -> BTreeMap<RegionCode, f64> {
        self.regions()
            .iter()
            .map(|region| {
                let total = totals.get(&region.code).copied().unwrap_or(0.0);
                let density = if region.area_km2 > 0.0 {
                    total / region.area_km2
                } else {
                    0.0
                };
                (region.code.clone(), density)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;
    use crate::raster::GeoTransform;
    use crate::test_support::square;

    fn two_regions() -> Vec<Region> {
        vec![
            square("13101", 139.0, 35.0, 1.0),
            square("13102", 140.0, 35.0, 1.0),
        ]
    }

    fn code(s: &str) -> RegionCode {
        RegionCode::parse(s).unwrap()
    }

    #[test]
    fn counts_points_and_drops_outsiders() {
        let regions = two_regions();
        let aggregator = GeometryAggregator::new(&regions);
        let samples = vec![
            PointSample::at(139.2, 35.2),
            PointSample::at(139.8, 35.8),
            PointSample::at(140.5, 35.5),
            PointSample::at(150.0, 35.5),
            PointSample::at(f64::NAN, 35.5),
        ];

        let agg = aggregator.aggregate_points(&samples, PointReduction::Count);
        assert_eq!(agg.values.get(&code("13101")), Some(&2.0));
        assert_eq!(agg.values.get(&code("13102")), Some(&1.0));
        assert_eq!(agg.assigned, 3);
        assert_eq!(agg.unassigned, 1);
        assert_eq!(agg.invalid, 1);
    }

    #[test]
    fn mean_skips_missing_attributes() {
        let regions = two_regions();
        let aggregator = GeometryAggregator::new(&regions);
        let samples = vec![
            PointSample {
                lon: 139.2,
                lat: 35.2,
                value: Some(100.0),
            },
            PointSample {
                lon: 139.3,
                lat: 35.3,
                value: Some(300.0),
            },
            PointSample {
                lon: 139.4,
                lat: 35.4,
                value: None,
            },
            PointSample {
                lon: 140.5,
                lat: 35.5,
                value: None,
            },
        ];

        let agg = aggregator.aggregate_points(&samples, PointReduction::Mean);
        assert_eq!(agg.values.get(&code("13101")), Some(&200.0));
        assert_eq!(agg.values.get(&code("13102")), None);
        assert_eq!(agg.invalid, 2);
        assert_eq!(agg.assigned, 2);
        assert_eq!(agg.assigned + agg.unassigned + agg.invalid, 4);
    }

    #[test]
    fn attributeless_point_is_counted_once() {
        let regions = two_regions();
        let aggregator = GeometryAggregator::new(&regions);
        let samples = vec![PointSample::at(139.5, 35.5)];

        let sum = aggregator.aggregate_points(&samples, PointReduction::Sum);
        assert_eq!((sum.assigned, sum.unassigned, sum.invalid), (0, 0, 1));
        assert!(sum.values.is_empty());

        let count = aggregator.aggregate_points(&samples, PointReduction::Count);
        assert_eq!((count.assigned, count.unassigned, count.invalid), (1, 0, 0));
    }

    #[test]
    fn mesh_cells_are_joined_by_centroid() {
        let regions = two_regions();
        let aggregator = GeometryAggregator::new(&regions);

        // This cell straddles the border, but its centroid is in 13102.
        let straddling = MultiPolygon(vec![polygon![
            (x: 139.9, y: 35.4),
            (x: 140.3, y: 35.4),
            (x: 140.3, y: 35.5),
            (x: 139.9, y: 35.5),
            (x: 139.9, y: 35.4),
        ]]);
        let inside = MultiPolygon(vec![polygon![
            (x: 139.1, y: 35.1),
            (x: 139.2, y: 35.1),
            (x: 139.2, y: 35.2),
            (x: 139.1, y: 35.2),
            (x: 139.1, y: 35.1),
        ]]);
        let cells = vec![
            MeshCell {
                polygon: straddling,
                count: Some(120.0),
            },
            MeshCell {
                polygon: inside.clone(),
                count: Some(30.0),
            },
            MeshCell {
                polygon: inside,
                count: None,
            },
        ];

        let agg = aggregator.aggregate_mesh(&cells);
        assert_eq!(agg.values.get(&code("13101")), Some(&30.0));
        assert_eq!(agg.values.get(&code("13102")), Some(&120.0));
        assert_eq!(agg.assigned, 3);
    }

    #[test]
    fn zonal_mean_gives_every_region_a_value() {
        let regions = two_regions();
        let aggregator = GeometryAggregator::new(&regions);
        // Covers only the western region.
        let raster = Raster::new(
            2,
            2,
            GeoTransform::new(139.0, 36.0, 0.5, -0.5),
            vec![10.0, 20.0, 30.0, -999.0],
            Some(-999.0),
        )
        .unwrap();

        let agg = aggregator.zonal_mean(&raster);
        assert_eq!(agg.values.get(&code("13101")), Some(&20.0));
        assert_eq!(agg.values.get(&code("13102")), Some(&0.0));
    }

    #[test]
    fn density_covers_all_regions() {
        let regions = two_regions();
        let aggregator = GeometryAggregator::new(&regions);
        let mut totals = BTreeMap::new();
        totals.insert(code("13101"), regions[0].area_km2 * 2.0);

        let density = aggregator.density(&totals);
        assert!((density[&code("13101")] - 2.0).abs() < 1e-9);
        assert!(density[&code("13102")].abs() < f64::EPSILON);
    }
}
