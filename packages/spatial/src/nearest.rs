//! Nearest-station join.
//!
//! Weather stations are far sparser than municipalities, so a region takes
//! the reading of the closest station (centroid to station, in projected
//! metres) that actually reports the measurement. Each measurement type is
//! matched independently against its own set of reporting stations.

use std::collections::BTreeMap;

use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::Serialize;
use urbanity_map_geography_models::{Measurement, RegionCode, Station};

use crate::{EqualAreaProjection, Region};

type StationPoint = GeomWithData<[f64; 2], usize>;

/// The station chosen for one region and measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestAssignment {
    /// Index of the station in the slice passed to the matcher.
    pub station: usize,
    /// The station's reading.
    pub value: f64,
    /// Centroid-to-station distance in metres.
    pub distance_m: f64,
}

/// Assigns each region the reading of its nearest reporting station.
pub struct NearestMatcher<'a> {
    stations: &'a [Station],
    projection: EqualAreaProjection,
}

impl<'a> NearestMatcher<'a> {
    #[must_use]
    pub const fn new(stations: &'a [Station], projection: EqualAreaProjection) -> Self {
        Self {
            stations,
            projection,
        }
    }

    /// Matches every region with a centroid against the stations that
    /// report `measurement`.
    ///
    /// Ties on distance go to the station listed first. If no station
    /// reports the measurement, the result is empty.
    #[must_use]
    pub fn assign(
        &self,
        regions: &[Region],
        measurement: Measurement,
    ) -> BTreeMap<RegionCode, NearestAssignment> {
        let points: Vec<StationPoint> = self
            .stations
            .iter()
            .enumerate()
            .filter(|(_, s)| s.reading(measurement).is_some_and(f64::is_finite))
            .map(|(i, s)| {
                let p = self.projection.project_point(s.lon, s.lat);
                GeomWithData::new([p.x(), p.y()], i)
            })
            .collect();

        if points.is_empty() {
            log::warn!("No station reports {measurement}; skipping nearest join");
            return BTreeMap::new();
        }

        let tree = RTree::bulk_load(points);
        let mut out = BTreeMap::new();

        for region in regions {
            let Some(centroid) = region.centroid else {
                continue;
            };
            let Some((station, distance_2)) = nearest_lowest_index(&tree, [centroid.x(), centroid.y()])
            else {
                continue;
            };
            let Some(value) = self.stations[station].reading(measurement) else {
                continue;
            };
            out.insert(
                region.code.clone(),
                NearestAssignment {
                    station,
                    value,
                    distance_m: distance_2.sqrt(),
                },
            );
        }

        log::info!(
            "Matched {} regions to {} stations for {measurement}",
            out.len(),
            tree.size()
        );
        out
    }
}

/// Nearest station index and squared distance, breaking distance ties by
/// the lowest station index.
fn nearest_lowest_index(tree: &RTree<StationPoint>, query: [f64; 2]) -> Option<(usize, f64)> {
    let mut iter = tree.nearest_neighbor_iter_with_distance_2(&query);
    let (first, best) = iter.next()?;
    let mut station = first.data;

    #[allow(clippy::float_cmp)]
    for (candidate, d2) in iter.take_while(|(_, d2)| *d2 == best) {
        station = station.min(candidate.data);
    }
    Some((station, best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::square;

    fn station(name: &str, lon: f64, lat: f64, temp: Option<f64>, snow: Option<f64>) -> Station {
        Station {
            name: name.to_string(),
            lat,
            lon,
            max_temp: temp,
            max_snow: snow,
        }
    }

    #[test]
    fn picks_closest_reporting_station_per_measurement() {
        let regions = vec![
            square("01101", 141.0, 43.0, 0.2),
            square("47201", 127.6, 26.1, 0.2),
        ];
        let stations = vec![
            station("札幌", 141.1, 43.1, Some(33.1), Some(120.0)),
            station("那覇", 127.7, 26.2, Some(35.0), None),
        ];
        let matcher = NearestMatcher::new(&stations, EqualAreaProjection::japan());

        let temp = matcher.assign(&regions, Measurement::MaxTemp);
        let naha = RegionCode::parse("47201").unwrap();
        assert_eq!(temp[&naha].station, 1);
        assert!((temp[&naha].value - 35.0).abs() < f64::EPSILON);
        assert!(temp[&naha].distance_m < 5_000.0);

        // Only Sapporo reports snow, so Naha falls back to it.
        let snow = matcher.assign(&regions, Measurement::MaxSnow);
        assert_eq!(snow[&naha].station, 0);
        assert!(snow[&naha].distance_m > 1_000_000.0);
    }

    #[test]
    fn equidistant_stations_prefer_lower_index() {
        let regions = vec![square("13101", 139.0, 35.0, 0.2)];
        let centre = regions[0].centroid.unwrap();
        let projection = EqualAreaProjection::japan();

        // Two stations with identical coordinates.
        let stations = vec![
            station("A", 139.5, 35.1, Some(30.0), None),
            station("B", 139.5, 35.1, Some(31.0), None),
        ];
        let matcher = NearestMatcher::new(&stations, projection);
        let temp = matcher.assign(&regions, Measurement::MaxTemp);

        let code = RegionCode::parse("13101").unwrap();
        assert_eq!(temp[&code].station, 0);
        let p = projection.project_point(139.5, 35.1);
        let expected = (p.x() - centre.x()).hypot(p.y() - centre.y());
        assert!((temp[&code].distance_m - expected).abs() < 1e-6);
    }

    #[test]
    fn no_reporting_station_yields_nothing() {
        let regions = vec![square("13101", 139.0, 35.0, 0.2)];
        let stations = vec![station("A", 139.5, 35.1, None, None)];
        let matcher = NearestMatcher::new(&stations, EqualAreaProjection::japan());
        assert!(matcher.assign(&regions, Measurement::MaxSnow).is_empty());
    }
}
