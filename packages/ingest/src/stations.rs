//! Weather station metadata and measurement tables.
//!
//! Station locations and readings come from separate files that only
//! share the station name. Metadata files overlap (a station can appear
//! in several master lists), so later files win. Measurement names in the
//! readings often carry a bracketed qualifier (`東京（東京）`) absent from
//! the metadata; matching retries with the qualifier stripped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use urbanity_map_geography_models::{Measurement, Station};

use crate::IngestError;
use crate::tables::parse_number;

/// How a coordinate is stored in a metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CoordinateColumns {
    /// Decimal degrees in one column.
    Decimal {
        /// Column header.
        column: String,
    },
    /// Whole degrees and decimal minutes in two columns.
    DegreeMinute {
        /// Degrees column header.
        degrees: String,
        /// Minutes column header.
        minutes: String,
    },
}

/// Column layout of a station metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataColumns {
    /// Station name column.
    pub name: String,
    /// Latitude column(s).
    pub lat: CoordinateColumns,
    /// Longitude column(s).
    pub lon: CoordinateColumns,
}

impl Default for MetadataColumns {
    fn default() -> Self {
        Self {
            name: "name".to_string(),
            lat: CoordinateColumns::Decimal {
                column: "lat".to_string(),
            },
            lon: CoordinateColumns::Decimal {
                column: "lon".to_string(),
            },
        }
    }
}

/// Column layout of a long-format measurement file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MeasurementColumns {
    /// Station name column.
    pub station: String,
    /// Element (measurement type) column.
    pub element: String,
    /// Reading column.
    pub value: String,
    /// Element labels per measurement; an element matches if it contains
    /// any label.
    pub labels: BTreeMap<Measurement, Vec<String>>,
}

impl Default for MeasurementColumns {
    fn default() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            Measurement::MaxTemp,
            vec!["最高気温".to_string(), "max_temp".to_string()],
        );
        labels.insert(
            Measurement::MaxSnow,
            vec!["最深積雪".to_string(), "max_snow".to_string()],
        );
        Self {
            station: "station".to_string(),
            element: "element".to_string(),
            value: "value".to_string(),
            labels,
        }
    }
}

impl MeasurementColumns {
    fn classify(&self, element: &str) -> Option<Measurement> {
        self.labels
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| element.contains(l.as_str())))
            .map(|(m, _)| *m)
    }
}

/// A station location from a metadata file.
#[derive(Debug, Clone, PartialEq)]
pub struct StationLocation {
    /// Station name.
    pub name: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

/// Maximum reading per station name and measurement.
pub type StationReadings = BTreeMap<String, BTreeMap<Measurement, f64>>;

/// Stations joined from metadata and readings.
#[derive(Debug, Clone, Default)]
pub struct StationSet {
    /// Stations with a location and at least one reading, ordered by
    /// first appearance in the metadata.
    pub stations: Vec<Station>,
    /// Reading stations with no metadata entry.
    pub unmatched: Vec<String>,
    /// Stations dropped by the exclusion list.
    pub excluded: u64,
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, IngestError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| IngestError::Csv {
            path: path.display().to_string(),
            source,
        })
}

fn column_index(
    headers: &csv::StringRecord,
    path: &Path,
    name: &str,
) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == name)
        .ok_or_else(|| IngestError::MissingColumn {
            path: path.display().to_string(),
            column: name.to_string(),
        })
}

enum CoordinateIndex {
    Decimal(usize),
    DegreeMinute(usize, usize),
}

impl CoordinateIndex {
    fn resolve(
        columns: &CoordinateColumns,
        headers: &csv::StringRecord,
        path: &Path,
    ) -> Result<Self, IngestError> {
        Ok(match columns {
            CoordinateColumns::Decimal { column } => {
                Self::Decimal(column_index(headers, path, column)?)
            }
            CoordinateColumns::DegreeMinute { degrees, minutes } => Self::DegreeMinute(
                column_index(headers, path, degrees)?,
                column_index(headers, path, minutes)?,
            ),
        })
    }

    fn read(&self, row: &csv::StringRecord) -> Option<f64> {
        match *self {
            Self::Decimal(i) => parse_number(row.get(i)?),
            Self::DegreeMinute(d, m) => {
                let degrees = parse_number(row.get(d)?)?;
                let minutes = parse_number(row.get(m)?)?;
                Some(minutes.mul_add(1.0 / 60.0, degrees))
            }
        }
    }
}

/// Reads station locations from several metadata files.
///
/// Rows with a blank name or non-positive coordinates are skipped.
/// A name seen again replaces the earlier location but keeps the
/// earlier position in the output order.
///
/// # Errors
///
/// Returns an error if a file cannot be read or lacks a configured column.
pub fn read_station_metadata(
    paths: &[impl AsRef<Path>],
    columns: &MetadataColumns,
) -> Result<(Vec<StationLocation>, u64), IngestError> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: BTreeMap<String, StationLocation> = BTreeMap::new();
    let mut skipped = 0u64;

    for path in paths {
        let path = path.as_ref();
        let mut reader = csv_reader(path)?;
        let headers = reader
            .headers()
            .map_err(|source| IngestError::Csv {
                path: path.display().to_string(),
                source,
            })?
            .clone();
        let name_idx = column_index(&headers, path, &columns.name)?;
        let lat_idx = CoordinateIndex::resolve(&columns.lat, &headers, path)?;
        let lon_idx = CoordinateIndex::resolve(&columns.lon, &headers, path)?;

        for row in reader.records() {
            let Ok(row) = row else {
                skipped += 1;
                continue;
            };
            let name = row.get(name_idx).unwrap_or_default().trim();
            let (Some(lat), Some(lon)) = (lat_idx.read(&row), lon_idx.read(&row)) else {
                skipped += 1;
                continue;
            };
            if name.is_empty() || lat <= 0.0 || lon <= 0.0 {
                skipped += 1;
                continue;
            }

            let location = StationLocation {
                name: name.to_string(),
                lat,
                lon,
            };
            if by_name.insert(name.to_string(), location).is_none() {
                order.push(name.to_string());
            }
        }
    }

    let locations: Vec<StationLocation> = order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect();
    log::info!(
        "Read {} station locations from {} files ({skipped} rows skipped)",
        locations.len(),
        paths.len()
    );
    Ok((locations, skipped))
}

/// Reads long-format measurement files, keeping the maximum reading per
/// station and measurement.
///
/// Rows with an unrecognized element are ignored; rows with a
/// non-numeric reading are counted.
///
/// # Errors
///
/// Returns an error if a file cannot be read or lacks a configured column.
pub fn read_station_readings(
    paths: &[impl AsRef<Path>],
    columns: &MeasurementColumns,
) -> Result<(StationReadings, u64), IngestError> {
    let mut readings = StationReadings::new();
    let mut parse_errors = 0u64;

    for path in paths {
        let path = path.as_ref();
        let mut reader = csv_reader(path)?;
        let headers = reader
            .headers()
            .map_err(|source| IngestError::Csv {
                path: path.display().to_string(),
                source,
            })?
            .clone();
        let station_idx = column_index(&headers, path, &columns.station)?;
        let element_idx = column_index(&headers, path, &columns.element)?;
        let value_idx = column_index(&headers, path, &columns.value)?;

        for row in reader.records() {
            let Ok(row) = row else {
                parse_errors += 1;
                continue;
            };
            let station = row.get(station_idx).unwrap_or_default();
            let Some(measurement) = row.get(element_idx).and_then(|e| columns.classify(e)) else {
                continue;
            };
            let Some(value) = row.get(value_idx).and_then(parse_number) else {
                parse_errors += 1;
                continue;
            };
            if station.is_empty() {
                parse_errors += 1;
                continue;
            }

            readings
                .entry(station.to_string())
                .or_default()
                .entry(measurement)
                .and_modify(|max| *max = max.max(value))
                .or_insert(value);
        }
    }

    log::info!(
        "Read readings for {} stations ({parse_errors} unparsable values)",
        readings.len()
    );
    Ok((readings, parse_errors))
}

/// Strips a trailing bracketed qualifier: `東京（東京）` becomes `東京`.
#[must_use]
pub fn strip_qualifier(name: &str) -> &str {
    name.find(['(', '（']).map_or(name, |i| name[..i].trim_end())
}

/// Joins readings to locations by name.
///
/// A reading station matches a location by exact name, then by name with
/// its bracketed qualifier stripped. Stations named in `exclude` are
/// dropped. When several reading names resolve to the same location,
/// their maxima are combined.
#[must_use]
pub fn join_stations(
    locations: &[StationLocation],
    readings: &StationReadings,
    exclude: &BTreeSet<String>,
) -> StationSet {
    let index: BTreeMap<&str, usize> = locations
        .iter()
        .enumerate()
        .map(|(i, l)| (l.name.as_str(), i))
        .collect();

    let mut merged: BTreeMap<usize, BTreeMap<Measurement, f64>> = BTreeMap::new();
    let mut set = StationSet::default();

    for (name, values) in readings {
        let found = index
            .get(name.as_str())
            .or_else(|| index.get(strip_qualifier(name)))
            .copied();
        let Some(i) = found else {
            set.unmatched.push(name.clone());
            continue;
        };
        let entry = merged.entry(i).or_default();
        for (measurement, value) in values {
            entry
                .entry(*measurement)
                .and_modify(|max| *max = max.max(*value))
                .or_insert(*value);
        }
    }

    for (i, values) in merged {
        let location = &locations[i];
        if exclude.contains(&location.name) {
            set.excluded += 1;
            continue;
        }
        set.stations.push(Station {
            name: location.name.clone(),
            lat: location.lat,
            lon: location.lon,
            max_temp: values.get(&Measurement::MaxTemp).copied(),
            max_snow: values.get(&Measurement::MaxSnow).copied(),
        });
    }

    if !set.unmatched.is_empty() {
        log::warn!(
            "{} stations have readings but no location: {}",
            set.unmatched.len(),
            set.unmatched.join(", ")
        );
    }
    log::info!(
        "Joined {} stations ({} excluded)",
        set.stations.len(),
        set.excluded
    );
    set
}
