//! Point layers from `GeoJSON` feature collections.

use std::path::Path;

use geo::Geometry;
use geojson::Feature;
use urbanity_map_geography::numeric_property;
use urbanity_map_spatial::PointSample;

use crate::{IngestError, read_feature_collection};

/// Points read from one file.
#[derive(Debug, Clone, Default)]
pub struct PointLayer {
    /// One sample per point (multipoints are flattened).
    pub samples: Vec<PointSample>,
    /// Features skipped for missing or non-point geometry.
    pub skipped: u64,
    /// Points whose attribute was requested but unusable.
    pub missing_values: u64,
}

/// Reads point features, attaching `value_field` when given.
///
/// Attribute values may be JSON numbers or numeric strings with
/// thousands separators. A point whose attribute is missing keeps
/// `value: None` and is counted in [`PointLayer::missing_values`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a feature
/// collection.
pub fn read_points(path: &Path, value_field: Option<&str>) -> Result<PointLayer, IngestError> {
    let collection = read_feature_collection(path)?;
    let layer = points_from_features(&collection.features, value_field);

    log::info!(
        "Read {} points from {} ({} features skipped, {} without value)",
        layer.samples.len(),
        path.display(),
        layer.skipped,
        layer.missing_values
    );
    Ok(layer)
}

/// Converts point features to samples.
#[must_use]
pub fn points_from_features(features: &[Feature], value_field: Option<&str>) -> PointLayer {
    let mut layer = PointLayer::default();

    for feature in features {
        let Some(geometry) = feature
            .geometry
            .as_ref()
            .and_then(|g| Geometry::<f64>::try_from(g.value.clone()).ok())
        else {
            layer.skipped += 1;
            continue;
        };

        let coords: Vec<(f64, f64)> = match geometry {
            Geometry::Point(p) => vec![(p.x(), p.y())],
            Geometry::MultiPoint(mp) => mp.iter().map(|p| (p.x(), p.y())).collect(),
            _ => {
                layer.skipped += 1;
                continue;
            }
        };

        let value = value_field.and_then(|field| numeric_property(feature, field));
        if value_field.is_some() && value.is_none() {
            layer.missing_values += coords.len() as u64;
        }

        layer
            .samples
            .extend(coords.into_iter().map(|(lon, lat)| PointSample { lon, lat, value }));
    }

    layer
}
