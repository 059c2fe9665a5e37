#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial joins for region attribution.
//!
//! Builds an R-tree over the administrative region polygons and maps raw
//! samples onto them: point-in-polygon for point clouds and mesh
//! centroids, cell-centre zonal statistics for rasters, and a
//! nearest-neighbour join for sparse weather stations. Areas and
//! distances are measured in an equal-area planar projection.

pub mod aggregate;
pub mod index;
pub mod nearest;
pub mod projection;
pub mod raster;

use geo::{Area, Centroid, MultiPolygon, Point};
use thiserror::Error;
use urbanity_map_geography_models::RegionCode;

pub use aggregate::{Aggregation, GeometryAggregator, MeshCell, PointReduction, PointSample};
pub use index::RegionIndex;
pub use nearest::{NearestAssignment, NearestMatcher};
pub use projection::EqualAreaProjection;
pub use raster::{GeoTransform, Raster};

/// Errors that can occur while building spatial inputs.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// Raster dimensions and data do not agree.
    #[error("Invalid raster: {message}")]
    InvalidRaster {
        /// Description of what went wrong.
        message: String,
    },
}

/// An administrative region: code, geographic outline and derived
/// planar measurements.
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Region {
    /// Canonical municipality code.
    pub code: RegionCode,
    /// Display name, if the boundary file carries one.
    pub name: Option<String>,
    /// Outline in WGS84 longitude/latitude.
    pub polygon: MultiPolygon<f64>,
    /// Area in square kilometres, measured in the equal-area projection.
    pub area_km2: f64,
    /// Centroid in projected metres (`None` for empty geometry).
    pub centroid: Option<Point<f64>>,
}

impl Region {
    /// Builds a region and derives its area and centroid in `projection`.
    #[must_use]
    pub fn new(
        code: RegionCode,
        name: Option<String>,
        polygon: MultiPolygon<f64>,
        projection: &EqualAreaProjection,
    ) -> Self {
        let projected = projection.project(&polygon);
        let area_km2 = projected.unsigned_area() / 1_000_000.0;
        let centroid = projected.centroid();

        Self {
            code,
            name,
            polygon,
            area_km2,
            centroid,
        }
    }
}
