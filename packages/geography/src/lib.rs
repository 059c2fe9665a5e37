#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative boundary loading.
//!
//! Reads municipality polygons from a `GeoJSON` feature collection,
//! resolves which property holds the region code, and builds one
//! [`urbanity_map_spatial::Region`] per code with its equal-area
//! measurements.

pub mod boundaries;
pub mod schema;

use thiserror::Error;

pub use boundaries::{Boundaries, BoundaryOptions, load_boundaries};
pub use schema::{SchemaResolver, numeric_property, region_code_property};

/// Errors that can occur while loading boundaries or resolving schemas.
#[derive(Debug, Error)]
pub enum GeographyError {
    /// Reading a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document parsed, but is not a feature collection.
    #[error("Expected a GeoJSON FeatureCollection in {path}")]
    NotFeatureCollection {
        /// File that was read.
        path: String,
    },

    /// None of the candidate fields exist in the collection's schema.
    #[error("None of the candidate fields {candidates:?} found in schema")]
    SchemaNotFound {
        /// The candidates that were tried, in priority order.
        candidates: Vec<String>,
    },

    /// No feature produced a usable region.
    #[error("No usable regions in {path}")]
    NoRegions {
        /// File that was read.
        path: String,
    },
}
