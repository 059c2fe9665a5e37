#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Readers for the raw layers that feed the urbanity pipeline.
//!
//! Every reader turns one source format into the sample types of
//! `urbanity_map_spatial` (points, mesh cells, rasters) or into
//! code-keyed values, counting the records it had to skip.

pub mod cache;
pub mod mesh;
pub mod osm;
pub mod points;
pub mod progress;
pub mod raster;
pub mod stations;
pub mod tables;

use std::path::Path;

use geojson::{FeatureCollection, GeoJson};
use thiserror::Error;

/// Errors that can occur while reading raw layers.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required input file or directory does not exist.
    #[error("Input not found: {path}")]
    NotFound {
        /// Path that was looked up.
        path: String,
    },

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// A configured column is missing from a table header.
    #[error("Column {column:?} not found in {path}")]
    MissingColumn {
        /// Path to the table.
        path: String,
        /// Missing column name.
        column: String,
    },

    /// `GeoJSON` parsing error.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document is valid `GeoJSON` but not a feature collection.
    #[error("Expected a GeoJSON FeatureCollection in {path}")]
    NotFeatureCollection {
        /// Path to the file.
        path: String,
    },

    /// OSM PBF decoding error.
    #[error("OSM PBF parse error in {path}: {message}")]
    Osm {
        /// Path to the PBF file.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// TIFF decoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The raster decoded but is unusable.
    #[error("Invalid raster {path}: {message}")]
    InvalidRaster {
        /// Path to the raster.
        path: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Sample cache encoding failed.
    #[error("Cache encode error: {0}")]
    CacheEncode(#[from] rmp_serde::encode::Error),

    /// Sample cache decoding failed.
    #[error("Cache decode error: {0}")]
    CacheDecode(#[from] rmp_serde::decode::Error),

    /// Sample cache columns have different lengths.
    #[error("Corrupt sample cache: {path}")]
    CorruptCache {
        /// Path to the cache file.
        path: String,
    },
}

/// Reads a `GeoJSON` feature collection from disk.
///
/// # Errors
///
/// * [`IngestError::NotFound`] if the file does not exist
/// * [`IngestError::GeoJson`] if it cannot be parsed
/// * [`IngestError::NotFeatureCollection`] for other `GeoJSON` types
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection, IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound {
            path: path.display().to_string(),
        });
    }
    match std::fs::read_to_string(path)?.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(IngestError::NotFeatureCollection {
            path: path.display().to_string(),
        }),
    }
}
