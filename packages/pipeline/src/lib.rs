#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The urbanity index batch job.
//!
//! [`Pipeline::run`] loads the boundaries, aggregates each configured
//! layer onto them, normalizes and fuses the fused layers, merges the
//! auxiliary indicators and writes every artifact. Missing optional
//! layers and malformed records are logged, counted in the run's
//! [`Diagnostics`](urbanity_map_geography_models::Diagnostics) and
//! skipped; a missing boundary file or night-light raster aborts the run.

pub mod analysis;
pub mod config;
pub mod run;

use std::path::PathBuf;

use thiserror::Error;
use urbanity_map_geography::GeographyError;
use urbanity_map_ingest::IngestError;
use urbanity_map_scoring::FusionError;
use urbanity_map_store::StoreError;

pub use config::PipelineConfig;
pub use run::{Pipeline, RunSummary};

/// Name of the night-light layer, the default fusion base layer.
pub const NIGHT_LIGHT: &str = "night_light";

/// Name of the population layer.
pub const POPULATION: &str = "population";

/// Name of the POI density layer.
pub const POI: &str = "poi";

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A mandatory input is absent.
    #[error("Missing {layer} input: {path}")]
    MissingInput {
        /// Which input is missing.
        layer: String,
        /// Where it was expected.
        path: PathBuf,
    },

    /// The configuration file is invalid.
    #[error("Invalid config {path}: {source}")]
    Config {
        /// Config file path (empty for in-memory text).
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Boundary loading failed.
    #[error(transparent)]
    Geography(#[from] GeographyError),

    /// A layer could not be read.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Fusion failed.
    #[error(transparent)]
    Fusion(#[from] FusionError),

    /// Writing the outputs failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
