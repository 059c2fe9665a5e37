#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Final per-region records and the artifacts written from them.
//!
//! [`ScoreStore`] joins the composite score, the normalized layer
//! breakdown and the auxiliary raw indicators by region code. The
//! [`persist`] module writes the code-keyed JSON document, the boundary
//! collection with the same fields attached to each feature, and the
//! run's side reports.

pub mod merge;
pub mod persist;

use thiserror::Error;

pub use merge::{AuxiliaryLayers, LayerScores, ScoreStore, lookup_with_fallback};
pub use persist::{read_scores, write_json, write_scored_geojson, write_scores};

/// Errors that can occur while persisting or reloading outputs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record did not serialize to a JSON object.
    #[error("Record for {code} is not a JSON object")]
    NotAnObject {
        /// Region code of the offending record.
        code: String,
    },
}
