#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scoring: turning raw per-region aggregates into comparable 0–100
//! scores and fusing them into the composite urbanity index.

pub mod fusion;
pub mod normalize;
pub mod remap;
pub mod summary;

use thiserror::Error;

pub use fusion::{FusionEngine, FusionOutcome, FusionReport};
pub use normalize::{NormalizedLayer, normalize, round1};
pub use remap::PiecewiseRemap;
pub use summary::{DistributionSummary, RankBand, RankedRegion, rank_bands, summarize};

/// Errors that can occur while fusing layers.
#[derive(Debug, Error)]
pub enum FusionError {
    /// No layers were configured.
    #[error("No layers to fuse")]
    NoLayers,

    /// The base layer is not one of the fused layers.
    #[error("Base layer {name:?} is not among the fused layers")]
    UnknownBaseLayer {
        /// Requested base layer.
        name: String,
    },

    /// A region row has the wrong number of layer values.
    #[error("Region {code} has {got} layer values, expected {expected}")]
    RaggedRow {
        /// Region code.
        code: String,
        /// Number of layers.
        expected: usize,
        /// Number of values supplied.
        got: usize,
    },

    /// Every region is zero in every layer.
    #[error("No region has a nonzero value in any layer")]
    NothingToFuse,

    /// Remap knots are unusable.
    #[error("Invalid remap: {message}")]
    InvalidRemap {
        /// Description of what went wrong.
        message: String,
    },
}
