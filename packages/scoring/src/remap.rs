//! Fixed monotonic piecewise-linear remap of fused scores.

use serde::{Deserialize, Serialize};

use crate::FusionError;

/// Default knots: `[0,40]→[0,25]`, `[40,85]→[25,75]`, `[85,100]→[75,100]`.
pub const DEFAULT_KNOTS: [(f64, f64); 4] = [(0.0, 0.0), (40.0, 25.0), (85.0, 75.0), (100.0, 100.0)];

/// Piecewise-linear map through a list of `(input, output)` knots.
///
/// Inputs below the first knot or above the last are clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct PiecewiseRemap {
    knots: Vec<(f64, f64)>,
}

impl PiecewiseRemap {
    /// Creates a remap from knots.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::InvalidRemap`] unless there are at least two
    /// finite knots with strictly increasing inputs and non-decreasing
    /// outputs.
    pub fn new(knots: Vec<(f64, f64)>) -> Result<Self, FusionError> {
        if knots.len() < 2 {
            return Err(FusionError::InvalidRemap {
                message: "at least two knots are required".to_string(),
            });
        }
        if knots.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(FusionError::InvalidRemap {
                message: "knots must be finite".to_string(),
            });
        }
        for pair in knots.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            if x1 <= x0 || y1 < y0 {
                return Err(FusionError::InvalidRemap {
                    message: format!("knots ({x0}, {y0}) -> ({x1}, {y1}) are not monotonic"),
                });
            }
        }
        Ok(Self { knots })
    }

    /// The knots, in input order.
    #[must_use]
    pub fn knots(&self) -> &[(f64, f64)] {
        &self.knots
    }

    /// Maps `x` through the knots.
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        let (first_x, first_y) = self.knots[0];
        if x <= first_x {
            return first_y;
        }
        for pair in self.knots.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            if x <= x1 {
                return (x - x0).mul_add((y1 - y0) / (x1 - x0), y0);
            }
        }
        self.knots[self.knots.len() - 1].1
    }
}

impl Default for PiecewiseRemap {
    fn default() -> Self {
        Self {
            knots: DEFAULT_KNOTS.to_vec(),
        }
    }
}

impl TryFrom<Vec<(f64, f64)>> for PiecewiseRemap {
    type Error = FusionError;

    fn try_from(knots: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Self::new(knots)
    }
}

impl From<PiecewiseRemap> for Vec<(f64, f64)> {
    fn from(remap: PiecewiseRemap) -> Self {
        remap.knots
    }
}
