#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region, station and composite score types.
//!
//! These types are shared by every stage of the urbanity pipeline: the
//! canonical municipality code, weather stations, the per-region output
//! record, and the skip-and-continue diagnostics counters.

pub mod diagnostics;
pub mod prefecture;

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use diagnostics::{DiagnosticKind, Diagnostics};

/// Number of digits in a canonical municipality code.
pub const REGION_CODE_LEN: usize = 5;

/// A canonical five-digit, zero-padded municipality code (e.g. `"01101"`).
///
/// Serialized as a plain string so it can key JSON objects directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionCode(String);

/// Error returned when a raw value cannot be turned into a [`RegionCode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRegionCodeError {
    /// The rejected input.
    pub raw: String,
}

impl fmt::Display for InvalidRegionCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid region code: {:?}", self.raw)
    }
}

impl std::error::Error for InvalidRegionCodeError {}

impl RegionCode {
    /// Canonicalizes a raw code.
    ///
    /// Accepts short codes that lost their leading zero (`"1101"`),
    /// float renderings of integers (`"1101.0"`), six-digit codes that
    /// still carry the trailing check digit (`"011002"` becomes
    /// `"01100"`), and `code_name` labels (`"01101_札幌市中央区"`).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRegionCodeError`] if the input is empty, contains
    /// non-digit characters, or is longer than six digits.
    pub fn parse(raw: &str) -> Result<Self, InvalidRegionCodeError> {
        let invalid = || InvalidRegionCodeError {
            raw: raw.to_string(),
        };

        let mut code = raw.trim();
        if let Some((head, _)) = code.split_once('_') {
            code = head;
        }
        if let Some((int_part, frac)) = code.split_once('.') {
            if !frac.chars().all(|c| c == '0') {
                return Err(invalid());
            }
            code = int_part;
        }

        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        match code.len() {
            len if len < REGION_CODE_LEN => Ok(Self(format!("{code:0>5}"))),
            REGION_CODE_LEN => Ok(Self(code.to_string())),
            6 => Ok(Self(code[..REGION_CODE_LEN].to_string())),
            _ => Err(invalid()),
        }
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the two-digit prefecture part of the code.
    #[must_use]
    pub fn prefecture_code(&self) -> &str {
        &self.0[..2]
    }

    /// Returns the administrative-hierarchy lookup order for this code:
    /// the code itself, then the code with its last digit replaced by
    /// `0`, then with its last two digits replaced by `00`.
    ///
    /// Duplicates are removed, so `"01100"` yields just `["01100"]`.
    #[must_use]
    pub fn fallback_chain(&self) -> Vec<Self> {
        let base = &self.0;
        let candidates = [
            base.clone(),
            format!("{}0", &base[..REGION_CODE_LEN - 1]),
            format!("{}00", &base[..REGION_CODE_LEN - 2]),
        ];

        let mut chain: Vec<Self> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !chain.iter().any(|c| c.0 == candidate) {
                chain.push(Self(candidate));
            }
        }
        chain
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RegionCode {
    type Error = InvalidRegionCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RegionCode> for String {
    fn from(code: RegionCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for RegionCode {
    type Err = InvalidRegionCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A weather measurement type reported by stations.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Measurement {
    /// Highest daily maximum temperature (°C).
    MaxTemp,
    /// Deepest snow cover (cm).
    MaxSnow,
}

impl Measurement {
    /// All measurement types, in output order.
    pub const ALL: [Self; 2] = [Self::MaxTemp, Self::MaxSnow];
}

/// A weather station with its location and reduced readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station name as used by the measurement tables.
    pub name: String,
    /// Latitude (WGS84 degrees).
    pub lat: f64,
    /// Longitude (WGS84 degrees).
    pub lon: f64,
    /// Maximum temperature over the observation period.
    pub max_temp: Option<f64>,
    /// Maximum snow depth over the observation period.
    pub max_snow: Option<f64>,
}

impl Station {
    /// Returns this station's reading for `measurement`, if any.
    #[must_use]
    pub const fn reading(&self, measurement: Measurement) -> Option<f64> {
        match measurement {
            Measurement::MaxTemp => self.max_temp,
            Measurement::MaxSnow => self.max_snow,
        }
    }
}

/// Normalized per-layer scores plus the raw POI statistics they came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerBreakdown {
    /// Light pollution score (the night-light score, kept as its own field).
    pub light_pollution: f64,
    /// Night-light radiance score (0–100).
    pub night_light: f64,
    /// Population score (0–100).
    pub population: f64,
    /// POI density score (0–100).
    pub poi: f64,
    /// Number of POIs inside the region.
    pub poi_count: Option<u64>,
    /// POIs per square kilometre.
    pub poi_density: Option<f64>,
}

/// Raw indicators that are reported but not fused.
///
/// Every field is `None` when the source had no data for the region;
/// `Some(0.0)` is a real observed zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryIndicators {
    /// Resident population (sum of mesh counts).
    pub population_count: Option<u64>,
    /// Mean land price (yen per m²).
    pub land_price: Option<f64>,
    /// Mean taxable income per taxpayer (yen).
    pub avg_income: Option<f64>,
    /// Population growth rate (%).
    pub pop_growth: Option<f64>,
    /// Share of residents aged 65 and over (%).
    pub elderly_ratio: Option<f64>,
    /// Maximum temperature at the nearest reporting station (°C).
    pub max_temp: Option<f64>,
    /// Maximum snow depth at the nearest reporting station (cm).
    pub max_snow: Option<f64>,
}

/// The per-region output record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeRecord {
    /// Fused urbanity score (0–100).
    pub urbanity: f64,
    /// Normalized layer breakdown.
    #[serde(flatten)]
    pub layers: LayerBreakdown,
    /// Auxiliary raw indicators.
    #[serde(flatten)]
    pub auxiliary: AuxiliaryIndicators,
}
