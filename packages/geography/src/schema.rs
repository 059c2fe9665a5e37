//! Field discovery over loosely-typed feature properties.
//!
//! Boundary and mesh files from different vintages name the same column
//! differently (`N03_007` vs `code`, `PTN_2020` vs `POP`). The resolver
//! walks an explicit, ordered candidate list against the union of
//! property keys.

use std::collections::BTreeSet;

use geojson::{Feature, FeatureCollection};
use serde_json::Value;
use urbanity_map_geography_models::RegionCode;

use crate::GeographyError;

/// Resolves a field name from a prioritized candidate list.
#[derive(Debug, Clone)]
pub struct SchemaResolver {
    candidates: Vec<String>,
}

impl SchemaResolver {
    #[must_use]
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// The candidate list, in priority order.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Returns the first candidate present in `keys`.
    #[must_use]
    pub fn pick(&self, keys: &BTreeSet<String>) -> Option<&str> {
        self.candidates
            .iter()
            .find(|c| keys.contains(c.as_str()))
            .map(String::as_str)
    }

    /// Returns the first candidate present in the collection's schema.
    ///
    /// # Errors
    ///
    /// Returns [`GeographyError::SchemaNotFound`] if no candidate is present.
    pub fn resolve(&self, collection: &FeatureCollection) -> Result<String, GeographyError> {
        let keys = schema_keys(&collection.features);
        self.pick(&keys)
            .map(ToString::to_string)
            .ok_or_else(|| GeographyError::SchemaNotFound {
                candidates: self.candidates.clone(),
            })
    }

    /// Like [`Self::resolve`], but falls back to the first property (in
    /// key order) that holds a numeric value in any feature.
    #[must_use]
    pub fn resolve_numeric(&self, features: &[Feature]) -> Option<String> {
        let keys = schema_keys(features);
        if let Some(found) = self.pick(&keys) {
            return Some(found.to_string());
        }

        let fallback = keys.into_iter().find(|key| {
            features
                .iter()
                .filter_map(|f| f.properties.as_ref()?.get(key))
                .any(|v| v.is_number())
        })?;
        log::debug!(
            "No candidate of {:?} present; using numeric field {fallback}",
            self.candidates
        );
        Some(fallback)
    }
}

/// Union of property keys across all features.
#[must_use]
pub fn schema_keys(features: &[Feature]) -> BTreeSet<String> {
    features
        .iter()
        .filter_map(|f| f.properties.as_ref())
        .flat_map(|props| props.keys().cloned())
        .collect()
}

/// Reads a numeric property, accepting JSON numbers and numeric strings
/// with thousands separators.
#[must_use]
pub fn numeric_property(feature: &Feature, field: &str) -> Option<f64> {
    let value = feature.properties.as_ref()?.get(field)?;
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Reads a region code property, accepting strings and integral numbers.
#[must_use]
pub fn region_code_property(feature: &Feature, field: &str) -> Option<RegionCode> {
    let value = feature.properties.as_ref()?.get(field)?;
    match value {
        Value::String(s) => RegionCode::parse(s).ok(),
        Value::Number(n) => n
            .as_u64()
            .map(|u| u.to_string())
            .or_else(|| n.as_f64().map(|f| f.to_string()))
            .and_then(|s| RegionCode::parse(&s).ok()),
        _ => None,
    }
}
