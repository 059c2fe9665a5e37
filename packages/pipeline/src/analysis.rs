//! Reports over finished outputs: score distribution and rank bands.

use std::collections::BTreeSet;
use std::path::Path;

use geojson::{FeatureCollection, JsonValue};
use urbanity_map_geography::numeric_property;
use urbanity_map_ingest::read_feature_collection;
use urbanity_map_scoring::{DistributionSummary, RankedRegion, summarize};
use urbanity_map_store::read_scores;

use crate::PipelineError;

/// Property holding the composite score in the scored collection.
pub const SCORE_FIELD: &str = "urbanity";

fn require_file(path: &Path, what: &str) -> Result<(), PipelineError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput {
            layer: what.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Summarizes the composite scores in a score document.
///
/// # Errors
///
/// * [`PipelineError::MissingInput`] if `path` does not exist
/// * [`PipelineError::Store`] if it cannot be parsed
pub fn analyze_scores(path: &Path) -> Result<Option<DistributionSummary>, PipelineError> {
    require_file(path, "scores")?;
    let store = read_scores(path)?;
    log::info!("Read {} records from {}", store.len(), path.display());
    Ok(summarize(&store.urbanity_values()))
}

/// Named scores from a scored collection.
///
/// The name joins the non-empty `name_fields` with spaces, so
/// prefecture, county and municipality fields read as one qualified
/// name. Features without a score are skipped, and repeated
/// `(name, score)` pairs from multi-part regions are kept once.
#[must_use]
pub fn ranked_regions(
    collection: &FeatureCollection,
    name_fields: &[String],
    score_field: &str,
) -> Vec<RankedRegion> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    for feature in &collection.features {
        let Some(score) = numeric_property(feature, score_field) else {
            continue;
        };
        let name = feature
            .properties
            .as_ref()
            .map(|props| {
                name_fields
                    .iter()
                    .filter_map(|field| match props.get(field) {
                        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        if seen.insert((name.clone(), score.to_bits())) {
            out.push(RankedRegion { name, score });
        }
    }
    out
}

/// Reads a scored collection and extracts [`ranked_regions`].
///
/// # Errors
///
/// * [`PipelineError::MissingInput`] if `path` does not exist
/// * [`PipelineError::Ingest`] if it is not a feature collection
pub fn read_ranked_regions(
    path: &Path,
    name_fields: &[String],
    score_field: &str,
) -> Result<Vec<RankedRegion>, PipelineError> {
    require_file(path, "scored regions")?;
    let collection = read_feature_collection(path)?;
    let regions = ranked_regions(&collection, name_fields, score_field);
    log::info!(
        "{} scored regions among {} features",
        regions.len(),
        collection.features.len()
    );
    Ok(regions)
}
