//! Point-of-interest extraction from OpenStreetMap PBF extracts.
//!
//! Only nodes and dense nodes are read. Shops and restaurants mapped as
//! building outlines (ways) are skipped; resolving their coordinates
//! would need a second pass over the node table.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use osmpbf::{Element, ElementReader};
use serde::Deserialize;
use urbanity_map_spatial::PointSample;

use crate::IngestError;

/// Tag filter: a node matches if any `key` carries one of its values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PoiFilter {
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl Default for PoiFilter {
    fn default() -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(
            "shop".to_string(),
            ["convenience", "supermarket"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        tags.insert(
            "amenity".to_string(),
            ["restaurant", "cafe", "fast_food", "bar", "pub", "izakaya"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        Self { tags }
    }
}

impl PoiFilter {
    /// Builds a filter from `(key, values)` pairs.
    #[must_use]
    pub fn new<K, V, I>(tags: impl IntoIterator<Item = (K, I)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = V>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|(k, vs)| (k.into(), vs.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Returns `true` if any tag matches the filter.
    pub fn matches<'a>(&self, mut tags: impl Iterator<Item = (&'a str, &'a str)>) -> bool {
        tags.any(|(key, value)| self.tags.get(key).is_some_and(|vs| vs.contains(value)))
    }
}

/// Reads all POI nodes matching `filter` from a PBF file.
///
/// Decoding runs on `osmpbf`'s parallel reader; blocks are merged in
/// file order.
///
/// # Errors
///
/// * [`IngestError::NotFound`] if the file does not exist
/// * [`IngestError::Osm`] if the file cannot be decoded
pub fn read_pois(path: &Path, filter: &PoiFilter) -> Result<Vec<PointSample>, IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound {
            path: path.display().to_string(),
        });
    }

    log::info!("Parsing OSM PBF: {}", path.display());

    let osm_error = |e: osmpbf::Error| IngestError::Osm {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let reader = ElementReader::from_path(path).map_err(osm_error)?;
    let pois = reader
        .par_map_reduce(
            |element| match element {
                Element::Node(node) => poi_sample(filter, node.tags(), node.lon(), node.lat())
                    .into_iter()
                    .collect(),
                Element::DenseNode(node) => {
                    poi_sample(filter, node.tags(), node.lon(), node.lat())
                        .into_iter()
                        .collect()
                }
                Element::Way(_) | Element::Relation(_) => Vec::new(),
            },
            Vec::new,
            |mut a, mut b| {
                a.append(&mut b);
                a
            },
        )
        .map_err(osm_error)?;

    log::info!("Extracted {} POIs from OSM PBF", pois.len());
    Ok(pois)
}

fn poi_sample<'a>(
    filter: &PoiFilter,
    tags: impl Iterator<Item = (&'a str, &'a str)>,
    lon: f64,
    lat: f64,
) -> Option<PointSample> {
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    filter
        .matches(tags)
        .then_some(PointSample::at(lon, lat))
}
