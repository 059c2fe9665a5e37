//! Municipality boundary loading.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson};
use urbanity_map_geography_models::prefecture::{is_prefecture_code, prefecture_name};
use urbanity_map_geography_models::{DiagnosticKind, Diagnostics, RegionCode};
use urbanity_map_spatial::{EqualAreaProjection, Region};

use crate::GeographyError;
use crate::schema::{SchemaResolver, region_code_property};

/// Default region-code field candidates, in priority order.
pub const DEFAULT_CODE_FIELDS: [&str; 4] = ["N03_007", "code", "id", "JCODE"];

/// Default fields joined into a region's display name.
pub const DEFAULT_NAME_FIELDS: [&str; 3] = ["N03_001", "N03_003", "N03_004"];

/// How to interpret a boundary collection.
#[derive(Debug, Clone)]
pub struct BoundaryOptions {
    /// Region-code field candidates.
    pub code_fields: Vec<String>,
    /// Fields whose non-empty values are joined with spaces into the name.
    pub name_fields: Vec<String>,
    /// Projection used for areas and centroids.
    pub projection: EqualAreaProjection,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            code_fields: DEFAULT_CODE_FIELDS.iter().map(ToString::to_string).collect(),
            name_fields: DEFAULT_NAME_FIELDS.iter().map(ToString::to_string).collect(),
            projection: EqualAreaProjection::japan(),
        }
    }
}

/// Loaded boundaries: the source collection (kept for output) plus one
/// [`Region`] per distinct code, sorted by code.
#[derive(Debug, Clone)]
pub struct Boundaries {
    /// The collection as read from disk.
    pub collection: FeatureCollection,
    /// The resolved region-code field.
    pub code_field: String,
    /// One region per code, sorted by code.
    pub regions: Vec<Region>,
    /// Features skipped while building regions.
    pub diagnostics: Diagnostics,
}

/// Reads a `GeoJSON` feature collection from `path` and builds regions.
///
/// # Errors
///
/// * [`GeographyError::Io`] / [`GeographyError::GeoJson`] if the file
///   cannot be read or parsed
/// * [`GeographyError::NotFeatureCollection`] for other `GeoJSON` types
/// * [`GeographyError::SchemaNotFound`] if no code field is present
/// * [`GeographyError::NoRegions`] if no feature has a code and polygon
pub fn load_boundaries(
    path: &Path,
    options: &BoundaryOptions,
) -> Result<Boundaries, GeographyError> {
    let text = std::fs::read_to_string(path)?;
    let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
        return Err(GeographyError::NotFeatureCollection {
            path: path.display().to_string(),
        });
    };

    let boundaries = Boundaries::from_collection(collection, options)?;
    if boundaries.regions.is_empty() {
        return Err(GeographyError::NoRegions {
            path: path.display().to_string(),
        });
    }

    log::info!(
        "Loaded {} regions from {} features in {}",
        boundaries.regions.len(),
        boundaries.collection.features.len(),
        path.display()
    );
    Ok(boundaries)
}

impl Boundaries {
    /// Builds regions from an in-memory collection.
    ///
    /// Features sharing a code are merged into one multipolygon; the first
    /// feature with a non-empty name supplies the display name. Regions
    /// with no named feature fall back to the prefecture name and code.
    ///
    /// # Errors
    ///
    /// Returns [`GeographyError::SchemaNotFound`] if no code field
    /// candidate is present.
    pub fn from_collection(
        collection: FeatureCollection,
        options: &BoundaryOptions,
    ) -> Result<Self, GeographyError> {
        let code_field = SchemaResolver::new(options.code_fields.iter().cloned())
            .resolve(&collection)?;
        log::debug!("Using region code field {code_field}");

        let mut diagnostics = Diagnostics::new();
        let mut merged: BTreeMap<RegionCode, (MultiPolygon<f64>, Option<String>)> =
            BTreeMap::new();

        for feature in &collection.features {
            let Some(code) = region_code_property(feature, &code_field) else {
                diagnostics.record(DiagnosticKind::Parse, 1);
                continue;
            };
            let Some(polygons) = feature_polygons(feature) else {
                log::warn!("Boundary feature {code} has no polygon geometry; skipping");
                diagnostics.record(DiagnosticKind::InvalidBoundary, 1);
                continue;
            };

            let (polygon, name) = merged
                .entry(code)
                .or_insert_with(|| (MultiPolygon(Vec::new()), None));
            polygon.0.extend(polygons.0);
            if name.is_none() {
                *name = display_name(feature, &options.name_fields);
            }
        }

        if diagnostics.count(DiagnosticKind::Parse) > 0 {
            log::warn!(
                "{} boundary features had no usable {code_field}",
                diagnostics.count(DiagnosticKind::Parse)
            );
        }

        let regions = merged
            .into_iter()
            .map(|(code, (polygon, name))| {
                let name = name.or_else(|| fallback_name(&code));
                Region::new(code, name, polygon, &options.projection)
            })
            .collect();

        Ok(Self {
            collection,
            code_field,
            regions,
            diagnostics,
        })
    }

    /// Looks up a region by code.
    #[must_use]
    pub fn region(&self, code: &RegionCode) -> Option<&Region> {
        self.regions
            .binary_search_by(|r| r.code.cmp(code))
            .ok()
            .map(|i| &self.regions[i])
    }
}

fn feature_polygons(feature: &Feature) -> Option<MultiPolygon<f64>> {
    let geometry = feature.geometry.as_ref()?;
    match Geometry::<f64>::try_from(geometry.value.clone()).ok()? {
        Geometry::MultiPolygon(mp) => Some(mp),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

fn display_name(feature: &Feature, fields: &[String]) -> Option<String> {
    let props = feature.properties.as_ref()?;
    let parts: Vec<&str> = fields
        .iter()
        .filter_map(|f| props.get(f)?.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn fallback_name(code: &RegionCode) -> Option<String> {
    let prefecture = code.prefecture_code();
    is_prefecture_code(prefecture).then(|| format!("{} {code}", prefecture_name(prefecture)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"N03_001": "北海道", "N03_004": "中央区", "N03_007": "01101"},
             "geometry": {"type": "Polygon", "coordinates": [[[141.0,43.0],[141.1,43.0],[141.1,43.1],[141.0,43.1],[141.0,43.0]]]}},
            {"type": "Feature",
             "properties": {"N03_001": "北海道", "N03_004": "中央区", "N03_007": "01101"},
             "geometry": {"type": "Polygon", "coordinates": [[[141.2,43.0],[141.3,43.0],[141.3,43.1],[141.2,43.1],[141.2,43.0]]]}},
            {"type": "Feature",
             "properties": {"N03_001": "東京都", "N03_004": "千代田区", "N03_007": 13101},
             "geometry": {"type": "Polygon", "coordinates": [[[139.7,35.6],[139.8,35.6],[139.8,35.7],[139.7,35.7],[139.7,35.6]]]}},
            {"type": "Feature",
             "properties": {"N03_001": "所属未定地", "N03_007": null},
             "geometry": {"type": "Polygon", "coordinates": [[[139.0,35.0],[139.1,35.0],[139.1,35.1],[139.0,35.0]]]}},
            {"type": "Feature",
             "properties": {"N03_007": "13102"},
             "geometry": null}
        ]
    }"#;

    fn sample_collection() -> FeatureCollection {
        match SAMPLE.parse::<GeoJson>().unwrap() {
            GeoJson::FeatureCollection(fc) => fc,
            _ => panic!("not a feature collection"),
        }
    }

    #[test]
    fn merges_features_per_code() {
        let b = Boundaries::from_collection(sample_collection(), &BoundaryOptions::default())
            .unwrap();

        assert_eq!(b.code_field, "N03_007");
        let codes: Vec<&str> = b.regions.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["01101", "13101"]);

        let sapporo = &b.regions[0];
        assert_eq!(sapporo.polygon.0.len(), 2);
        assert_eq!(sapporo.name.as_deref(), Some("北海道 中央区"));
        assert!(sapporo.area_km2 > 0.0);

        assert_eq!(b.diagnostics.count(DiagnosticKind::Parse), 1);
        assert_eq!(b.diagnostics.count(DiagnosticKind::InvalidBoundary), 1);
    }

    #[test]
    fn looks_up_regions_by_code() {
        let b = Boundaries::from_collection(sample_collection(), &BoundaryOptions::default())
            .unwrap();
        let code = RegionCode::parse("13101").unwrap();
        assert_eq!(
            b.region(&code).and_then(|r| r.name.as_deref()),
            Some("東京都 千代田区")
        );
        assert!(b.region(&RegionCode::parse("99999").unwrap()).is_none());
    }

    #[test]
    fn unnamed_regions_fall_back_to_prefecture() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"code": "47201"},
             "geometry": {"type": "Polygon", "coordinates": [[[127.6,26.2],[127.7,26.2],[127.7,26.3],[127.6,26.2]]]}}
        ]}"#;
        let GeoJson::FeatureCollection(fc) = text.parse::<GeoJson>().unwrap() else {
            panic!("not a feature collection");
        };
        let b = Boundaries::from_collection(fc, &BoundaryOptions::default()).unwrap();
        assert_eq!(b.regions[0].name.as_deref(), Some("沖縄県 47201"));
    }

    #[test]
    fn loads_from_disk_and_rejects_non_collections() {
        let dir = std::env::temp_dir().join("urbanity_map_boundaries_test");
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("regions.geojson");
        std::fs::write(&good, SAMPLE).unwrap();
        let b = load_boundaries(&good, &BoundaryOptions::default()).unwrap();
        assert_eq!(b.regions.len(), 2);

        let bad = dir.join("point.geojson");
        std::fs::write(&bad, r#"{"type":"Point","coordinates":[139.0,35.0]}"#).unwrap();
        assert!(matches!(
            load_boundaries(&bad, &BoundaryOptions::default()),
            Err(GeographyError::NotFeatureCollection { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
