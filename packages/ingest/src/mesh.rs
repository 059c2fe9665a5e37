//! Population mesh cells from `GeoJSON` files.
//!
//! Mesh data is distributed as one file per map sheet, so the reader
//! accepts either a single file or a directory searched recursively for
//! `.geojson` / `.json` files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use geo::{Geometry, MultiPolygon};
use urbanity_map_geography::{SchemaResolver, numeric_property};
use urbanity_map_spatial::MeshCell;

use crate::progress::ProgressCallback;
use crate::{IngestError, read_feature_collection};

/// Count-field candidates for population mesh files, in priority order.
pub const DEFAULT_COUNT_FIELDS: [&str; 7] = [
    "PTN_2020", "PTN2020", "POP", "population", "PT0_2020", "PTN_2025", "PTN_2030",
];

/// Mesh cells read from one file or directory.
#[derive(Debug, Clone, Default)]
pub struct MeshLayer {
    /// All polygon cells, in file then feature order.
    pub cells: Vec<MeshCell>,
    /// Files skipped because no count field could be resolved.
    pub skipped_files: u64,
    /// Features skipped for non-polygon geometry.
    pub skipped_features: u64,
}

/// Reads mesh cells from `path`.
///
/// The count field is resolved per file: the first candidate present,
/// else the first numeric property. Files with neither are skipped with
/// a warning.
///
/// # Errors
///
/// * [`IngestError::NotFound`] if `path` does not exist
/// * any read or parse error of an individual file
pub fn read_mesh(
    path: &Path,
    resolver: &SchemaResolver,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<MeshLayer, IngestError> {
    let files = mesh_files(path)?;
    progress.set_total(files.len() as u64);

    let mut layer = MeshLayer::default();
    for file in &files {
        progress.set_message(file.display().to_string());
        read_mesh_file(file, resolver, &mut layer)?;
        progress.inc(1);
    }
    progress.finish(format!("{} mesh cells", layer.cells.len()));

    log::info!(
        "Read {} mesh cells from {} files ({} files skipped)",
        layer.cells.len(),
        files.len(),
        layer.skipped_files
    );
    Ok(layer)
}

fn read_mesh_file(
    path: &Path,
    resolver: &SchemaResolver,
    layer: &mut MeshLayer,
) -> Result<(), IngestError> {
    let collection = read_feature_collection(path)?;
    let Some(field) = resolver.resolve_numeric(&collection.features) else {
        log::warn!(
            "No count field in {} (tried {:?}); skipping",
            path.display(),
            resolver.candidates()
        );
        layer.skipped_files += 1;
        return Ok(());
    };
    log::debug!("{}: count field {field}", path.display());

    for feature in &collection.features {
        let polygon = feature
            .geometry
            .as_ref()
            .and_then(|g| Geometry::<f64>::try_from(g.value.clone()).ok())
            .and_then(|g| match g {
                Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
                Geometry::MultiPolygon(mp) => Some(mp),
                _ => None,
            });
        let Some(polygon) = polygon else {
            layer.skipped_features += 1;
            continue;
        };

        layer.cells.push(MeshCell {
            polygon,
            count: numeric_property(feature, &field),
        });
    }
    Ok(())
}

/// Lists mesh files under `path` in sorted order.
fn mesh_files(path: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound {
            path: path.display().to_string(),
        });
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    collect_mesh_files(path, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_mesh_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), IngestError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_mesh_files(&path, files)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext == "geojson" || ext == "json")
        {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;

    fn cell(x: f64, y: f64, props: &str) -> String {
        format!(
            r#"{{"type":"Feature","properties":{props},"geometry":{{"type":"Polygon","coordinates":[[[{x},{y}],[{x1},{y}],[{x1},{y1}],[{x},{y1}],[{x},{y}]]]}}}}"#,
            x1 = x + 0.01,
            y1 = y + 0.01,
        )
    }

    fn collection(features: &[String]) -> String {
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    #[test]
    fn reads_directory_with_per_file_fields() {
        let dir = std::env::temp_dir().join("urbanity_map_mesh_test");
        let nested = dir.join("5339");
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(
            dir.join("a.geojson"),
            collection(&[
                cell(139.70, 35.60, r#"{"MESH_ID":"1","PTN_2020":120}"#),
                cell(139.71, 35.60, r#"{"MESH_ID":"2","PTN_2020":null}"#),
            ]),
        )
        .unwrap();
        std::fs::write(
            nested.join("b.json"),
            collection(&[cell(139.72, 35.60, r#"{"MESH_ID":"3","TOTAL":45}"#)]),
        )
        .unwrap();
        std::fs::write(
            nested.join("c.geojson"),
            collection(&[cell(139.73, 35.60, r#"{"NAME":"x"}"#)]),
        )
        .unwrap();
        std::fs::write(nested.join("readme.txt"), "ignored").unwrap();

        let resolver = SchemaResolver::new(DEFAULT_COUNT_FIELDS);
        let layer = read_mesh(&dir, &resolver, &null_progress()).unwrap();

        let counts: Vec<Option<f64>> = layer.cells.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![Some(45.0), Some(120.0), None]);
        assert_eq!(layer.skipped_files, 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_path_is_an_error() {
        let resolver = SchemaResolver::new(DEFAULT_COUNT_FIELDS);
        let path = std::env::temp_dir().join("urbanity_map_no_such_mesh");
        assert!(matches!(
            read_mesh(&path, &resolver, &null_progress()),
            Err(IngestError::NotFound { .. })
        ));
    }
}
