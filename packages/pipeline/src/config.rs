//! TOML run configuration.
//!
//! Every input path is resolved against the directory of the config
//! file, so a config can sit next to its data. Only `boundaries` and
//! `night_light` are required; every other layer section may be left
//! out, in which case that layer is reported as missing and the run
//! continues without it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use urbanity_map_geography::boundaries::{DEFAULT_CODE_FIELDS, DEFAULT_NAME_FIELDS};
use urbanity_map_ingest::mesh::DEFAULT_COUNT_FIELDS;
use urbanity_map_ingest::osm::PoiFilter;
use urbanity_map_ingest::stations::{MeasurementColumns, MetadataColumns};
use urbanity_map_ingest::tables::TableColumn;
use urbanity_map_scoring::PiecewiseRemap;
use urbanity_map_spatial::projection::JAPAN_CENTER;
use urbanity_map_spatial::{EqualAreaProjection, PointReduction};

use crate::PipelineError;

/// Raster no-data sentinel used when the config does not set one.
pub const DEFAULT_NODATA: f64 = -999.0;

/// Field holding the published land price in the default point layer.
pub const DEFAULT_LAND_PRICE_FIELD: &str = "L01_008";

/// Summit station excluded from the weather join by default.
pub const DEFAULT_EXCLUDED_STATIONS: [&str; 1] = ["富士山"];

fn strings<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.into_iter().map(String::from).collect()
}

/// Complete configuration of one pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Administrative boundaries (required).
    pub boundaries: BoundariesConfig,
    /// Night-light radiance raster (required; the fusion base layer).
    pub night_light: RasterConfig,
    /// Population mesh.
    #[serde(default)]
    pub population: Option<MeshConfig>,
    /// Points of interest from an OSM extract.
    #[serde(default)]
    pub poi: Option<PoiConfig>,
    /// Land price survey points.
    #[serde(default)]
    pub land_price: Option<PointLayerConfig>,
    /// Average taxable income per taxpayer.
    #[serde(default)]
    pub income: Option<TableConfig>,
    /// Population growth rate.
    #[serde(default)]
    pub pop_growth: Option<TableConfig>,
    /// Share of residents aged 65+.
    #[serde(default)]
    pub elderly_ratio: Option<TableConfig>,
    /// Weather stations.
    #[serde(default)]
    pub stations: Option<StationsConfig>,
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Directory for the parsed-sample cache. No caching when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundariesConfig {
    pub path: PathBuf,
    /// Candidate region-code fields, in priority order.
    #[serde(default = "default_code_fields")]
    pub code_fields: Vec<String>,
    /// Fields joined (space-separated) into a display name.
    #[serde(default = "default_name_fields")]
    pub name_fields: Vec<String>,
}

fn default_code_fields() -> Vec<String> {
    strings(DEFAULT_CODE_FIELDS)
}

fn default_name_fields() -> Vec<String> {
    strings(DEFAULT_NAME_FIELDS)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RasterConfig {
    pub path: PathBuf,
    /// Sentinel overriding the file's own no-data tag.
    #[serde(default = "default_nodata")]
    pub nodata: Option<f64>,
}

#[allow(clippy::unnecessary_wraps)]
const fn default_nodata() -> Option<f64> {
    Some(DEFAULT_NODATA)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeshConfig {
    /// A mesh file, or a directory searched recursively.
    pub path: PathBuf,
    /// Candidate count fields, in priority order.
    #[serde(default = "default_count_fields")]
    pub count_fields: Vec<String>,
}

fn default_count_fields() -> Vec<String> {
    strings(DEFAULT_COUNT_FIELDS)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoiConfig {
    /// OSM PBF extract.
    pub path: PathBuf,
    #[serde(default)]
    pub filter: PoiFilter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointLayerConfig {
    pub path: PathBuf,
    #[serde(default = "default_land_price_field")]
    pub value_field: String,
    #[serde(default = "default_point_reduction")]
    pub reduction: PointReduction,
}

fn default_land_price_field() -> String {
    DEFAULT_LAND_PRICE_FIELD.to_string()
}

const fn default_point_reduction() -> PointReduction {
    PointReduction::Mean
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub path: PathBuf,
    /// Column holding the region code.
    #[serde(default = "default_code_column")]
    pub code_column: String,
    /// How the value is derived from each row.
    pub value: TableColumn,
}

fn default_code_column() -> String {
    "code".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationsConfig {
    /// Station metadata files (names and coordinates).
    pub metadata: Vec<PathBuf>,
    /// Long-format measurement files.
    pub readings: Vec<PathBuf>,
    #[serde(default)]
    pub metadata_columns: MetadataColumns,
    #[serde(default)]
    pub reading_columns: MeasurementColumns,
    /// Station names dropped before matching.
    #[serde(default = "default_excluded_stations")]
    pub exclude: BTreeSet<String>,
}

fn default_excluded_stations() -> BTreeSet<String> {
    DEFAULT_EXCLUDED_STATIONS
        .into_iter()
        .map(String::from)
        .collect()
}

/// Centre of the equal-area projection, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub center_lon: f64,
    pub center_lat: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            center_lon: JAPAN_CENTER.0,
            center_lat: JAPAN_CENTER.1,
        }
    }
}

impl ProjectionConfig {
    #[must_use]
    pub fn projection(&self) -> EqualAreaProjection {
        EqualAreaProjection::new(self.center_lon, self.center_lat)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Layer the composite must correlate non-negatively with.
    pub base_layer: String,
    /// `[input, output]` knots of the final remap.
    pub remap: PiecewiseRemap,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            base_layer: crate::NIGHT_LIGHT.to_string(),
            remap: PiecewiseRemap::default(),
        }
    }
}

/// Where the artifacts are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub scores: String,
    pub geojson: String,
    pub report: String,
    pub diagnostics: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            scores: "urbanity-scores.json".to_string(),
            geojson: "regions-with-scores.geojson".to_string(),
            report: "fusion-report.json".to_string(),
            diagnostics: "diagnostics.json".to_string(),
        }
    }
}

impl OutputConfig {
    #[must_use]
    pub fn scores_path(&self) -> PathBuf {
        self.dir.join(&self.scores)
    }

    #[must_use]
    pub fn geojson_path(&self) -> PathBuf {
        self.dir.join(&self.geojson)
    }

    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(&self.report)
    }

    #[must_use]
    pub fn diagnostics_path(&self) -> PathBuf {
        self.dir.join(&self.diagnostics)
    }
}

fn rebase(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl PipelineConfig {
    /// Parses a config from TOML text. Paths are left as written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the text is not a valid config.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|source| PipelineError::Config {
            path: PathBuf::new(),
            source,
        })
    }

    /// Reads `path` and resolves relative paths against its directory.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::MissingInput`] if the file does not exist
    /// * [`PipelineError::Config`] if it cannot be parsed
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::MissingInput {
                layer: "config".to_string(),
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text).map_err(|source| PipelineError::Config {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        log::debug!("Loaded config {}", path.display());
        Ok(config)
    }

    /// Joins every relative path onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        rebase(base, &mut self.boundaries.path);
        rebase(base, &mut self.night_light.path);
        if let Some(population) = &mut self.population {
            rebase(base, &mut population.path);
        }
        if let Some(poi) = &mut self.poi {
            rebase(base, &mut poi.path);
        }
        if let Some(land_price) = &mut self.land_price {
            rebase(base, &mut land_price.path);
        }
        for table in [&mut self.income, &mut self.pop_growth, &mut self.elderly_ratio]
            .into_iter()
            .flatten()
        {
            rebase(base, &mut table.path);
        }
        if let Some(stations) = &mut self.stations {
            for path in stations.metadata.iter_mut().chain(&mut stations.readings) {
                rebase(base, path);
            }
        }
        rebase(base, &mut self.output.dir);
        if let Some(cache_dir) = &mut self.cache_dir {
            rebase(base, cache_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLED: &str = include_str!("../config/japan.toml");

    #[test]
    fn minimal_config_gets_defaults() {
        let config = PipelineConfig::parse(
            r#"
            [boundaries]
            path = "N03.geojson"

            [night_light]
            path = "viirs.tif"
            "#,
        )
        .unwrap();

        assert_eq!(config.boundaries.code_fields[0], "N03_007");
        assert_eq!(config.night_light.nodata, Some(DEFAULT_NODATA));
        assert!(config.population.is_none());
        assert!(config.stations.is_none());
        assert_eq!(config.fusion.base_layer, "night_light");
        assert_eq!(config.fusion.remap, PiecewiseRemap::default());
        assert_eq!(config.output.scores, "urbanity-scores.json");
        assert_eq!(config.projection, ProjectionConfig::default());
    }

    #[test]
    fn bundled_config_parses() {
        let config = PipelineConfig::parse(BUNDLED).unwrap();

        let land_price = config.land_price.unwrap();
        assert_eq!(land_price.value_field, DEFAULT_LAND_PRICE_FIELD);
        assert_eq!(land_price.reduction, PointReduction::Mean);

        let income = config.income.unwrap();
        assert!(matches!(
            income.value,
            TableColumn::Ratio { multiplier, .. } if (multiplier - 1000.0).abs() < f64::EPSILON
        ));

        let stations = config.stations.unwrap();
        assert!(stations.exclude.contains("富士山"));
        assert_eq!(stations.metadata.len(), 2);
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let mut config = PipelineConfig::parse(
            r#"
            cache_dir = "cache"

            [boundaries]
            path = "N03.geojson"

            [night_light]
            path = "/abs/viirs.tif"
            nodata = -1.0

            [stations]
            metadata = ["ame_master.csv"]
            readings = ["temp.csv"]
            exclude = []
            "#,
        )
        .unwrap();
        config.resolve_paths(Path::new("/data/run"));

        assert_eq!(config.boundaries.path, Path::new("/data/run/N03.geojson"));
        assert_eq!(config.night_light.path, Path::new("/abs/viirs.tif"));
        assert_eq!(config.night_light.nodata, Some(-1.0));
        assert_eq!(config.output.scores_path(), Path::new("/data/run/output/urbanity-scores.json"));
        assert_eq!(config.cache_dir.as_deref(), Some(Path::new("/data/run/cache")));

        let stations = config.stations.unwrap();
        assert_eq!(stations.readings[0], Path::new("/data/run/temp.csv"));
        assert!(stations.exclude.is_empty());
    }

    #[test]
    fn rejects_bad_remap() {
        let result = PipelineConfig::parse(
            r#"
            [boundaries]
            path = "a.geojson"

            [night_light]
            path = "b.tif"

            [fusion]
            remap = [[0.0, 50.0], [100.0, 10.0]]
            "#,
        );
        assert!(matches!(result, Err(PipelineError::Config { .. })));
    }
}
