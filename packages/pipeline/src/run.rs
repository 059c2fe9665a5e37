//! Stage orchestration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use urbanity_map_geography::{Boundaries, BoundaryOptions, SchemaResolver, load_boundaries};
use urbanity_map_geography_models::{DiagnosticKind, Diagnostics, Measurement, RegionCode};
use urbanity_map_ingest::cache::{cache_path, load_or_parse};
use urbanity_map_ingest::mesh::read_mesh;
use urbanity_map_ingest::osm::read_pois;
use urbanity_map_ingest::points::read_points;
use urbanity_map_ingest::progress::{ProgressCallback, null_progress};
use urbanity_map_ingest::raster::read_geotiff;
use urbanity_map_ingest::stations::{join_stations, read_station_metadata, read_station_readings};
use urbanity_map_ingest::tables::read_code_table;
use urbanity_map_scoring::{
    DistributionSummary, FusionEngine, FusionReport, NormalizedLayer, normalize, summarize,
};
use urbanity_map_spatial::{
    EqualAreaProjection, GeometryAggregator, NearestMatcher, PointReduction, Region,
};
use urbanity_map_store::{
    AuxiliaryLayers, LayerScores, ScoreStore, write_json, write_scored_geojson, write_scores,
};

use crate::config::{
    MeshConfig, PipelineConfig, PoiConfig, PointLayerConfig, RasterConfig, StationsConfig,
    TableConfig,
};
use crate::{NIGHT_LIGHT, POI, POPULATION, PipelineError};

const STAGES: [&str; 8] = [
    "boundaries",
    "night light",
    "population",
    "points of interest",
    "land price and tables",
    "weather stations",
    "fusion",
    "outputs",
];

type RawLayer = BTreeMap<RegionCode, Option<f64>>;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Regions scored.
    pub regions: usize,
    /// Fusion weights and fit statistics.
    pub report: FusionReport,
    /// Everything skipped along the way.
    pub diagnostics: Diagnostics,
    /// Distribution of the composite score.
    pub urbanity: Option<DistributionSummary>,
    pub scores_path: PathBuf,
    pub geojson_path: PathBuf,
}

/// One configured run of the batch job.
pub struct Pipeline {
    config: PipelineConfig,
    steps: Arc<dyn ProgressCallback>,
    files: Arc<dyn ProgressCallback>,
}

fn require(path: &Path, layer: &str) -> Result<(), PipelineError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput {
            layer: layer.to_string(),
            path: path.to_path_buf(),
        })
    }
}

fn present(path: &Path, layer: &str, diagnostics: &mut Diagnostics) -> bool {
    if path.exists() {
        return true;
    }
    log::warn!("{layer} input {} not found; continuing without it", path.display());
    diagnostics.record(DiagnosticKind::PartialData, 1);
    false
}

fn skipped(layer: &str, diagnostics: &mut Diagnostics) {
    log::warn!("No {layer} layer configured; continuing without it");
    diagnostics.record(DiagnosticKind::PartialData, 1);
}

/// Every region, valued where `values` has an entry.
fn over_regions(regions: &[Region], values: &BTreeMap<RegionCode, f64>) -> RawLayer {
    regions
        .iter()
        .map(|r| (r.code.clone(), values.get(&r.code).copied()))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_count(v: f64) -> u64 {
    v.max(0.0).round() as u64
}

impl Pipeline {
    /// Creates a pipeline that reports no progress.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            steps: null_progress(),
            files: null_progress(),
        }
    }

    /// Reports stage progress to `steps` and per-file progress to `files`.
    #[must_use]
    pub fn with_progress(
        mut self,
        steps: Arc<dyn ProgressCallback>,
        files: Arc<dyn ProgressCallback>,
    ) -> Self {
        self.steps = steps;
        self.files = files;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn stage(&self, index: usize) {
        if index > 0 {
            self.steps.inc(1);
        }
        self.steps.set_message(format!("Stage: {}", STAGES[index]));
        log::info!("Stage {}/{}: {}", index + 1, STAGES.len(), STAGES[index]);
    }

    /// Runs every stage and writes the artifacts.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::MissingInput`] if the boundaries or the
    ///   night-light raster are absent
    /// * any read, fusion or write error
    #[allow(clippy::too_many_lines)]
    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        let config = &self.config;
        let projection = config.projection.projection();
        let mut diagnostics = Diagnostics::new();
        self.steps.set_total(STAGES.len() as u64);

        self.stage(0);
        let boundaries = self.read_boundaries(projection)?;
        diagnostics.merge(&boundaries.diagnostics);
        let regions = &boundaries.regions;
        let aggregator = GeometryAggregator::new(regions);

        self.stage(1);
        let night_light = night_light_layer(&config.night_light, &aggregator)?;

        let mut fused: Vec<(&str, RawLayer)> = vec![(NIGHT_LIGHT, night_light)];
        let mut auxiliary = AuxiliaryLayers::default();

        self.stage(2);
        match &config.population {
            Some(population) if present(&population.path, POPULATION, &mut diagnostics) => {
                let (raw, counts) =
                    self.population_layer(population, &aggregator, &mut diagnostics)?;
                fused.push((POPULATION, raw));
                auxiliary.population_count = counts;
            }
            Some(_) => {}
            None => skipped(POPULATION, &mut diagnostics),
        }

        self.stage(3);
        match &config.poi {
            Some(poi) if present(&poi.path, POI, &mut diagnostics) => {
                let raw = self.poi_layer(poi, &aggregator, &mut auxiliary, &mut diagnostics)?;
                fused.push((POI, raw));
            }
            Some(_) => {}
            None => skipped(POI, &mut diagnostics),
        }

        self.stage(4);
        match &config.land_price {
            Some(land_price) if present(&land_price.path, "land_price", &mut diagnostics) => {
                auxiliary.land_price =
                    land_price_layer(land_price, &aggregator, &mut diagnostics)?;
            }
            Some(_) => {}
            None => skipped("land_price", &mut diagnostics),
        }
        for (name, table, target) in [
            ("income", &config.income, &mut auxiliary.avg_income),
            ("pop_growth", &config.pop_growth, &mut auxiliary.pop_growth),
            ("elderly_ratio", &config.elderly_ratio, &mut auxiliary.elderly_ratio),
        ] {
            match table {
                Some(table) if present(&table.path, name, &mut diagnostics) => {
                    *target = table_layer(name, table, &mut diagnostics)?;
                }
                Some(_) => {}
                None => skipped(name, &mut diagnostics),
            }
        }

        self.stage(5);
        match &config.stations {
            Some(stations) => {
                if let Some(weather) =
                    station_layers(stations, regions, projection, &mut diagnostics)?
                {
                    auxiliary.max_temp = weather.0;
                    auxiliary.max_snow = weather.1;
                }
            }
            None => skipped("stations", &mut diagnostics),
        }

        self.stage(6);
        let mut scores = LayerScores::default();
        for (name, raw) in &fused {
            let NormalizedLayer {
                scores: normalized,
                degenerate,
            } = normalize(raw);
            if degenerate {
                log::warn!("Layer {name} has a single distinct value; every score is 0");
                diagnostics.record(DiagnosticKind::DegenerateDistribution, 1);
            }
            match *name {
                NIGHT_LIGHT => scores.night_light = normalized,
                POPULATION => scores.population = normalized,
                _ => scores.poi = normalized,
            }
        }

        let engine = FusionEngine::new(
            fused.iter().map(|(name, _)| (*name).to_string()).collect(),
            &config.fusion.base_layer,
            config.fusion.remap.clone(),
        )?;
        let rows: BTreeMap<RegionCode, Vec<Option<f64>>> = regions
            .iter()
            .map(|region| {
                let row = fused
                    .iter()
                    .map(|(_, raw)| raw.get(&region.code).copied().flatten())
                    .collect();
                (region.code.clone(), row)
            })
            .collect();
        let outcome = engine.fuse(&rows)?;

        self.stage(7);
        let store = ScoreStore::merge(&outcome.scores, &scores, &auxiliary);
        let output = &config.output;
        let scores_path = output.scores_path();
        let geojson_path = output.geojson_path();
        write_scores(&scores_path, &store)?;
        write_scored_geojson(
            &geojson_path,
            &boundaries.collection,
            &boundaries.code_field,
            &store,
        )?;
        write_json(&output.report_path(), &outcome.report)?;
        write_json(&output.diagnostics_path(), &diagnostics)?;

        self.steps.inc(1);
        self.steps.finish(format!("Scored {} regions", store.len()));

        for (kind, count) in diagnostics.iter() {
            log::info!("  {kind}: {count}");
        }

        Ok(RunSummary {
            regions: store.len(),
            report: outcome.report,
            diagnostics,
            urbanity: summarize(&store.urbanity_values()),
            scores_path,
            geojson_path,
        })
    }

    fn read_boundaries(&self, projection: EqualAreaProjection) -> Result<Boundaries, PipelineError> {
        let config = &self.config.boundaries;
        require(&config.path, "boundaries")?;
        let options = BoundaryOptions {
            code_fields: config.code_fields.clone(),
            name_fields: config.name_fields.clone(),
            projection,
        };
        Ok(load_boundaries(&config.path, &options)?)
    }

    fn population_layer(
        &self,
        config: &MeshConfig,
        aggregator: &GeometryAggregator<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<(RawLayer, BTreeMap<RegionCode, u64>), PipelineError> {
        let resolver = SchemaResolver::new(&config.count_fields);
        let mesh = read_mesh(&config.path, &resolver, &self.files)?;
        diagnostics.record(DiagnosticKind::PartialData, mesh.skipped_files);
        diagnostics.record(DiagnosticKind::Parse, mesh.skipped_features);

        let aggregation = aggregator.aggregate_mesh(&mesh.cells);
        diagnostics.record(DiagnosticKind::UnassignedSample, aggregation.unassigned);
        diagnostics.record(DiagnosticKind::Parse, aggregation.invalid);

        let counts = aggregation
            .values
            .iter()
            .map(|(code, v)| (code.clone(), as_count(*v)))
            .collect();
        Ok((over_regions(aggregator.regions(), &aggregation.values), counts))
    }

    fn poi_layer(
        &self,
        config: &PoiConfig,
        aggregator: &GeometryAggregator<'_>,
        auxiliary: &mut AuxiliaryLayers,
        diagnostics: &mut Diagnostics,
    ) -> Result<RawLayer, PipelineError> {
        let samples = match &self.config.cache_dir {
            Some(dir) => load_or_parse(&cache_path(dir, POI, &config.path), || {
                read_pois(&config.path, &config.filter)
            })?,
            None => read_pois(&config.path, &config.filter)?,
        };

        let aggregation = aggregator.aggregate_points(&samples, PointReduction::Count);
        diagnostics.record(DiagnosticKind::UnassignedSample, aggregation.unassigned);
        diagnostics.record(DiagnosticKind::Parse, aggregation.invalid);

        let density = aggregator.density(&aggregation.values);
        auxiliary.poi_count = aggregator
            .regions()
            .iter()
            .map(|r| {
                let count = aggregation.values.get(&r.code).copied().unwrap_or(0.0);
                (r.code.clone(), as_count(count))
            })
            .collect();
        auxiliary.poi_density.clone_from(&density);

        Ok(density.into_iter().map(|(code, v)| (code, Some(v))).collect())
    }
}

fn night_light_layer(
    config: &RasterConfig,
    aggregator: &GeometryAggregator<'_>,
) -> Result<RawLayer, PipelineError> {
    require(&config.path, NIGHT_LIGHT)?;
    let raster = read_geotiff(&config.path, config.nodata)?;
    let aggregation = aggregator.zonal_mean(&raster);
    Ok(aggregation
        .values
        .into_iter()
        .map(|(code, v)| (code, Some(v)))
        .collect())
}

fn land_price_layer(
    config: &PointLayerConfig,
    aggregator: &GeometryAggregator<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeMap<RegionCode, f64>, PipelineError> {
    let layer = read_points(&config.path, Some(&config.value_field))?;
    diagnostics.record(DiagnosticKind::Parse, layer.skipped);

    let aggregation = aggregator.aggregate_points(&layer.samples, config.reduction);
    diagnostics.record(DiagnosticKind::UnassignedSample, aggregation.unassigned);
    diagnostics.record(DiagnosticKind::Parse, aggregation.invalid);
    Ok(aggregation.values)
}

fn table_layer(
    name: &str,
    config: &TableConfig,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeMap<RegionCode, f64>, PipelineError> {
    let table = read_code_table(&config.path, &config.code_column, &config.value)?;
    if table.parse_errors > 0 {
        log::warn!("{name}: skipped {} malformed rows", table.parse_errors);
    }
    diagnostics.record(DiagnosticKind::Parse, table.parse_errors);
    log::info!("{name}: {} regions", table.values.len());
    Ok(table.values)
}

type WeatherLayers = (BTreeMap<RegionCode, f64>, BTreeMap<RegionCode, f64>);

fn station_layers(
    config: &StationsConfig,
    regions: &[Region],
    projection: EqualAreaProjection,
    diagnostics: &mut Diagnostics,
) -> Result<Option<WeatherLayers>, PipelineError> {
    let inputs: Vec<&PathBuf> = config.metadata.iter().chain(&config.readings).collect();
    if config.metadata.is_empty()
        || config.readings.is_empty()
        || !inputs
            .iter()
            .all(|path| present(path, "stations", diagnostics))
    {
        return Ok(None);
    }

    let (locations, bad_locations) =
        read_station_metadata(&config.metadata, &config.metadata_columns)?;
    let (readings, bad_readings) =
        read_station_readings(&config.readings, &config.reading_columns)?;
    diagnostics.record(DiagnosticKind::Parse, bad_locations + bad_readings);

    let set = join_stations(&locations, &readings, &config.exclude);
    diagnostics.record(DiagnosticKind::UnmatchedStation, set.unmatched.len() as u64);

    let matcher = NearestMatcher::new(&set.stations, projection);
    let mut layers = Measurement::ALL.map(|measurement| {
        matcher
            .assign(regions, measurement)
            .into_iter()
            .map(|(code, assignment)| (code, assignment.value))
            .collect::<BTreeMap<_, _>>()
    });

    for (measurement, layer) in Measurement::ALL.iter().zip(&layers) {
        if layer.is_empty() {
            diagnostics.record(DiagnosticKind::PartialData, 1);
        } else {
            log::info!("{measurement}: {} regions matched to a station", layer.len());
        }
    }

    let max_snow = std::mem::take(&mut layers[1]);
    let max_temp = std::mem::take(&mut layers[0]);
    Ok(Some((max_temp, max_snow)))
}
