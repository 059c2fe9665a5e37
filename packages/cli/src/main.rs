#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `urbanity_map`: runs the urbanity index pipeline and reports on its
//! outputs.
//!
//! Logging goes through `indicatif-log-bridge` (via
//! [`urbanity_map_cli_utils::init_logger`]) so log lines and progress bars
//! never fight for the terminal. Set `RUST_LOG=info` to see stage logs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use urbanity_map_cli_utils::IndicatifProgress;
use urbanity_map_geography::boundaries::DEFAULT_NAME_FIELDS;
use urbanity_map_pipeline::analysis::{SCORE_FIELD, analyze_scores, read_ranked_regions};
use urbanity_map_pipeline::{Pipeline, PipelineConfig};
use urbanity_map_scoring::rank_bands;

#[derive(Parser)]
#[command(name = "urbanity_map", about = "Composite urbanity index per municipality")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline described by a TOML config
    Run {
        /// Path to the run configuration
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Print the distribution of composite scores
    Analyze {
        /// Score document written by `run`
        scores: PathBuf,
    },
    /// List the top regions in each ten-point score band
    Ranks {
        /// Scored `GeoJSON` written by `run`
        geojson: PathBuf,
        /// Regions listed per band
        #[arg(long, default_value_t = 10)]
        per_band: usize,
        /// Property holding the score
        #[arg(long, default_value = SCORE_FIELD)]
        score_field: String,
        /// Properties joined into the region name
        #[arg(long, value_delimiter = ',')]
        name_fields: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = urbanity_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = PipelineConfig::load(&config)?;
            let steps = IndicatifProgress::steps_bar(&multi, "Pipeline", 0);
            let files = IndicatifProgress::batch_bar(&multi, "Files");
            let summary = Pipeline::new(config)
                .with_progress(steps, files.clone())
                .run()?;
            files.finish(String::new());

            println!("Scored {} regions", summary.regions);
            println!(
                "Weights: {}",
                summary
                    .report
                    .weights
                    .iter()
                    .map(|(layer, w)| format!("{layer}={w:.3}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                "Explained variance: {:.3} ({} regions fitted, {} excluded)",
                summary.report.explained_variance_ratio,
                summary.report.restricted,
                summary.report.excluded
            );
            if let Some(distribution) = &summary.urbanity {
                println!(
                    "Urbanity range: {:.1} - {:.1}",
                    distribution.min, distribution.max
                );
            }
            if !summary.diagnostics.is_clean() {
                println!("Skipped:");
                for (kind, count) in summary.diagnostics.iter() {
                    println!("  {kind}: {count}");
                }
            }
            println!("Wrote {}", summary.scores_path.display());
            println!("Wrote {}", summary.geojson_path.display());
        }
        Commands::Analyze { scores } => match analyze_scores(&scores)? {
            Some(summary) => print!("{summary}"),
            None => log::warn!("{} contains no scores", scores.display()),
        },
        Commands::Ranks {
            geojson,
            per_band,
            score_field,
            name_fields,
        } => {
            let name_fields = if name_fields.is_empty() {
                DEFAULT_NAME_FIELDS.iter().map(ToString::to_string).collect()
            } else {
                name_fields
            };
            let regions = read_ranked_regions(&geojson, &name_fields, &score_field)?;
            println!("{} regions", regions.len());
            for band in rank_bands(regions, per_band) {
                println!();
                print!("{band}");
            }
        }
    }

    Ok(())
}
