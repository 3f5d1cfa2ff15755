//! Command line entry point for the NYC building footprint and LL84 energy
//! map data pipeline.

use anyhow::{Context, Result};
use bldgenergygeo::collect::global_variables::{cleaned_path, TOPOJSON_OUTPUT_PATH};
use bldgenergygeo::collect::sanitize::sanitize_file;
use bldgenergygeo::config::PipelineConfig;
use bldgenergygeo::pipeline::run_with_config;
use bldgenergygeo::topology::{ExternalConverter, TopologyConverter};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bldgenergygeo")]
#[command(about = "Join NYC building footprints with LL84 energy disclosures for web maps", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, merge and export; optionally convert to TopoJSON
    Run(RunArgs),
    /// Only sanitize the energy CSV
    Sanitize {
        /// Raw disclosure CSV
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Cleaned CSV, `cleaned_<name>` beside the input by default
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Only convert an exported GeoJSON file to TopoJSON
    Convert {
        #[arg(value_name = "GEOJSON")]
        geojson: PathBuf,

        #[arg(short, long, default_value = TOPOJSON_OUTPUT_PATH)]
        output: PathBuf,

        /// Converter executable
        #[arg(long, default_value = "topojson")]
        command: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Footprint shapefile, zipped shapefile or GeoJSON
    #[arg(long)]
    footprints: Option<PathBuf>,

    /// Raw LL84 disclosure CSV
    #[arg(long)]
    energy: Option<PathBuf>,

    #[arg(long)]
    cleaned_energy: Option<PathBuf>,

    #[arg(long)]
    source_epsg: Option<i32>,

    #[arg(long)]
    target_epsg: Option<i32>,

    /// Borough code, 1 (Manhattan) to 5
    #[arg(long)]
    borough: Option<u8>,

    #[arg(long)]
    lat_min: Option<f64>,

    #[arg(long)]
    lat_max: Option<f64>,

    /// GeoJSON output path
    #[arg(long)]
    geojson: Option<PathBuf>,

    /// TopoJSON output path
    #[arg(long)]
    topojson_output: Option<PathBuf>,

    /// Run the TopoJSON conversion after export
    #[arg(long)]
    topojson: bool,

    /// Print the first N exported rows
    #[arg(long, value_name = "N")]
    preview: Option<usize>,
}

impl RunArgs {
    fn into_config(self) -> Result<(PipelineConfig, Option<usize>)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(p) = self.footprints {
            config.inputs.footprints = p;
        }
        if let Some(p) = self.energy {
            config.inputs.energy = p;
        }
        if let Some(p) = self.cleaned_energy {
            config.inputs.cleaned_energy = Some(p);
        }
        if let Some(epsg) = self.source_epsg {
            config.projection.source_epsg = epsg;
        }
        if let Some(epsg) = self.target_epsg {
            config.projection.target_epsg = epsg;
        }
        if let Some(b) = self.borough {
            config.filter.borough = b;
        }
        if let Some(v) = self.lat_min {
            config.filter.lat_min = v;
        }
        if let Some(v) = self.lat_max {
            config.filter.lat_max = v;
        }
        if let Some(p) = self.geojson {
            config.output.geojson = p;
        }
        if let Some(p) = self.topojson_output {
            config.output.topojson = p;
        }
        if self.topojson {
            config.topology.enabled = true;
        }

        config.validate().context("Invalid configuration")?;
        Ok((config, self.preview))
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Run(args) => {
            let (config, preview) = args.into_config()?;
            let run = run_with_config(&config).context("Pipeline run failed")?;

            info!(
                report = %serde_json::to_string(&run.report)?,
                "Run report"
            );

            if let Some(n) = preview {
                print_preview(&config, &run.merged, n)?;
            }
        }
        Commands::Sanitize { input, output } => {
            let output = output.unwrap_or_else(|| cleaned_path(&input));
            let stats = sanitize_file(&input, &output)
                .with_context(|| format!("Failed to sanitize {}", input.display()))?;
            info!(
                records = stats.records_emitted,
                joined = stats.records_joined,
                output = %output.display(),
                "Sanitize done"
            );
        }
        Commands::Convert {
            geojson,
            output,
            command,
        } => {
            let converter = ExternalConverter {
                command,
                ..ExternalConverter::default()
            };
            converter
                .convert(&geojson, &output)
                .with_context(|| format!("Failed to convert {}", geojson.display()))?;
        }
    }

    Ok(())
}

#[cfg(feature = "polars")]
fn print_preview(
    config: &PipelineConfig,
    merged: &bldgenergygeo::geometric::merge::MergedTable,
    n: usize,
) -> Result<()> {
    use bldgenergygeo::geometric::export::filter_rows;
    use bldgenergygeo::geometric::merge::rows_to_polars_df;

    let (rows, _) = filter_rows(merged, &config.export_filter());
    let rows = &rows[..n.min(rows.len())];
    let df = rows_to_polars_df(rows).context("Failed to build preview DataFrame")?;
    println!("{}", df);
    Ok(())
}

#[cfg(not(feature = "polars"))]
fn print_preview(
    _config: &PipelineConfig,
    _merged: &bldgenergygeo::geometric::merge::MergedTable,
    _n: usize,
) -> Result<()> {
    tracing::warn!("--preview needs the `polars` feature");
    Ok(())
}
