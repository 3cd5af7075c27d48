//! `rusle`: annual soil erosion and degradation maps from local composites.

mod files;
mod geotiff;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rusle_core::{ErosionPipeline, PipelineConfig, PipelineOutputs};

use crate::files::{FileSink, FileSource};

#[derive(Parser, Debug)]
#[command(name = "rusle", version, about = "RUSLE soil erosion and degradation mapping")]
struct Args {
    /// Pipeline configuration JSON. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding one composite per configured product.
    #[arg(short, long, default_value = "data/inputs")]
    inputs: PathBuf,

    /// Output directory (created if absent).
    #[arg(short, long, default_value = "data/outputs")]
    output: PathBuf,

    /// Also write NDVI, slope, the four factors and erosion as float GeoTIFFs.
    #[arg(long)]
    intermediates: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Cannot install log subscriber")
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Cannot read config {}", path.display()))?;
            PipelineConfig::from_json_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn write_intermediates(dir: &Path, outputs: &PipelineOutputs) -> Result<()> {
    let dir = dir.join("intermediates");
    fs::create_dir_all(&dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    let rasters = [
        &outputs.ndvi,
        &outputs.slope,
        &outputs.r.raster,
        &outputs.k.raster,
        &outputs.ls.raster,
        &outputs.c.raster,
        &outputs.erosion,
    ];
    for raster in rasters {
        geotiff::write_band(&dir.join(format!("{}.tif", raster.name)), raster)?;
    }
    let soil_loss = &outputs.soil_loss;
    geotiff::write_classes(&dir.join(format!("{}.tif", soil_loss.name)), soil_loss)?;
    let json = dir.join(format!("{}.json", soil_loss.name));
    fs::write(&json, serde_json::to_string(soil_loss)?)
        .with_context(|| format!("Write failed: {}", json.display()))?;
    info!(dir = %dir.display(), count = rasters.len() + 1, "intermediates written");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = load_config(args.config.as_deref())?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let start = Instant::now();
    let pipeline = ErosionPipeline::new(config)?;
    let source = FileSource::new(&args.inputs);
    let outputs = pipeline
        .run(&source)
        .with_context(|| format!("Pipeline failed on inputs in {}", args.inputs.display()))?;

    if args.intermediates {
        write_intermediates(&args.output, &outputs)?;
    }

    let mut sink = FileSink::create(&args.output)?;
    pipeline.export(&outputs, &mut sink)?;
    let manifest = sink.finish()?;

    info!(
        region = pipeline.region().name(),
        manifest = %manifest.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "done"
    );
    Ok(())
}
