use clap::{Parser, Subcommand};
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

use microspot_reader::activity::{ActivityTable, FeatureChromatograms, FeatureTable, Peak};
use microspot_reader::pipeline::{PipelineConfig, analyze_image, annotate_activity};
use microspot_reader::test_image_gen::generate_test_image;
use microspot_reader::{ImageLoader, SpotList, WellRange};

#[derive(Parser, Debug)]
#[command(
    name = "microspot",
    about = "Read bioactivity from microspot assay images and link it to LC-MS features",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect, correct and index spots and write their intensities as CSV.
    Analyze(AnalyzeArgs),
    /// Merge spot lists into a retention-time resolved activity table.
    Prepare(PrepareArgs),
    /// Detect activity peaks and correlate them with MS features.
    Annotate(AnnotateArgs),
    /// Write the default pipeline configuration.
    DefaultConfig {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write a synthetic assay image.
    GenerateTestImage {
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Assay image (png, jpg, tif, ...)
    #[arg(short, long)]
    image: PathBuf,

    /// First well of the spotted range, e.g. A1
    #[arg(long)]
    first: String,

    /// Last well of the spotted range, e.g. L20
    #[arg(long)]
    last: String,

    /// JSON configuration, missing keys keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat dark spots on a bright background
    #[arg(long)]
    invert: bool,

    /// Spot list CSV
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct PrepareArgs {
    /// Spot list CSV, repeat to merge several
    #[arg(short, long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Row name to drop, repeatable
    #[arg(long = "remove-row")]
    remove_rows: Vec<String>,

    /// Column number to drop, repeatable
    #[arg(long = "remove-column")]
    remove_columns: Vec<u32>,

    /// Spots were deposited in serpentine order
    #[arg(long)]
    serpentine: bool,

    /// Retention time of the first spot, in seconds
    #[arg(long)]
    start: f64,

    /// Retention time of the last spot, in seconds
    #[arg(long)]
    end: f64,

    /// Subtract an iterative Savitzky-Golay baseline before smoothing
    #[arg(long)]
    baseline_correction: bool,

    /// Savitzky-Golay window of the baseline, in spots
    #[arg(long, default_value_t = 100)]
    baseline_window: usize,

    /// Polynomial order of the baseline fit
    #[arg(long, default_value_t = 1)]
    baseline_polyorder: usize,

    /// RMS change at which the baseline counts as converged
    #[arg(long, default_value_t = 0.001)]
    baseline_convergence: f64,

    /// Gaussian smoothing of the chromatogram, in spots
    #[arg(long)]
    smooth_sigma: Option<f64>,

    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct AnnotateArgs {
    /// Activity table CSV with an RT column
    #[arg(short, long)]
    activity: PathBuf,

    /// Feature table CSV (id, mz, RT, RTstart, RTend)
    #[arg(short, long)]
    features: PathBuf,

    /// Feature chromatograms CSV (id, rt, intensity)
    #[arg(long)]
    chromatograms: PathBuf,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Annotated peaks as JSON
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Serialize)]
struct AnnotationReport<'a> {
    threshold: f64,
    peaks: &'a [Peak],
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn Error>> {
    Ok(match path {
        Some(path) => PipelineConfig::read_json(path)?,
        None => PipelineConfig::default(),
    })
}

fn ensure_parent(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if args.invert {
        config.image_loader.invert_image = true;
    }
    let range = WellRange::parse(&args.first, &args.last)?;
    let image = ImageLoader::new(config.image_loader.clone()).prepare(&args.image)?;
    let analysis = analyze_image(&image, &range, &config)?;

    ensure_parent(&args.output)?;
    analysis.spots.write_csv_path(&args.output)?;
    info!(
        spots = analysis.spots.len(),
        out_of_bounds = analysis.sampling.out_of_bounds.len(),
        output = %args.output.display(),
        "wrote spot list"
    );
    Ok(())
}

fn run_prepare(args: PrepareArgs) -> Result<(), Box<dyn Error>> {
    let lists = args
        .inputs
        .iter()
        .map(|path| SpotList::read_csv_path(path))
        .collect::<Result<Vec<_>, _>>()?;
    let mut spots = SpotList::default();
    spots.extend_from(lists);

    if !args.remove_rows.is_empty() {
        spots.remove_rows(&args.remove_rows)?;
    }
    if !args.remove_columns.is_empty() {
        spots.remove_columns(&args.remove_columns)?;
    }
    spots.sort(args.serpentine, false)?;

    let mut table = ActivityTable::from_spot_list(&spots)?;
    table.assign_retention_times(args.start, args.end)?;
    if args.baseline_correction {
        table.baseline_correct(args.baseline_window, args.baseline_polyorder, args.baseline_convergence)?;
    }
    if let Some(sigma) = args.smooth_sigma {
        table.gaussian_smooth(sigma);
    }

    ensure_parent(&args.output)?;
    table.write_csv_path(&args.output)?;
    info!(spots = table.len(), output = %args.output.display(), "wrote activity table");
    Ok(())
}

fn run_annotate(args: AnnotateArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(args.config.as_deref())?;
    let table = ActivityTable::read_csv_path(&args.activity)?;
    let features = FeatureTable::read_csv_path(&args.features)?;
    let chromatograms = FeatureChromatograms::read_csv_path(&args.chromatograms)?;

    let detection = annotate_activity(&table, &features, &chromatograms, &config)?;

    ensure_parent(&args.output)?;
    let report = AnnotationReport {
        threshold: detection.threshold,
        peaks: &detection.peaks,
    };
    fs::write(&args.output, serde_json::to_string_pretty(&report)?)?;
    info!(peaks = detection.peaks.len(), output = %args.output.display(), "wrote annotated peaks");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args)?,
        Command::Prepare(args) => run_prepare(args)?,
        Command::Annotate(args) => run_annotate(args)?,
        Command::DefaultConfig { output } => {
            ensure_parent(&output)?;
            PipelineConfig::default().write_json(&output)?;
        }
        Command::GenerateTestImage { output } => {
            ensure_parent(&output)?;
            generate_test_image(&output)?;
        }
    }
    Ok(())
}
