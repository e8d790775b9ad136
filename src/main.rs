// Command-line runner for the `superpixel_vision` library.

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use log::info;
use std::path::PathBuf;
use superpixel_vision::core_modules::centroid_strategy::CentroidStrategy;
use superpixel_vision::core_modules::image_adapter::image_helper;
use superpixel_vision::core_modules::rgb::RgbVector;
use superpixel_vision::{SegmentationConfig, SegmentationPipeline};

const BOUNDARY_COLOR: RgbVector = RgbVector::new(255, 255, 255);

#[derive(Parser, Debug)]
#[command(
    name = "superpixel_vision",
    version,
    about = "SLIC superpixels followed by K-means color clustering"
)]
struct Cli {
    /// Input image path
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
    /// Output image path (PNG)
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(long = "config", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    /// Number of superpixels
    #[arg(long = "superpixels")]
    superpixels: Option<usize>,
    /// Spatial weight of the superpixel distance (1-20 recommended)
    #[arg(long = "compactness")]
    compactness: Option<f64>,
    /// Number of color clusters
    #[arg(long = "clusters")]
    clusters: Option<usize>,
    /// Color centroid initialization
    #[arg(long = "strategy", value_enum)]
    strategy: Option<CentroidStrategy>,
    /// Random seed for reproducible runs
    #[arg(long = "seed")]
    seed: Option<u64>,
    /// Number of worker threads
    #[arg(long = "threads")]
    threads: Option<usize>,
    /// Resize the input before segmenting, as WIDTHxHEIGHT
    #[arg(long = "resize", value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Also write the image with superpixel outlines drawn over it
    #[arg(long = "boundaries", value_hint = ValueHint::FilePath)]
    boundaries: Option<PathBuf>,
    /// Also write the image painted with superpixel mean colors
    #[arg(long = "superpixel-output", value_hint = ValueHint::FilePath)]
    superpixel_output: Option<PathBuf>,
}

fn parse_size(value: &str) -> std::result::Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width: u32 = width.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let height: u32 = height.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    if width == 0 || height == 0 {
        return Err("width and height must be positive".to_string());
    }
    Ok((width, height))
}

fn build_config(cli: &Cli) -> Result<SegmentationConfig> {
    let mut cfg = match &cli.config {
        Some(path) => SegmentationConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SegmentationConfig::default(),
    };
    if let Some(v) = cli.superpixels {
        cfg.superpixel_count = v;
    }
    if let Some(v) = cli.compactness {
        cfg.compactness = v;
    }
    if let Some(v) = cli.clusters {
        cfg.cluster_count = v;
    }
    if let Some(v) = cli.strategy {
        cfg.centroid_strategy = v;
    }
    if let Some(v) = cli.seed {
        cfg.seed = Some(v);
    }
    if let Some(v) = cli.threads {
        cfg.threads = v;
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let image = image_helper::load(&cli.input, cli.resize)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let pipeline = SegmentationPipeline::new(config).context("invalid configuration")?;
    let report = pipeline.run(&image).context("segmentation failed")?;

    if !report.unreachable().is_empty() {
        info!("{} pixels kept their original color", report.unreachable().len());
    }

    let mut clustered = image.clone();
    report.render_into(&mut clustered);
    image_helper::save(&cli.output, &clustered)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!("Palette: {:?}", report.palette());

    if let Some(path) = &cli.superpixel_output {
        let mut superpixels = image.clone();
        report.render_superpixels_into(&mut superpixels);
        image_helper::save(path, &superpixels)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if let Some(path) = &cli.boundaries {
        let mut outlined = image.clone();
        report.render_boundaries_into(&mut outlined, BOUNDARY_COLOR);
        image_helper::save(path, &outlined)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
