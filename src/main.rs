use std::path::PathBuf;
use std::time::Instant;
use anyhow::{bail, Context};
use clap::Parser;

use leaf_marker_rust_lib::config::{Config, SegmentationMethod};
use leaf_marker_rust_lib::hole_filling::FillMode;
use leaf_marker_rust_lib::image_io::{get_image_files_in_dir, has_image_extension, resolve_destination};
use leaf_marker_rust_lib::output::write_summary_csv;
use leaf_marker_rust_lib::pipeline::process_batch;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Leaf background marker - extract the leaf from a photograph")]
struct Args {
    /// Image file or folder containing images
    image_source: Option<String>,

    /// Destination directory (defaults to the input's folder, or <folder>_markers)
    #[clap(short, long)]
    destination: Option<String>,

    /// Path to configuration file (optional)
    #[clap(short, long)]
    config: Option<String>,

    /// Hole filling technique
    #[clap(short, long, value_enum)]
    fill: Option<FillMode>,

    /// Smooth the leaf boundary
    #[clap(short, long)]
    smooth: bool,

    /// Write the mask with this foreground intensity instead of the masked photo
    #[clap(short, long, value_parser = clap::value_parser!(u32).range(0..=255))]
    marker_intensity: Option<u32>,

    /// Marker source
    #[clap(long, value_enum)]
    method: Option<SegmentationMethod>,

    /// Process files one at a time
    #[clap(long)]
    sequential: bool,

    /// Enable debug logging
    #[clap(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Override config with command-line arguments
    if let Some(source) = args.image_source.clone() {
        config.input_path = source;
    }
    if let Some(destination) = args.destination.clone() {
        config.output_dir = Some(destination);
    }
    if let Some(fill) = args.fill {
        config.fill_mode = fill;
    }
    if args.smooth {
        config.smooth_boundary = true;
    }
    if let Some(intensity) = args.marker_intensity {
        config.marker_intensity = intensity;
    }
    if let Some(method) = args.method {
        config.segmentation_method = method;
    }
    if args.sequential {
        config.use_parallel = false;
    }

    config.validate()?;

    let start_time = Instant::now();
    let input_path = PathBuf::from(&config.input_path);

    let files = if input_path.is_dir() {
        get_image_files_in_dir(&input_path)
            .with_context(|| format!("listing {}", input_path.display()))?
    } else if input_path.is_file() {
        if !has_image_extension(&input_path) {
            log::warn!("{} doesn't have a valid image extension", input_path.display());
        }
        vec![input_path.clone()]
    } else {
        bail!("{}: is not a file or directory", input_path.display());
    };

    let destination = resolve_destination(&input_path, config.output_dir.as_deref().map(std::path::Path::new))
        .context("resolving destination directory")?;

    log::info!("Processing {} image(s) into {}", files.len(), destination.display());

    let reports = process_batch(&files, &config, &destination);
    let succeeded = reports.iter().filter(|r| r.succeeded()).count();

    if config.write_summary {
        let summary = write_summary_csv(&reports, &destination)?;
        log::info!("Summary written to {}", summary.display());
    }

    log::info!(
        "{} of {} images segmented in {:.2} seconds",
        succeeded,
        reports.len(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
