use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use image::ImageFormat;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use perspectra_rs::{logging, Config, DocumentProcessor};
use rayon::{prelude::*, ThreadPoolBuilder};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory searched recursively for photos
    input_dir: PathBuf,

    /// Where rectified images are written, mirroring the input layout
    #[arg(default_value = "output")]
    output_dir: PathBuf,

    #[arg(short, long, default_value_t = String::from("png"))]
    format: String,

    #[arg(
        short, long, default_value_t = thread::available_parallelism().map_or(1, |n| n.get())
    )]
    num_threads: usize,

    #[command(flatten)]
    config: Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.config);

    ensure!(cli.input_dir.is_dir(), "Input directory does not exist");
    ensure!(
        ImageFormat::from_extension(&cli.format).is_some(),
        "Invalid format"
    );

    let processor = DocumentProcessor::new(cli.config.clone())?;
    ThreadPoolBuilder::new()
        .num_threads(cli.num_threads)
        .build_global()?;

    let image_paths = WalkDir::new(&cli.input_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && ImageFormat::from_path(e.path()).is_ok())
        .map(|e| e.into_path())
        .collect::<Vec<_>>();
    info!(count = image_paths.len(), input_dir = %cli.input_dir.display(), "Collected images");

    let progress_bar = ProgressBar::new(image_paths.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
        )?
        .progress_chars("#>-"),
    );

    let failures = AtomicUsize::new(0);
    image_paths
        .par_iter()
        .progress_with(progress_bar.clone())
        .try_for_each(|path| -> Result<()> {
            let output_path = construct_output_path(path, &cli)?;
            let result = processor.process_path_to_file(path, &output_path);
            if !result.success {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    path = %path.display(),
                    kind = ?result.error_kind,
                    "{}",
                    result.error_message
                );
            }
            Ok(())
        })?;

    progress_bar.finish();

    let failed = failures.into_inner();
    println!(
        "Processed {} images: {} succeeded, {} failed",
        image_paths.len(),
        image_paths.len() - failed,
        failed
    );
    Ok(())
}

fn relocate(path: &Path, prefix: &Path, new_prefix: &Path) -> Result<PathBuf> {
    let relative = path
        .strip_prefix(prefix)
        .with_context(|| format!("{} is outside {}", path.display(), prefix.display()))?;
    Ok(new_prefix.join(relative))
}

fn construct_output_path(path: &Path, cli: &Cli) -> Result<PathBuf> {
    let output_path = relocate(path, &cli.input_dir, &cli.output_dir)?;
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(output_path.with_extension(&cli.format))
}
