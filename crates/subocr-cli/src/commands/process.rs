//! Process command - run the OCR pipeline over image files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::{Pattern, glob};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use subocr_core::{ExecutionContext, OcrResult, SubtitleOcr};

use super::load_config;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input images, directories or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Model directory (overrides config)
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Skip detection and read each image as a single line
    #[arg(long)]
    no_det: bool,

    /// Skip recognition and output regions only
    #[arg(long)]
    no_rec: bool,

    /// Output free polygons instead of oriented boxes
    #[arg(long)]
    polygon: bool,

    /// Keep word-level boxes instead of merging them into lines
    #[arg(long)]
    no_merge: bool,

    /// Number of parallel workers (0 = one per core); model inference runs one call at a time per device
    #[arg(short = 'j', long, default_value = "0")]
    jobs: usize,

    /// Run on a CUDA device
    #[arg(long, value_name = "DEVICE_ID")]
    cuda: Option<i32>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON array of per-image results
    Json,
    /// Recognized text per image
    Text,
}

pub fn run(args: ProcessArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(dir) = &args.model_dir {
        config.models.model_dir = dir.clone();
    }
    config.pipeline.enable_detection &= !args.no_det;
    config.pipeline.enable_recognition &= !args.no_rec;
    config.pipeline.output_polygon |= args.polygon;
    config.pipeline.merge_lines &= !args.no_merge;

    let files = expand_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No image files found in: {}", args.inputs.join(", "));
    }
    info!("Processing {} images", files.len());

    let ctx = match args.cuda {
        Some(id) => ExecutionContext::cuda(id),
        None => ExecutionContext::cpu(),
    };
    let ocr = SubtitleOcr::from_config(&config, &ctx)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images",
        )?
        .progress_chars("=>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs)
        .build()?;
    let outcomes: Vec<(PathBuf, subocr_core::Result<OcrResult>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let result = ocr.process_path(&ctx, path);
                pb.inc(1);
                (path.clone(), result)
            })
            .collect()
    });
    pb.finish_and_clear();

    let mut results = Vec::with_capacity(outcomes.len());
    let mut failed = 0;
    for (path, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) if args.continue_on_error => {
                failed += 1;
                warn!("Failed to process {}: {}", path.display(), e);
            }
            Err(e) => anyhow::bail!("Failed to process {}: {}", path.display(), e),
        }
    }

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&results)?,
        OutputFormat::Text => format_text(&results),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Wrote {} results to {}",
            style("✓").green(),
            results.len(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if failed > 0 {
        eprintln!("{} {} images failed", style("⚠").yellow(), failed);
    }
    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}

fn format_text(results: &[OcrResult]) -> String {
    results
        .iter()
        .map(|result| {
            let name = result
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            format!("{}:\n{}", name, result.text())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Expand directories and glob patterns into a sorted list of image files.
/// Plain file arguments are kept as given.
fn expand_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let pattern = format!("{}/*", Pattern::escape(input));
            let mut found: Vec<PathBuf> = glob(&pattern)?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            found.sort();
            files.extend(found);
        } else if input.contains(['*', '?', '[']) {
            let mut found: Vec<PathBuf> = glob(input)?
                .filter_map(|r| r.ok())
                .filter(|p| is_image(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}
