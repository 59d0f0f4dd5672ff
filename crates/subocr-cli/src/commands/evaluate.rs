//! Evaluate command - score detections against ground truth.

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use subocr_core::metrics::{evaluate_dataset, evaluate_dataset_thresholds, load_annotations};

/// Arguments for the evaluate command.
#[derive(Args)]
pub struct EvaluateArgs {
    /// Ground truth annotations (JSON, one entry per image)
    ground_truth: PathBuf,

    /// Detections (JSON, one entry per image, e.g. `subocr process` output)
    detections: PathBuf,

    /// Sweep confidence cutoffs from 0.3 to 0.9
    #[arg(long)]
    thresholds: bool,

    /// Print JSON instead of a summary
    #[arg(long)]
    json: bool,
}

pub fn run(args: EvaluateArgs) -> anyhow::Result<()> {
    let ground_truth = load_annotations(&args.ground_truth)?;
    let detections = load_annotations(&args.detections)?;
    info!("Evaluating {} images", ground_truth.len());

    if args.thresholds {
        let report = evaluate_dataset_thresholds(&ground_truth, &detections)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        for entry in &report.thresholds {
            println!(
                "threshold {:.1}: precision {:.4}  recall {:.4}  hmean {:.4}",
                entry.threshold,
                entry.metrics.precision,
                entry.metrics.recall,
                entry.metrics.hmean
            );
        }
        if let Some(best) = report.best() {
            println!(
                "{} best hmean {:.4} at threshold {:.1}",
                style("✓").green(),
                best.metrics.hmean,
                best.threshold
            );
        }
    } else {
        let metrics = evaluate_dataset(&ground_truth, &detections)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&metrics)?);
            return Ok(());
        }
        println!("precision: {:.4}", metrics.precision);
        println!("recall:    {:.4}", metrics.recall);
        println!("hmean:     {:.4}", metrics.hmean);
    }
    Ok(())
}
