//! Models command - inspect which model files the pipeline would load.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use subocr_core::models::{Language, find_model_file, model_file_pattern};

use super::load_config;

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// Resolve and print the model files for the configured language
    List {
        /// Model directory (overrides config)
        #[arg(short, long)]
        model_dir: Option<PathBuf>,
    },

    /// List supported languages
    Languages,
}

pub fn run(args: ModelsArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::List { model_dir } => list_models(config_path, model_dir),
        ModelsCommand::Languages => {
            for language in Language::SUPPORTED {
                println!("{}", language.code());
            }
            Ok(())
        }
    }
}

fn list_models(config_path: Option<&Path>, model_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = model_dir {
        config.models.model_dir = dir;
    }
    let language = config.language()?;
    let dir = &config.models.model_dir;

    println!(
        "{} Model directory: {}",
        style("ℹ").blue(),
        dir.display()
    );

    let mut missing = 0;
    for kind in [config.detection_model(), config.recognition_model()] {
        match find_model_file(dir, language, &kind) {
            Ok(path) => println!(
                "{} {:<12} {}",
                style("✓").green(),
                kind.stage(),
                path.display()
            ),
            Err(e) => {
                missing += 1;
                println!(
                    "{} {:<12} '{}': {}",
                    style("✗").red(),
                    kind.stage(),
                    model_file_pattern(language, &kind),
                    e
                );
            }
        }
    }

    let alphabet = config.alphabet_path(language);
    if alphabet.is_file() {
        println!("{} {:<12} {}", style("✓").green(), "alphabet", alphabet.display());
    } else {
        missing += 1;
        println!(
            "{} {:<12} {} (not found)",
            style("✗").red(),
            "alphabet",
            alphabet.display()
        );
    }

    if missing > 0 {
        anyhow::bail!("{} model file(s) missing", missing);
    }
    Ok(())
}
