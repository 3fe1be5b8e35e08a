//! Leaf Diagnosis CLI
//!
//! Command-line entry point: diagnose a leaf photo, check its focus, or list
//! the supported species.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use leaf_diagnosis::backend::backend_name;
use leaf_diagnosis::utils::logging::{init_logging, LogConfig};
use leaf_diagnosis::{
    BlurAssessment, ConfidenceBand, Diagnoser, DiagnosisConfig, DiagnosisOutcome,
    DiagnosisResult, SpeciesTaxonomy,
};

/// Exit status for a photo rejected as blurry
const EXIT_BLURRY: u8 = 2;

/// Species-constrained plant leaf disease diagnosis
#[derive(Parser, Debug)]
#[command(name = "leaf-diagnosis")]
#[command(version)]
#[command(about = "Diagnose plant leaf disease from a photo and a crop species", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "LEAF_DIAGNOSIS_CONFIG")]
    config: Option<PathBuf>,

    /// Model file, overrides the configuration
    #[arg(short, long, global = true, env = "LEAF_DIAGNOSIS_MODEL")]
    model: Option<PathBuf>,

    /// Species taxonomy JSON manifest, overrides the configuration
    #[arg(short, long, global = true, env = "LEAF_DIAGNOSIS_TAXONOMY")]
    taxonomy: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Diagnose a leaf photo for a given species
    Diagnose {
        /// Path to the leaf photo
        #[arg(short, long)]
        image: PathBuf,

        /// Species key, e.g. "Tomato" or "Corn_(maize)"
        #[arg(short, long)]
        species: String,

        /// One forward pass instead of the TTA ensemble
        #[arg(long, default_value = "false")]
        single: bool,

        /// Print the outcome as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Check whether a photo is sharp enough to diagnose
    Blur {
        /// Path to the photo
        #[arg(short, long)]
        image: PathBuf,

        /// Print the assessment as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List supported species and their diseases
    Species {
        /// Print the listing as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = DiagnosisConfig::load_or_default(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config = config.with_model_path(model);
    }
    if let Some(taxonomy) = cli.taxonomy {
        config = config.with_taxonomy_path(taxonomy);
    }

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        config.logging.clone()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Diagnose {
            image,
            species,
            single,
            json,
        } => cmd_diagnose(&config, &image, &species, single, json),
        Commands::Blur { image, json } => cmd_blur(&config, &image, json),
        Commands::Species { json } => cmd_species(&config, json),
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))
}

fn cmd_diagnose(
    config: &DiagnosisConfig,
    image: &Path,
    species: &str,
    single: bool,
    json: bool,
) -> Result<ExitCode> {
    let bytes = read_image(image)?;
    let diagnoser = Diagnoser::from_config(config)?;

    info!(
        image = %image.display(),
        species,
        engine = %config.model.backend,
        backend = backend_name(),
        "diagnosing"
    );

    let outcome = if single {
        diagnoser.diagnose_single(&bytes, species)?
    } else {
        diagnoser.diagnose(&bytes, species)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    match outcome {
        DiagnosisOutcome::Diagnosed(result) => {
            if !json {
                print_diagnosis(&result);
            }
            Ok(ExitCode::SUCCESS)
        }
        DiagnosisOutcome::Rejected(blur) => {
            if !json {
                print_blur(&blur);
            }
            Ok(ExitCode::from(EXIT_BLURRY))
        }
    }
}

fn cmd_blur(config: &DiagnosisConfig, image: &Path, json: bool) -> Result<ExitCode> {
    let bytes = read_image(image)?;
    let diagnoser = Diagnoser::from_config(config)?;
    let blur = diagnoser.assess_blur(&bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&blur)?);
    } else {
        print_blur(&blur);
    }

    Ok(if blur.is_blurry {
        ExitCode::from(EXIT_BLURRY)
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_species(config: &DiagnosisConfig, json: bool) -> Result<ExitCode> {
    let taxonomy = match &config.taxonomy.path {
        Some(path) => SpeciesTaxonomy::from_json_file(path, config.model.num_classes)?,
        None => SpeciesTaxonomy::plantvillage()?,
    };
    let summaries = taxonomy.summaries();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Supported species:".cyan().bold());
    for species in &summaries {
        println!();
        println!("  {} ({})", species.label.bold(), species.key.dimmed());
        for disease in &species.diseases {
            println!("    {:>2}  {}", disease.index, disease.label);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_diagnosis(result: &DiagnosisResult) {
    let band = match result.confidence_band {
        ConfidenceBand::High => result.confidence_band.to_string().green(),
        ConfidenceBand::Moderate => result.confidence_band.to_string().yellow(),
        ConfidenceBand::Low => result.confidence_band.to_string().red(),
    };

    println!("{}", "Diagnosis:".cyan().bold());
    println!("  Species:    {}", result.species_name);
    println!("  Condition:  {}", result.disease_name.bold());
    println!("  Class:      {} ({})", result.class_index, result.disease_key);
    println!(
        "  Confidence: {:.2}% [{}]",
        result.confidence_percent, band
    );
    println!("  Logit:      {:.4}", result.winning_logit);
}

fn print_blur(blur: &BlurAssessment) {
    if blur.is_blurry {
        println!("{}", "Image is too blurry to diagnose.".yellow().bold());
        println!(
            "  Sharpness score {:.2} is below the threshold of {:.2}.",
            blur.variance_score, blur.threshold
        );
        println!("  Retake the photo with the leaf in focus and steady lighting.");
    } else {
        println!("{}", "Image is sharp enough.".green().bold());
        println!(
            "  Sharpness score {:.2} (threshold {:.2}).",
            blur.variance_score, blur.threshold
        );
    }
}
