//! CLI Application logic
//!
//! Contains the command-line interface implementation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use oxlate_ooxml::{extract, FilterParams, PackageDiff, PackageUnits};

#[derive(Parser)]
#[command(name = "oxlate")]
#[command(author, version, about = "Lossless text extraction for Office documents", long_about = None)]
struct Cli {
    /// Log every part and merge decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract translatable text units to a JSON file
    Extract {
        /// Input .docx, .xlsx or .pptx file
        input: PathBuf,

        /// Output JSON file (defaults to <input>.units.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Filter configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Merge translated units back into the original document
    Merge {
        /// Original document
        input: PathBuf,

        /// JSON file with translated units
        #[arg(short, long)]
        units: PathBuf,

        /// Output document
        #[arg(short, long)]
        output: PathBuf,

        /// Filter configuration used for extraction (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Extract and merge back in one step
    Roundtrip {
        /// Input document
        input: PathBuf,

        /// Output document
        #[arg(short, long)]
        output: PathBuf,

        /// Replace every text with an uppercase pseudo-translation
        #[arg(long)]
        pseudo: bool,

        /// Filter configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compare two documents part by part
    Diff {
        /// Expected document
        expected: PathBuf,

        /// Actual document
        actual: PathBuf,
    },

    /// Print the effective filter configuration
    Config {
        /// Filter configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Run the CLI application
///
/// This is the main entry point for the command-line interface.
/// It parses arguments and dispatches to the appropriate command.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Extract {
            input,
            output,
            config,
        } => {
            let params = load_params(config.as_deref())?;
            let output = output.unwrap_or_else(|| default_units_path(&input));
            let count = extract_command(&input, &output, &params)?;
            println!("Extracted {} units to {}", count, output.display());
        }
        Commands::Merge {
            input,
            units,
            output,
            config,
        } => {
            let params = load_params(config.as_deref())?;
            merge_command(&input, &units, &output, &params)?;
            println!("Created: {}", output.display());
        }
        Commands::Roundtrip {
            input,
            output,
            pseudo,
            config,
        } => {
            let params = load_params(config.as_deref())?;
            roundtrip_command(&input, &output, pseudo, &params)?;
            println!("Created: {}", output.display());
        }
        Commands::Diff { expected, actual } => {
            let differences = diff_command(&expected, &actual)?;
            if differences.is_empty() {
                println!("No differences");
            } else {
                for difference in &differences {
                    println!("{difference}");
                }
                anyhow::bail!("{} part(s) differ", differences.len());
            }
        }
        Commands::Config { config } => {
            let params = load_params(config.as_deref())?;
            let toml = params
                .to_toml_string()
                .context("Failed to render configuration")?;
            print!("{toml}");
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    // A subscriber may already be installed when run from tests
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .try_init();
}

/// Filter configuration from a TOML file, or the defaults
pub fn load_params(path: Option<&Path>) -> Result<FilterParams> {
    match path {
        Some(path) => FilterParams::load(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display())),
        None => Ok(FilterParams::default()),
    }
}

fn default_units_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".units.json");
    PathBuf::from(name)
}

fn read_input(input: &Path) -> Result<Vec<u8>> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    fs::read(input).with_context(|| format!("Failed to read: {}", input.display()))
}

/// Extract the units of `input` into a JSON file; returns the unit count
pub fn extract_command(input: &Path, output: &Path, params: &FilterParams) -> Result<usize> {
    let bytes = read_input(input)?;
    let extracted = extract(&bytes, params)
        .with_context(|| format!("Failed to extract document: {}", input.display()))?;
    let units = extracted.units();
    info!(input = %input.display(), units = units.unit_count(), "extracted");

    let json = units.to_json().context("Failed to serialize units")?;
    fs::write(output, json)
        .with_context(|| format!("Failed to write units file: {}", output.display()))?;
    Ok(units.unit_count())
}

/// Merge the translated units in `units` into `input`, writing `output`
pub fn merge_command(
    input: &Path,
    units: &Path,
    output: &Path,
    params: &FilterParams,
) -> Result<()> {
    let bytes = read_input(input)?;
    let json = fs::read_to_string(units)
        .with_context(|| format!("Failed to read units file: {}", units.display()))?;
    let translations = PackageUnits::from_json(&json)
        .with_context(|| format!("Failed to parse units file: {}", units.display()))?;

    let extracted = extract(&bytes, params)
        .with_context(|| format!("Failed to extract document: {}", input.display()))?;
    let merged = extracted
        .merge(&translations)
        .with_context(|| format!("Failed to merge into: {}", input.display()))?;
    fs::write(output, merged)
        .with_context(|| format!("Failed to write document: {}", output.display()))?;
    Ok(())
}

/// Extract and merge `input`, optionally with an uppercase pseudo-translation
pub fn roundtrip_command(
    input: &Path,
    output: &Path,
    pseudo: bool,
    params: &FilterParams,
) -> Result<()> {
    let bytes = read_input(input)?;
    let extracted = extract(&bytes, params)
        .with_context(|| format!("Failed to extract document: {}", input.display()))?;
    let mut units = extracted.units();
    if pseudo {
        units.translate_with(|text| text.to_uppercase());
    }
    let merged = extracted
        .merge(&units)
        .with_context(|| format!("Failed to merge into: {}", input.display()))?;
    fs::write(output, merged)
        .with_context(|| format!("Failed to write document: {}", output.display()))?;
    Ok(())
}

/// Differences between two documents, as display lines
pub fn diff_command(expected: &Path, actual: &Path) -> Result<Vec<String>> {
    let left = read_input(expected)?;
    let right = read_input(actual)?;
    let differences = PackageDiff::compare(&left, &right)
        .with_context(|| format!("Failed to compare {} and {}", expected.display(), actual.display()))?;
    Ok(differences.iter().map(ToString::to_string).collect())
}
