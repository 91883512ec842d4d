//! CLI argument definitions.

use crate::detector::DetectionMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Wildlife species detection for camera-trap images.
#[derive(Debug, Parser)]
#[command(name = "trapcam")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Image files or directories to analyze.
    pub inputs: Vec<PathBuf>,

    /// Configuration file (default: platform config directory).
    #[arg(long, global = true, env = "TRAPCAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Common options for analysis.
    #[command(flatten)]
    pub analyze: AnalyzeArgs,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Detection backend selection, including automatic choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Use `SpeciesNet` if available, otherwise mock.
    Auto,
    /// External `SpeciesNet` classifier.
    #[value(name = "speciesnet")]
    SpeciesNet,
    /// `CameraTrapAI` placeholder.
    #[value(name = "cameratrapai")]
    CameraTrapAi,
    /// `MegaDetector` placeholder.
    #[value(name = "megadetector")]
    MegaDetector,
    /// Synthetic detections for testing.
    Mock,
}

impl ModeArg {
    /// Concrete mode, `None` for automatic selection.
    pub const fn detection_mode(self) -> Option<DetectionMode> {
        match self {
            Self::Auto => None,
            Self::SpeciesNet => Some(DetectionMode::SpeciesNet),
            Self::CameraTrapAi => Some(DetectionMode::CameraTrapAi),
            Self::MegaDetector => Some(DetectionMode::MegaDetector),
            Self::Mock => Some(DetectionMode::Mock),
        }
    }
}

/// Arguments for analysis.
#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct AnalyzeArgs {
    /// Detection backend.
    #[arg(long, value_enum, env = "TRAPCAM_MODE")]
    pub mode: Option<ModeArg>,

    /// Number of worker threads (1 = sequential).
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..), env = "TRAPCAM_WORKERS")]
    pub workers: Option<u16>,

    /// Minimum confidence threshold (0.0-1.0).
    #[arg(short = 'c', long, value_parser = parse_confidence, env = "TRAPCAM_MIN_CONFIDENCE")]
    pub min_confidence: Option<f64>,

    /// ISO-3 country code passed to the classifier (e.g. JPN).
    #[arg(long, value_parser = parse_country, env = "TRAPCAM_COUNTRY")]
    pub country: Option<String>,

    /// Per-image classifier timeout in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), env = "TRAPCAM_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Reject images larger than this many megabytes.
    #[arg(long, value_parser = parse_size_mb, env = "TRAPCAM_MAX_SIZE_MB")]
    pub max_size_mb: Option<f64>,

    /// Report directory.
    #[arg(short, long, env = "TRAPCAM_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only scan the top level of input directories.
    #[arg(long)]
    pub no_recursive: bool,

    /// Do not write CSV reports.
    #[arg(long)]
    pub no_csv: bool,

    /// Also write a JSON report.
    #[arg(long)]
    pub json: bool,

    /// Omit the UTF-8 BOM from CSV reports.
    #[arg(long)]
    pub no_csv_bom: bool,

    /// Override a setting (repeatable), e.g. --set `batch_size=4`.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Only log warnings and errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

/// Parse and validate confidence value.
fn parse_confidence(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "confidence must be between 0.0 and 1.0, got {value}"
        ));
    }

    Ok(value)
}

/// Parse and validate a three-letter country code.
fn parse_country(s: &str) -> Result<String, String> {
    let code = s.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("country code must be three letters, got '{s}'"));
    }
    Ok(code.to_ascii_uppercase())
}

/// Parse and validate a positive size in megabytes.
fn parse_size_mb(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value <= 0.0 || !value.is_finite() {
        return Err(format!("size must be a positive number, got {value}"));
    }

    Ok(value)
}

/// Parse a `key=value` override.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
