//! Trapcam - wildlife species detection for camera-trap images.
//!
//! This crate runs an external species classifier over batches of images,
//! normalizes its taxonomic output and writes CSV/JSON reports.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod detector;
pub mod error;
pub mod output;
pub mod pipeline;

use clap::Parser;
use cli::{AnalyzeArgs, Cli, Command, ConfigAction};
use config::{
    Config, EngineSettings, config_file_path, load_config, save_config, validate_settings,
};
use output::{JsonReport, JsonSettings, ReportExporter, progress, write_json_report};
use pipeline::{BatchEngine, ProcessingStats, ProgressUpdate, collect_image_files};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use error::{Error, Result};

/// Number of species listed in the run summary.
const SUMMARY_TOP_SPECIES: usize = 10;

/// Main entry point for trapcam CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.analyze.verbose, cli.analyze.quiet);

    if let Some(command) = cli.command {
        return handle_command(command, cli.config.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;

    if cli.inputs.is_empty() {
        cli::help::print_smart_help(&config);
        return Ok(());
    }

    analyze_images(&cli.inputs, &cli.analyze, &config)
}

/// Merge configuration, CLI flags and `--set` overrides into engine settings.
///
/// Precedence: overrides > flags > config file.
pub fn build_settings(args: &AnalyzeArgs, config: &Config) -> Result<EngineSettings> {
    let mut settings = config.engine_settings();

    if let Some(mode) = args.mode {
        settings.mode = mode.detection_mode();
    }
    if let Some(workers) = args.workers {
        settings.max_workers = usize::from(workers);
    }
    if let Some(threshold) = args.min_confidence {
        settings.confidence_threshold = threshold;
    }
    if let Some(country) = &args.country {
        settings.country_code.clone_from(country);
    }
    if let Some(timeout) = args.timeout {
        settings.timeout_secs = timeout;
    }
    if let Some(max_mb) = args.max_size_mb {
        settings.max_image_size_mb = max_mb;
    }
    for (key, value) in &args.overrides {
        settings.set(key, value)?;
    }

    validate_settings(&settings)?;
    Ok(settings)
}

/// Detect species in all images under `inputs` and write reports.
fn analyze_images(inputs: &[PathBuf], args: &AnalyzeArgs, config: &Config) -> Result<()> {
    let settings = build_settings(args, config)?;
    let recursive = config.output.recursive && !args.no_recursive;

    let files = collect_image_files(inputs, config.output.extensions.as_slice(), recursive)?;
    if files.is_empty() {
        return Err(Error::NoValidImageFiles);
    }
    info!("Found {} image file(s) to process", files.len());

    if settings.use_gpu {
        debug!("GPU requested; device selection is left to the classifier");
    }

    let mut engine = BatchEngine::new(settings);
    engine.initialize()?;
    info!(
        "Estimated processing time: {:.0}s",
        engine.estimate_processing_time(files.len())
    );

    install_interrupt_handler(&engine);

    let progress_enabled = !args.quiet && !args.no_progress;
    let bar = progress::create_batch_progress(files.len(), progress_enabled);
    let on_progress = |update: &ProgressUpdate| progress::apply_update(bar.as_ref(), update);

    let outcomes = engine.process_batch(&files, Some(&on_progress))?;
    progress::finish_progress(bar, "Complete");

    let stats = engine.get_statistics();
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.directory.clone());
    let timestamp = chrono::Local::now()
        .format(constants::reports::TIMESTAMP_FORMAT)
        .to_string();

    if !args.no_csv {
        let exporter = ReportExporter::new(&output_dir)
            .with_bom(config.output.csv_bom && !args.no_csv_bom);
        let files = exporter.export_all_at(&outcomes, &stats, &timestamp)?;
        info!("Detailed results: {}", files.detailed.display());
    }

    if args.json {
        let report = JsonReport {
            generated: chrono::Utc::now(),
            mode: engine.mode(),
            settings: JsonSettings::from(engine.settings()),
            statistics: &stats,
            results: &outcomes,
        };
        write_json_report(&output_dir, &timestamp, &report)?;
    }

    if !args.quiet {
        print_summary(&stats);
    }
    if stats.failed_detections > 0 {
        warn!("{} image(s) had errors", stats.failed_detections);
    }

    Ok(())
}

/// First Ctrl+C cancels the batch, a second one exits immediately.
fn install_interrupt_handler(engine: &BatchEngine) {
    let handle = engine.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        if handle.is_cancelled() {
            std::process::exit(130); // 128 + SIGINT(2)
        }
        warn!("Interrupt received, finishing in-flight images (press Ctrl+C again to abort)");
        handle.cancel();
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }
}

/// Render the end-of-run summary.
pub fn format_summary(stats: &ProcessingStats) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "Processing summary");
    let _ = writeln!(
        out,
        "  Images processed:  {}/{}",
        stats.processed_images, stats.total_images
    );
    let _ = writeln!(out, "  Successful:        {}", stats.successful_detections);
    let _ = writeln!(out, "  Failed:            {}", stats.failed_detections);
    let _ = writeln!(out, "  Detections:        {}", stats.total_detections);
    let _ = writeln!(
        out,
        "  Time:              {:.2}s ({:.3}s/image)",
        stats.processing_time,
        stats.average_time_per_image()
    );
    let _ = writeln!(out, "  Success rate:      {:.1}%", stats.success_rate());

    let species = stats.species_by_count();
    if !species.is_empty() {
        let _ = writeln!(out, "  Species:");
        for (name, count) in species.into_iter().take(SUMMARY_TOP_SPECIES) {
            let _ = writeln!(out, "    {name}: {count}");
        }
    }
    out
}

#[allow(clippy::print_stdout)]
fn print_summary(stats: &ProcessingStats) {
    print!("{}", format_summary(stats));
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter_str = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    // Logs go to stderr so stdout stays clean for the summary.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_command(command: Command, explicit_config: Option<&Path>) -> Result<()> {
    match command {
        Command::Config { action } => handle_config_command(action, explicit_config),
    }
}

#[allow(clippy::print_stdout)]
fn handle_config_command(action: ConfigAction, explicit_config: Option<&Path>) -> Result<()> {
    let path = match explicit_config {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };

    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                save_config(&Config::default(), &path)?;
                println!("Created configuration file: {}", path.display());
            }
        }
        ConfigAction::Show => {
            let config = load_config(Some(path.as_path()))?;
            let text = toml::to_string_pretty(&config)
                .map_err(|e| Error::ConfigSerialize { source: e })?;
            println!("{text}");
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::detector::DetectionMode;

    fn args(extra: &[&str]) -> AnalyzeArgs {
        let mut argv = vec!["trapcam", "img.jpg"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap().analyze
    }

    #[test]
    fn test_build_settings_defaults_from_config() {
        let mut config = Config::default();
        config.detection.mode = Some(DetectionMode::Mock);
        config.processing.max_workers = 2;
        let settings = build_settings(&args(&[]), &config).unwrap();
        assert_eq!(settings.mode, Some(DetectionMode::Mock));
        assert_eq!(settings.max_workers, 2);
        assert_eq!(settings.country_code, "JPN");
    }

    #[test]
    fn test_build_settings_precedence() {
        let mut config = Config::default();
        config.detection.mode = Some(DetectionMode::SpeciesNet);
        let settings = build_settings(
            &args(&[
                "--mode",
                "auto",
                "-w",
                "8",
                "-c",
                "0.7",
                "--country",
                "usa",
                "--set",
                "confidence_threshold=0.9",
            ]),
            &config,
        )
        .unwrap();
        assert!(settings.mode.is_none());
        assert_eq!(settings.max_workers, 8);
        assert_eq!(settings.country_code, "USA");
        assert_eq!(settings.confidence_threshold, 0.9);
    }

    #[test]
    fn test_build_settings_rejects_unknown_override() {
        let result = build_settings(&args(&["--set", "colour=blue"]), &Config::default());
        assert!(matches!(result, Err(Error::UnknownSetting { .. })));
    }

    #[test]
    fn test_build_settings_validates_merged_result() {
        let mut config = Config::default();
        config.detection.timeout = 0;
        let result = build_settings(&args(&[]), &config);
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));

        // A valid flag repairs an invalid file value.
        let settings = build_settings(&args(&["--timeout", "30"]), &config).unwrap();
        assert_eq!(settings.timeout_secs, 30);

        let result = build_settings(
            &args(&["--set", "max_image_size_mb=NaN"]),
            &Config::default(),
        );
        assert!(matches!(result, Err(Error::InvalidSetting { .. })));
    }

    #[test]
    fn test_format_summary() {
        let mut stats = ProcessingStats {
            total_images: 4,
            processed_images: 4,
            successful_detections: 3,
            failed_detections: 1,
            total_detections: 5,
            processing_time: 8.0,
            ..ProcessingStats::default()
        };
        stats.species_counts.insert("Sus scrofa".to_string(), 3);
        stats.species_counts.insert("Cervus nippon".to_string(), 2);

        let text = format_summary(&stats);
        assert!(text.contains("Images processed:  4/4"));
        assert!(text.contains("Success rate:      75.0%"));
        assert!(text.contains("(2.000s/image)"));
        let sus = text.find("Sus scrofa: 3").unwrap();
        let cervus = text.find("Cervus nippon: 2").unwrap();
        assert!(sus < cervus);
    }
}
