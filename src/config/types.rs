//! Configuration type definitions.

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_COUNTRY_CODE,
    DEFAULT_MAX_IMAGE_SIZE_MB, DEFAULT_MAX_WORKERS, DEFAULT_OUTPUT_DIR, DEFAULT_TIMEOUT_SECS,
    IMAGE_EXTENSIONS, speciesnet,
};
use crate::detector::DetectionMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detection settings.
    pub detection: DetectionConfig,

    /// Worker pool and input limits.
    pub processing: ProcessingConfig,

    /// External classifier invocation.
    pub backend: BackendConfig,

    /// Input discovery and report settings.
    pub output: OutputConfig,
}

/// Detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Backend to use. `None` selects automatically.
    pub mode: Option<DetectionMode>,

    /// ISO-3 country code passed to the classifier.
    pub country_code: String,

    /// Minimum confidence for retained detections.
    pub confidence_threshold: f64,

    /// Batch size passed to the classifier.
    pub batch_size: usize,

    /// Per-image classifier timeout in seconds.
    pub timeout: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: None,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of worker threads.
    pub max_workers: usize,

    /// Request GPU inference. Advisory only.
    pub use_gpu: bool,

    /// Images larger than this are rejected before detection.
    pub max_image_size_mb: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            use_gpu: false,
            max_image_size_mb: DEFAULT_MAX_IMAGE_SIZE_MB,
        }
    }
}

/// External classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Python interpreter used when no virtualenv interpreter is found.
    pub python: PathBuf,

    /// Virtualenv whose interpreter is preferred.
    pub venv: Option<PathBuf>,

    /// Module that runs the model.
    pub module: String,

    /// PATH entries containing any of these fragments are hidden from the classifier.
    pub path_exclude: Vec<String>,

    /// Directory for temporary prediction files (default: system temp dir).
    pub work_dir: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from(speciesnet::DEFAULT_PYTHON),
            venv: None,
            module: speciesnet::DEFAULT_MODULE.to_string(),
            path_exclude: speciesnet::DEFAULT_PATH_EXCLUDE
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            work_dir: None,
        }
    }
}

/// Input discovery and report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for reports.
    pub directory: PathBuf,

    /// Walk input directories recursively.
    pub recursive: bool,

    /// Accepted image extensions (without dot).
    pub extensions: Vec<String>,

    /// Prefix CSV reports with a UTF-8 BOM.
    pub csv_bom: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            recursive: true,
            extensions: IMAGE_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
            csv_bom: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.detection.country_code, "JPN");
        assert_eq!(config.detection.confidence_threshold, 0.5);
        assert_eq!(config.detection.timeout, 300);
        assert_eq!(config.processing.max_workers, 4);
        assert_eq!(config.processing.max_image_size_mb, 50.0);
        assert!(config.detection.mode.is_none());
        assert!(config.output.extensions.contains(&"jpg".to_string()));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.detection.mode = Some(DetectionMode::SpeciesNet);
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("mode = \"speciesnet\""));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.detection.mode, Some(DetectionMode::SpeciesNet));
    }
}
