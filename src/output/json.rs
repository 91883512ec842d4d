//! JSON batch report.

use crate::config::EngineSettings;
use crate::constants::reports;
use crate::detector::{DetectionMode, DetectionOutcome};
use crate::error::{Error, Result};
use crate::pipeline::ProcessingStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Settings recorded in the report.
#[derive(Debug, Serialize)]
pub struct JsonSettings {
    /// Minimum confidence threshold.
    pub confidence_threshold: f64,
    /// Country code passed to the classifier.
    pub country_code: String,
    /// Number of worker threads.
    pub max_workers: usize,
}

impl From<&EngineSettings> for JsonSettings {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            country_code: settings.country_code.clone(),
            max_workers: settings.max_workers,
        }
    }
}

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    /// Report creation time.
    pub generated: DateTime<Utc>,
    /// Backend used for the batch.
    pub mode: Option<DetectionMode>,
    /// Settings in effect.
    pub settings: JsonSettings,
    /// Batch statistics.
    pub statistics: &'a ProcessingStats,
    /// Per-image outcomes.
    pub results: &'a [DetectionOutcome],
}

/// Write `report` to `<output_dir>/wildlife_detection_<timestamp>.json`.
pub fn write_json_report(output_dir: &Path, timestamp: &str, report: &JsonReport<'_>) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir).map_err(|e| Error::OutputDirCreateFailed {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let path = output_dir.join(format!("{}_{timestamp}.json", reports::JSON_PREFIX));
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, report).map_err(|e| Error::JsonWrite {
        path: path.clone(),
        source: e,
    })?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!("JSON report exported to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_write_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = vec![DetectionOutcome::failure(
            "cam/IMG_1.JPG".into(),
            DetectionMode::Mock,
            "image file not found: cam/IMG_1.JPG",
        )];
        let stats = ProcessingStats {
            total_images: 1,
            processed_images: 1,
            failed_detections: 1,
            ..ProcessingStats::default()
        };
        let settings = EngineSettings::default();
        let report = JsonReport {
            generated: Utc::now(),
            mode: Some(DetectionMode::Mock),
            settings: JsonSettings::from(&settings),
            statistics: &stats,
            results: &outcomes,
        };

        let path = write_json_report(dir.path(), "20240101_000000", &report).unwrap();
        assert!(path.ends_with("wildlife_detection_20240101_000000.json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["mode"], "mock");
        assert_eq!(value["settings"]["country_code"], "JPN");
        assert_eq!(value["statistics"]["failed_detections"], 1);
        assert_eq!(value["results"][0]["success"], false);
        assert!(value["results"][0]["metadata"].is_null());
    }
}
