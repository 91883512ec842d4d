//! CSV report export and import.

use crate::constants::{UTF8_BOM, confidence::DECIMAL_PLACES, reports};
use crate::detector::{BboxFormat, Detection, DetectionMode, DetectionOutcome, file_name_of};
use crate::error::{Error, Result};
use crate::pipeline::ProcessingStats;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const DETAILED_HEADER: [&str; 11] = [
    "Image File",
    "Detection Count",
    "Species Name",
    "Scientific Name",
    "Common Name",
    "Category",
    "Confidence",
    "Bounding Box",
    "Processing Time (s)",
    "Status",
    "Error Message",
];

const STATUS_SUCCESS: &str = "Success";
const STATUS_FAILED: &str = "Failed";
const NO_DETECTION: &str = "No detection";

/// Paths of the files written by [`ReportExporter::export_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    /// One row per detection.
    pub detailed: PathBuf,
    /// Totals and species counts.
    pub summary: PathBuf,
    /// Per-species confidence statistics.
    pub species: PathBuf,
    /// Failed images, only written when there are any.
    pub errors: Option<PathBuf>,
}

/// Writes timestamped CSV reports into one directory.
#[derive(Debug, Clone)]
pub struct ReportExporter {
    output_dir: PathBuf,
    bom: bool,
}

impl ReportExporter {
    /// Create an exporter writing into `output_dir`, with a UTF-8 BOM.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            bom: true,
        }
    }

    /// Enable or disable the UTF-8 BOM prefix.
    #[must_use]
    pub const fn with_bom(mut self, bom: bool) -> Self {
        self.bom = bom;
        self
    }

    /// Report directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write all reports stamped with the current local time.
    pub fn export_all(
        &self,
        outcomes: &[DetectionOutcome],
        stats: &ProcessingStats,
    ) -> Result<ReportFiles> {
        let timestamp = chrono::Local::now()
            .format(reports::TIMESTAMP_FORMAT)
            .to_string();
        self.export_all_at(outcomes, stats, &timestamp)
    }

    /// Write all reports with an explicit file name timestamp.
    pub fn export_all_at(
        &self,
        outcomes: &[DetectionOutcome],
        stats: &ProcessingStats,
        timestamp: &str,
    ) -> Result<ReportFiles> {
        self.ensure_output_dir()?;

        let files = ReportFiles {
            detailed: self.export_detailed_results(outcomes, timestamp)?,
            summary: self.export_summary(outcomes, stats, timestamp)?,
            species: self.export_species_stats(outcomes, timestamp)?,
            errors: if stats.errors.is_empty() {
                None
            } else {
                Some(self.export_errors(stats, timestamp)?)
            },
        };
        info!(
            "CSV export completed: {} files created in {}",
            3 + usize::from(files.errors.is_some()),
            self.output_dir.display()
        );
        Ok(files)
    }

    fn ensure_output_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| Error::OutputDirCreateFailed {
            path: self.output_dir.clone(),
            source: e,
        })
    }

    fn report_path(&self, prefix: &str, timestamp: &str) -> PathBuf {
        self.output_dir.join(format!("{prefix}_{timestamp}.csv"))
    }

    fn open(&self, path: &Path) -> Result<::csv::Writer<BufWriter<File>>> {
        let mut file = BufWriter::new(File::create(path)?);
        if self.bom {
            file.write_all(UTF8_BOM)?;
        }
        Ok(::csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file))
    }

    /// Detailed results: one row per detection, or one row per image
    /// without detections.
    pub fn export_detailed_results(
        &self,
        outcomes: &[DetectionOutcome],
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self.report_path(reports::DETAILED_PREFIX, timestamp);
        let mut writer = self.open(&path)?;
        let write_err = |e| Error::ReportWrite {
            path: path.clone(),
            source: e,
        };

        writer.write_record(DETAILED_HEADER).map_err(write_err)?;
        for outcome in outcomes {
            let image = outcome.file_name();
            let time = format!("{:.3}", outcome.processing_time);

            if outcome.detections.is_empty() {
                let (species, status) = if outcome.success {
                    (NO_DETECTION, STATUS_SUCCESS)
                } else {
                    ("Error", STATUS_FAILED)
                };
                writer
                    .write_record([
                        image.as_str(),
                        "0",
                        species,
                        "",
                        "",
                        "",
                        "",
                        "",
                        time.as_str(),
                        status,
                        outcome.error_message.as_deref().unwrap_or_default(),
                    ])
                    .map_err(write_err)?;
                continue;
            }

            let count = outcome.detections.len().to_string();
            for detection in &outcome.detections {
                writer
                    .write_record([
                        image.as_str(),
                        count.as_str(),
                        detection.common_name.as_str(),
                        detection.scientific_name.as_str(),
                        detection.english_name.as_str(),
                        detection.category.as_str(),
                        format_confidence(detection.confidence).as_str(),
                        format_bbox(detection.bbox).as_str(),
                        time.as_str(),
                        STATUS_SUCCESS,
                        "",
                    ])
                    .map_err(write_err)?;
            }
        }
        writer.flush()?;

        info!("Detailed results exported to: {}", path.display());
        Ok(path)
    }

    /// Processing summary with totals and species counts.
    pub fn export_summary(
        &self,
        outcomes: &[DetectionOutcome],
        stats: &ProcessingStats,
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self.report_path(reports::SUMMARY_PREFIX, timestamp);
        let mut writer = self.open(&path)?;
        let write_err = |e| Error::ReportWrite {
            path: path.clone(),
            source: e,
        };

        let with_detections = outcomes
            .iter()
            .filter(|o| o.success && !o.detections.is_empty())
            .count();
        let failed = outcomes.iter().filter(|o| !o.success).count();
        let animals: usize = outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.detections.len())
            .sum();
        let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let rows: Vec<Vec<String>> = vec![
            vec!["Wildlife Detector Processing Summary".to_string()],
            vec!["Generated".to_string(), generated],
            vec![String::new()],
            vec!["Item".to_string(), "Value".to_string()],
            vec!["Total Images".to_string(), outcomes.len().to_string()],
            vec!["Successful Detections".to_string(), with_detections.to_string()],
            vec!["Failed Detections".to_string(), failed.to_string()],
            vec!["Total Animals Detected".to_string(), animals.to_string()],
            vec![
                "Processing Time (s)".to_string(),
                format!("{:.2}", stats.processing_time),
            ],
            vec![
                "Average Time per Image (s)".to_string(),
                format!("{:.3}", stats.average_time_per_image()),
            ],
            vec![
                "Success Rate (%)".to_string(),
                format!("{:.1}", stats.success_rate()),
            ],
            vec![String::new()],
        ];
        for row in rows {
            writer.write_record(&row).map_err(write_err)?;
        }

        if !stats.species_counts.is_empty() {
            writer
                .write_record(["Species Detection Statistics"])
                .map_err(write_err)?;
            writer
                .write_record(["Species Name", "Detection Count"])
                .map_err(write_err)?;
            for (species, count) in stats.species_by_count() {
                writer
                    .write_record([species, count.to_string().as_str()])
                    .map_err(write_err)?;
            }
        }
        writer.flush()?;

        info!("Summary exported to: {}", path.display());
        Ok(path)
    }

    /// Per-species detection counts and confidence range, most frequent first.
    pub fn export_species_stats(
        &self,
        outcomes: &[DetectionOutcome],
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self.report_path(reports::SPECIES_PREFIX, timestamp);
        let mut writer = self.open(&path)?;
        let write_err = |e| Error::ReportWrite {
            path: path.clone(),
            source: e,
        };

        writer
            .write_record([
                "Species Name",
                "Scientific Name",
                "Total Detections",
                "Images with Detection",
                "Average Confidence",
                "Maximum Confidence",
                "Minimum Confidence",
            ])
            .map_err(write_err)?;
        for species in species_summaries(outcomes) {
            writer
                .write_record([
                    species.name.as_str(),
                    species.scientific_name.as_str(),
                    species.confidences.len().to_string().as_str(),
                    species.images.len().to_string().as_str(),
                    format_confidence(species.mean_confidence()).as_str(),
                    format_confidence(species.max_confidence()).as_str(),
                    format_confidence(species.min_confidence()).as_str(),
                ])
                .map_err(write_err)?;
        }
        writer.flush()?;

        info!("Species statistics exported to: {}", path.display());
        Ok(path)
    }

    /// Failed images with their error messages.
    pub fn export_errors(&self, stats: &ProcessingStats, timestamp: &str) -> Result<PathBuf> {
        let path = self.report_path(reports::ERRORS_PREFIX, timestamp);
        let mut writer = self.open(&path)?;
        let write_err = |e| Error::ReportWrite {
            path: path.clone(),
            source: e,
        };

        writer
            .write_record(["Image File", "Error Details"])
            .map_err(write_err)?;
        for error in &stats.errors {
            writer
                .write_record([error.image.as_str(), error.error.as_str()])
                .map_err(write_err)?;
        }
        writer.flush()?;

        info!("Error log exported to: {}", path.display());
        Ok(path)
    }
}

/// Aggregated detections of one display name.
struct SpeciesSummary {
    name: String,
    scientific_name: String,
    confidences: Vec<f64>,
    images: BTreeSet<String>,
}

impl SpeciesSummary {
    #[allow(clippy::cast_precision_loss)]
    fn mean_confidence(&self) -> f64 {
        self.confidences.iter().sum::<f64>() / self.confidences.len() as f64
    }

    fn max_confidence(&self) -> f64 {
        self.confidences.iter().copied().fold(f64::MIN, f64::max)
    }

    fn min_confidence(&self) -> f64 {
        self.confidences.iter().copied().fold(f64::MAX, f64::min)
    }
}

fn species_summaries(outcomes: &[DetectionOutcome]) -> Vec<SpeciesSummary> {
    let mut summaries: Vec<SpeciesSummary> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for outcome in outcomes.iter().filter(|o| o.success) {
        for detection in &outcome.detections {
            let slot = *index
                .entry(detection.common_name.as_str())
                .or_insert_with(|| {
                    summaries.push(SpeciesSummary {
                        name: detection.common_name.clone(),
                        scientific_name: detection.scientific_name.clone(),
                        confidences: Vec::new(),
                        images: BTreeSet::new(),
                    });
                    summaries.len() - 1
                });
            summaries[slot].confidences.push(detection.confidence);
            summaries[slot].images.insert(outcome.file_name());
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    summaries.sort_by(|a, b| b.confidences.len().cmp(&a.confidences.len()));
    summaries
}

fn format_confidence(value: f64) -> String {
    format!("{value:.DECIMAL_PLACES$}")
}

fn format_bbox(bbox: Option<[f64; 4]>) -> String {
    bbox.map(|[x1, y1, x2, y2]| format!("{x1:.3},{y1:.3},{x2:.3},{y2:.3}"))
        .unwrap_or_default()
}

fn parse_bbox(value: &str) -> Option<[f64; 4]> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    <[f64; 4]>::try_from(parts.get(..4)?).ok()
}

/// Row of a detailed-results report.
#[derive(Debug, Deserialize)]
struct DetailedRow {
    #[serde(rename = "Image File")]
    image_file: String,
    #[serde(rename = "Detection Count", default)]
    detection_count: String,
    #[serde(rename = "Species Name", default)]
    species_name: String,
    #[serde(rename = "Scientific Name", default)]
    scientific_name: String,
    #[serde(rename = "Common Name", default)]
    common_name: String,
    #[serde(rename = "Category", default)]
    category: String,
    #[serde(rename = "Confidence", default)]
    confidence: String,
    #[serde(rename = "Bounding Box", default)]
    bounding_box: String,
    #[serde(rename = "Processing Time (s)", default)]
    processing_time: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Error Message", default)]
    error_message: String,
}

fn parse_number<T: std::str::FromStr>(
    path: &Path,
    line: usize,
    column: &str,
    value: &str,
) -> Result<T> {
    // Blank numeric cells read as zero.
    let value = match value.trim() {
        "" => "0",
        trimmed => trimmed,
    };
    value.parse().map_err(|_| Error::ReportFormat {
        path: path.to_path_buf(),
        line,
        message: format!("invalid {column} '{value}'"),
    })
}

/// Read a detailed-results report back into outcomes.
///
/// Rows are grouped by image file in first-seen order. Outcomes are
/// recorded with mode [`DetectionMode::SpeciesNet`]; only the image file
/// name is available, so `image_path` holds that name.
pub fn import_detailed_results(path: &Path) -> Result<Vec<DetectionOutcome>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::ReportRead {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut outcomes: Vec<DetectionOutcome> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (row_num, result) in reader.deserialize::<DetailedRow>().enumerate() {
        let line = row_num + 2;
        let row = result.map_err(|e| Error::ReportRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        if row.image_file.is_empty() {
            continue;
        }

        let slot = match index.get(&row.image_file) {
            Some(slot) => *slot,
            None => {
                let success = row.status == STATUS_SUCCESS;
                let mut outcome = if success {
                    DetectionOutcome::success(
                        PathBuf::from(&row.image_file),
                        DetectionMode::SpeciesNet,
                        Vec::new(),
                    )
                } else {
                    DetectionOutcome::failure(
                        PathBuf::from(&row.image_file),
                        DetectionMode::SpeciesNet,
                        row.error_message.clone(),
                    )
                };
                outcome.processing_time =
                    parse_number(path, line, "processing time", &row.processing_time)?;
                outcomes.push(outcome);
                index.insert(row.image_file.clone(), outcomes.len() - 1);
                outcomes.len() - 1
            }
        };

        let count: usize = parse_number(path, line, "detection count", &row.detection_count)?;
        if row.status != STATUS_SUCCESS
            || count == 0
            || row.species_name.is_empty()
            || row.species_name == NO_DETECTION
        {
            continue;
        }

        let detection = Detection {
            common_name: row.species_name,
            scientific_name: row.scientific_name,
            english_name: row.common_name,
            category: row.category.parse().unwrap_or_default(),
            confidence: parse_number(path, line, "confidence", &row.confidence)?,
            bbox: parse_bbox(&row.bounding_box),
            bbox_format: BboxFormat::Normalized,
        };
        let outcome = &mut outcomes[slot];
        if outcome.success {
            outcome.detections.push(detection);
        }
    }

    info!(
        "Imported {} detection results from {}",
        outcomes.len(),
        file_name_of(path)
    );
    Ok(outcomes)
}
