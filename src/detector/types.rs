//! Detection data model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Which backend produced a detection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// `SpeciesNet` classifier run as an external process.
    #[value(name = "speciesnet")]
    SpeciesNet,
    /// Google `CameraTrapAI` (placeholder, behaves like mock).
    #[value(name = "cameratrapai")]
    CameraTrapAi,
    /// `MegaDetector` (placeholder, behaves like mock).
    #[value(name = "megadetector")]
    MegaDetector,
    /// Synthetic detections for testing.
    Mock,
}

impl std::fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpeciesNet => write!(f, "speciesnet"),
            Self::CameraTrapAi => write!(f, "cameratrapai"),
            Self::MegaDetector => write!(f, "megadetector"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "speciesnet" => Ok(Self::SpeciesNet),
            "cameratrapai" => Ok(Self::CameraTrapAi),
            "megadetector" => Ok(Self::MegaDetector),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown detection mode: {other}")),
        }
    }
}

/// Coarse animal class derived from the taxonomic class field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Aves.
    Bird,
    /// Mammalia.
    Mammal,
    /// Reptilia.
    Reptile,
    /// Anything else.
    #[default]
    Animal,
}

impl Category {
    /// Classify from a taxonomic class name (case-insensitive).
    pub fn from_class(class: &str) -> Self {
        match class.to_lowercase().as_str() {
            "aves" => Self::Bird,
            "mammalia" | "mammal" => Self::Mammal,
            "reptilia" => Self::Reptile,
            _ => Self::Animal,
        }
    }

    /// Lowercase label as used in reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bird => "bird",
            Self::Mammal => "mammal",
            Self::Reptile => "reptile",
            Self::Animal => "animal",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bird" => Ok(Self::Bird),
            "mammal" => Ok(Self::Mammal),
            "reptile" => Ok(Self::Reptile),
            "animal" => Ok(Self::Animal),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Coordinate convention of a bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BboxFormat {
    /// Coordinates relative to image size, in [0, 1].
    #[default]
    Normalized,
}

/// A single taxonomic assignment within an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Display name chosen by the taxonomy tie-break policy.
    pub common_name: String,
    /// `Genus species`, empty if unavailable.
    pub scientific_name: String,
    /// Raw common-name field from the classifier, possibly generic or empty.
    pub english_name: String,
    /// Coarse animal class.
    pub category: Category,
    /// Detection confidence (0.0 - 1.0).
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` in normalized coordinates, if known.
    pub bbox: Option<[f64; 4]>,
    /// Coordinate convention of `bbox`.
    pub bbox_format: BboxFormat,
}

/// Best-effort image properties recorded before detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageMetadata {
    /// Image header could be read.
    Properties {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Container format (e.g. "JPEG").
        format: String,
        /// Color mode (e.g. "Rgb8").
        color: String,
    },
    /// Image could not be opened; detection still proceeds.
    Unreadable {
        /// Why the header could not be read.
        error: String,
    },
}

/// Complete result of attempting detection on one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionOutcome {
    /// Image the outcome belongs to.
    pub image_path: PathBuf,
    /// Detections in the order reported by the resolver.
    pub detections: Vec<Detection>,
    /// Backend that produced the outcome.
    pub mode: DetectionMode,
    /// Wall-clock seconds spent on this image.
    pub processing_time: f64,
    /// Whether the backend completed and produced a parseable result.
    pub success: bool,
    /// Present iff `success` is false.
    pub error_message: Option<String>,
    /// Image properties, `None` if the probe was never attempted.
    pub metadata: Option<ImageMetadata>,
}

impl DetectionOutcome {
    /// Build a successful outcome.
    pub fn success(image_path: PathBuf, mode: DetectionMode, detections: Vec<Detection>) -> Self {
        Self {
            image_path,
            detections,
            mode,
            processing_time: 0.0,
            success: true,
            error_message: None,
            metadata: None,
        }
    }

    /// Build a failed outcome. Failed outcomes never carry detections.
    pub fn failure(image_path: PathBuf, mode: DetectionMode, message: impl Into<String>) -> Self {
        Self {
            image_path,
            detections: Vec::new(),
            mode,
            processing_time: 0.0,
            success: false,
            error_message: Some(message.into()),
            metadata: None,
        }
    }

    /// Detection with the highest confidence; the first one wins ties.
    pub fn best_detection(&self) -> Option<&Detection> {
        self.detections.iter().fold(None, |best, d| match best {
            Some(b) if b.confidence >= d.confidence => Some(b),
            _ => Some(d),
        })
    }

    /// Sorted unique display names of all detections.
    pub fn species(&self) -> Vec<String> {
        self.detections
            .iter()
            .map(|d| d.common_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Drop detections below `threshold`.
    pub fn retain_confident(&mut self, threshold: f64) {
        self.detections.retain(|d| d.confidence >= threshold);
    }

    /// File name of the image, for progress and reports.
    pub fn file_name(&self) -> String {
        file_name_of(&self.image_path)
    }
}

/// Lossy file name of a path, or the full path if it has none.
pub(crate) fn file_name_of(path: &std::path::Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}
