//! Normalization of classifier predictions into [`Detection`]s.
//!
//! The classifier reports each image's top class as a semicolon-separated
//! label `id;class;order;family;genus;species;common_name`. When it is not
//! confident at species level it "rolls up" to genus, family or order, and
//! says so in `prediction_source`. The display name chosen here reflects the
//! level of certainty actually reached.

use crate::constants::taxonomy::{
    FAMILY_SUFFIX, FIELD_COUNT, GENERIC_NAMES, GENERIC_SUFFIX, ROLLUP_FAMILY, ROLLUP_GENUS,
    ROLLUP_ORDER,
};
use crate::detector::{BboxFormat, Category, Detection};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Top-level document written by the classifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionsFile {
    /// One record per input image.
    #[serde(default)]
    pub predictions: Vec<PredictionRecord>,
}

/// Classifier output for one image.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PredictionRecord {
    /// Path of the image as seen by the classifier.
    pub filepath: String,
    /// Semicolon-separated taxonomy label.
    pub prediction: String,
    /// Score of `prediction`.
    pub prediction_score: f64,
    /// How the prediction was reached (e.g. `classifier`, `rollup_to_family`).
    pub prediction_source: String,
    /// Object detections, most confident first.
    pub detections: Vec<BoxRecord>,
}

/// A detector bounding box attached to a prediction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BoxRecord {
    /// Box coordinates, normalized.
    pub bbox: Vec<f64>,
}

/// Parsed taxonomy label. Fields are empty when the label is truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxon {
    /// Taxonomic class (e.g. `mammalia`).
    pub class: String,
    /// Order (e.g. `carnivora`).
    pub order: String,
    /// Family (e.g. `ursidae`).
    pub family: String,
    /// Genus (e.g. `ursus`).
    pub genus: String,
    /// Species epithet (e.g. `thibetanus`).
    pub species: String,
    /// Raw common name.
    pub common_name: String,
}

impl Taxon {
    /// Parse a label. Labels with fewer than seven fields yield an empty taxon.
    pub fn parse(label: &str) -> Self {
        let parts: Vec<&str> = label.split(';').collect();
        if parts.len() < FIELD_COUNT {
            return Self::default();
        }
        Self {
            class: parts[1].to_string(),
            order: parts[2].to_string(),
            family: parts[3].to_string(),
            genus: parts[4].to_string(),
            species: parts[5].to_string(),
            common_name: parts[6].to_string(),
        }
    }

    /// `Genus species`, or empty if either part is missing.
    pub fn scientific_name(&self) -> String {
        if self.genus.is_empty() || self.species.is_empty() {
            return String::new();
        }
        format!("{} {}", capitalize(&self.genus), self.species.to_lowercase())
    }

    /// Coarse category from the class field.
    pub fn category(&self) -> Category {
        Category::from_class(&self.class)
    }

    /// Pick the display name for this taxon given how it was predicted.
    pub fn display_name(&self, prediction_source: &str) -> String {
        let scientific = self.scientific_name();
        if !scientific.is_empty() {
            return scientific;
        }

        let common = self.common_name.as_str();
        if !common.is_empty()
            && !GENERIC_NAMES.contains(&common)
            && !common.ends_with(GENERIC_SUFFIX)
        {
            return common.to_string();
        }

        let family_known = self.family.ends_with(FAMILY_SUFFIX);
        if prediction_source.contains(ROLLUP_GENUS) && !self.genus.is_empty() {
            return format!("{} sp.", capitalize(&self.genus));
        }
        if prediction_source.contains(ROLLUP_FAMILY) && family_known {
            return capitalize(&self.family);
        }
        if prediction_source.contains(ROLLUP_ORDER) && !self.order.is_empty() {
            return capitalize(&self.order);
        }
        if family_known {
            return capitalize(&self.family);
        }

        let category = self.category();
        if self.order.is_empty() {
            format!("Unidentified {category}")
        } else {
            format!("{} ({category})", capitalize(&self.order))
        }
    }
}

/// Upper-case the first character and lower-case the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Find the record that belongs to `image_path`.
///
/// Tries, in order: file-name suffix match, exact string match, and
/// canonical path equality. The first matching record wins.
pub fn find_record<'a>(
    records: &'a [PredictionRecord],
    image_path: &Path,
) -> Option<&'a PredictionRecord> {
    let image_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let image_str = image_path.to_string_lossy();
    let image_canonical = image_path.canonicalize().ok();

    records.iter().find(|record| {
        if record.filepath.is_empty() {
            return false;
        }
        if let Some(name) = &image_name
            && record.filepath.ends_with(name.as_str())
        {
            return true;
        }
        if record.filepath == image_str {
            return true;
        }
        image_canonical.as_ref().is_some_and(|canonical| {
            Path::new(&record.filepath)
                .canonicalize()
                .is_ok_and(|p| &p == canonical)
        })
    })
}

/// Convert a matched record into at most one detection.
pub fn resolve_record(record: &PredictionRecord) -> Vec<Detection> {
    if record.prediction.is_empty() || record.prediction_score <= 0.0 {
        return Vec::new();
    }

    let taxon = Taxon::parse(&record.prediction);
    let bbox = record
        .detections
        .first()
        .and_then(|d| <[f64; 4]>::try_from(d.bbox.get(..4)?).ok());

    vec![Detection {
        common_name: taxon.display_name(&record.prediction_source),
        scientific_name: taxon.scientific_name(),
        english_name: taxon.common_name.clone(),
        category: taxon.category(),
        confidence: record.prediction_score,
        bbox,
        bbox_format: BboxFormat::Normalized,
    }]
}

/// Resolve the classifier output for one image.
///
/// A missing record is not an error: the classifier simply produced no
/// prediction for this image.
pub fn resolve(file: &PredictionsFile, image_path: &Path) -> Vec<Detection> {
    let Some(record) = find_record(&file.predictions, image_path) else {
        warn!("No prediction found for image: {}", image_path.display());
        debug!(
            "Available predictions: {:?}",
            file.predictions
                .iter()
                .map(|p| p.filepath.as_str())
                .collect::<Vec<_>>()
        );
        return Vec::new();
    };
    resolve_record(record)
}
