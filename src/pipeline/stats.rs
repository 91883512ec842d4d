//! Batch statistics.

use crate::detector::DetectionOutcome;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One failed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageError {
    /// File name of the image.
    pub image: String,
    /// Error message.
    pub error: String,
}

/// Aggregate counters for one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingStats {
    /// Images submitted to the batch.
    pub total_images: usize,
    /// Images that produced an outcome.
    pub processed_images: usize,
    /// Outcomes with `success == true`.
    pub successful_detections: usize,
    /// Outcomes with `success == false`.
    pub failed_detections: usize,
    /// Detections across all successful outcomes.
    pub total_detections: usize,
    /// Wall-clock seconds for the batch, set when the batch returns.
    pub processing_time: f64,
    /// Failed images in completion order.
    pub errors: Vec<ImageError>,
    /// Detections per display name.
    pub species_counts: BTreeMap<String, usize>,
}

impl ProcessingStats {
    /// Mean seconds per processed image, 0 if nothing was processed.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_time_per_image(&self) -> f64 {
        if self.processed_images == 0 {
            0.0
        } else {
            self.processing_time / self.processed_images as f64
        }
    }

    /// Percentage of processed images that succeeded.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.processed_images == 0 {
            0.0
        } else {
            self.successful_detections as f64 / self.processed_images as f64 * 100.0
        }
    }

    /// Species sorted by descending count, then name.
    pub fn species_by_count(&self) -> Vec<(&str, usize)> {
        let mut species: Vec<(&str, usize)> = self
            .species_counts
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        species.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        species
    }

    fn record(&mut self, outcome: &DetectionOutcome) {
        self.processed_images += 1;
        if outcome.success {
            self.successful_detections += 1;
            self.total_detections += outcome.detections.len();
            for detection in &outcome.detections {
                *self
                    .species_counts
                    .entry(detection.common_name.clone())
                    .or_insert(0) += 1;
            }
        } else {
            self.failed_detections += 1;
            self.errors.push(ImageError {
                image: outcome.file_name(),
                error: outcome.error_message.clone().unwrap_or_default(),
            });
        }
    }
}

impl Serialize for ProcessingStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ProcessingStats", 10)?;
        s.serialize_field("total_images", &self.total_images)?;
        s.serialize_field("processed_images", &self.processed_images)?;
        s.serialize_field("successful_detections", &self.successful_detections)?;
        s.serialize_field("failed_detections", &self.failed_detections)?;
        s.serialize_field("total_detections", &self.total_detections)?;
        s.serialize_field("processing_time", &self.processing_time)?;
        s.serialize_field("average_time_per_image", &self.average_time_per_image())?;
        s.serialize_field("success_rate", &self.success_rate())?;
        s.serialize_field("errors", &self.errors)?;
        s.serialize_field("species_counts", &self.species_counts)?;
        s.end()
    }
}

/// Thread-safe owner of the current batch's [`ProcessingStats`].
///
/// Every update and read takes the same lock, so snapshots never observe a
/// half-recorded outcome.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<ProcessingStats>,
}

impl StatsAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProcessingStats> {
        // Counters stay meaningful even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard previous statistics and start a run of `total_images`.
    pub fn reset(&self, total_images: usize) {
        *self.lock() = ProcessingStats {
            total_images,
            ..ProcessingStats::default()
        };
    }

    /// Record one completed image.
    pub fn record(&self, outcome: &DetectionOutcome) {
        self.lock().record(outcome);
    }

    /// Stamp the batch wall-clock time.
    pub fn finish(&self, elapsed_secs: f64) {
        self.lock().processing_time = elapsed_secs;
    }

    /// Consistent copy of the current statistics.
    pub fn snapshot(&self) -> ProcessingStats {
        self.lock().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::detector::{BboxFormat, Category, Detection, DetectionMode};
    use std::sync::Arc;

    fn detection(name: &str) -> Detection {
        Detection {
            common_name: name.to_string(),
            scientific_name: String::new(),
            english_name: String::new(),
            category: Category::Mammal,
            confidence: 0.8,
            bbox: None,
            bbox_format: BboxFormat::Normalized,
        }
    }

    fn success(names: &[&str]) -> DetectionOutcome {
        DetectionOutcome::success(
            "cam/a.jpg".into(),
            DetectionMode::Mock,
            names.iter().map(|n| detection(n)).collect(),
        )
    }

    #[test]
    fn test_derived_values_empty() {
        let stats = ProcessingStats::default();
        assert_eq!(stats.average_time_per_image(), 0.0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_record_success_and_failure() {
        let agg = StatsAggregator::new();
        agg.reset(3);
        agg.record(&success(&["Sus scrofa", "Sus scrofa"]));
        agg.record(&success(&[]));
        agg.record(&DetectionOutcome::failure(
            "cam/b.jpg".into(),
            DetectionMode::Mock,
            "boom",
        ));
        agg.finish(6.0);

        let stats = agg.snapshot();
        assert_eq!(stats.total_images, 3);
        assert_eq!(stats.processed_images, 3);
        assert_eq!(stats.successful_detections, 2);
        assert_eq!(stats.failed_detections, 1);
        assert_eq!(stats.total_detections, 2);
        assert_eq!(stats.species_counts.get("Sus scrofa"), Some(&2));
        assert_eq!(
            stats.errors,
            vec![ImageError {
                image: "b.jpg".to_string(),
                error: "boom".to_string()
            }]
        );
        assert_eq!(stats.average_time_per_image(), 2.0);
        assert!((stats.success_rate() - 66.666_666).abs() < 1e-3);
    }

    #[test]
    fn test_reset_discards_previous_run() {
        let agg = StatsAggregator::new();
        agg.reset(1);
        agg.record(&success(&["Cervus nippon"]));
        agg.finish(1.0);
        agg.reset(5);

        let stats = agg.snapshot();
        assert_eq!(stats.total_images, 5);
        assert_eq!(stats.processed_images, 0);
        assert!(stats.species_counts.is_empty());
        assert_eq!(stats.processing_time, 0.0);
    }

    #[test]
    fn test_concurrent_updates_are_consistent() {
        let agg = Arc::new(StatsAggregator::new());
        agg.reset(400);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let agg = Arc::clone(&agg);
                scope.spawn(move || {
                    for _ in 0..100 {
                        agg.record(&success(&["Sus scrofa"]));
                    }
                });
            }
        });

        let stats = agg.snapshot();
        assert_eq!(stats.processed_images, 400);
        assert_eq!(stats.successful_detections + stats.failed_detections, 400);
        assert_eq!(
            stats.species_counts.values().sum::<usize>(),
            stats.total_detections
        );
    }

    #[test]
    fn test_species_by_count() {
        let mut stats = ProcessingStats::default();
        stats.species_counts.insert("b".to_string(), 2);
        stats.species_counts.insert("a".to_string(), 2);
        stats.species_counts.insert("c".to_string(), 5);
        assert_eq!(stats.species_by_count(), vec![("c", 5), ("a", 2), ("b", 2)]);
    }

    #[test]
    fn test_serializes_derived_fields() {
        let mut stats = ProcessingStats {
            processed_images: 4,
            successful_detections: 3,
            processing_time: 2.0,
            ..ProcessingStats::default()
        };
        stats.species_counts.insert("Sus scrofa".to_string(), 1);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["average_time_per_image"], 0.5);
        assert_eq!(json["success_rate"], 75.0);
        assert_eq!(json["species_counts"]["Sus scrofa"], 1);
    }
}
