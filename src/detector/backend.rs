//! Detection backends.

use crate::constants::mock;
use crate::detector::{BboxFormat, Category, Detection, DetectionMode};
use crate::error::Result;
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// A strategy that turns one image into detections.
///
/// Backends are shared read-only across worker threads.
pub trait DetectionBackend: Send + Sync {
    /// Mode reported on outcomes produced by this backend.
    fn mode(&self) -> DetectionMode;

    /// Check that the backend can run in this environment.
    fn check_available(&self) -> Result<()> {
        Ok(())
    }

    /// Detect animals in one image.
    ///
    /// An `Err` becomes a failed outcome for this image only.
    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>>;
}

/// Synthesizes 0-3 detections from a small species table.
#[derive(Debug, Clone)]
pub struct MockBackend {
    delay: Duration,
}

impl MockBackend {
    /// Create a mock backend with the default simulated delay.
    pub fn new() -> Self {
        info!("Mock detector initialized - for testing only");
        Self {
            delay: Duration::from_millis(mock::DELAY_MS),
        }
    }

    /// Create a mock backend with a custom simulated delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionBackend for MockBackend {
    fn mode(&self) -> DetectionMode {
        DetectionMode::Mock
    }

    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let mut rng = rand::thread_rng();
        let count = rng.gen_range(0..=mock::MAX_DETECTIONS);
        let detections = (0..count)
            .map(|_| {
                let (scientific, english, category) =
                    mock::SPECIES[rng.gen_range(0..mock::SPECIES.len())];
                let x = rng.gen_range(0.1..0.5);
                let y = rng.gen_range(0.1..0.5);
                let w = rng.gen_range(0.2..0.4);
                let h = rng.gen_range(0.2..0.4);
                Detection {
                    common_name: scientific.to_string(),
                    scientific_name: scientific.to_string(),
                    english_name: english.to_string(),
                    category: category.parse().unwrap_or(Category::Animal),
                    confidence: rng.gen_range(mock::MIN_CONFIDENCE..mock::MAX_CONFIDENCE),
                    bbox: Some([x, y, x + w, y + h]),
                    bbox_format: BboxFormat::Normalized,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "Mock produced {} detection(s) for {}",
            detections.len(),
            image_path.display()
        );
        Ok(detections)
    }
}

/// A backend that is not implemented yet and delegates to [`MockBackend`].
///
/// Outcomes still report the requested mode.
#[derive(Debug, Clone)]
pub struct PlaceholderBackend {
    mode: DetectionMode,
    inner: MockBackend,
}

impl PlaceholderBackend {
    /// Create a placeholder for `mode`.
    pub fn new(mode: DetectionMode) -> Self {
        info!("{mode} backend is a placeholder, using mock detections");
        Self {
            mode,
            inner: MockBackend::new(),
        }
    }
}

impl DetectionBackend for PlaceholderBackend {
    fn mode(&self) -> DetectionMode {
        self.mode
    }

    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        self.inner.detect(image_path)
    }
}
