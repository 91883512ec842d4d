//! Detection on a single image.

use crate::config::EngineSettings;
use crate::detector::backend::{DetectionBackend, MockBackend, PlaceholderBackend};
use crate::detector::metadata::probe_metadata;
use crate::detector::speciesnet::SpeciesNetBackend;
use crate::detector::{DetectionMode, DetectionOutcome};
use crate::error::{Error, Result};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs one backend against individual images.
///
/// Read-only after construction, so a single detector is shared by all
/// worker threads of a batch.
pub struct SpeciesDetector {
    backend: Box<dyn DetectionBackend>,
}

impl std::fmt::Debug for SpeciesDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeciesDetector")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl SpeciesDetector {
    /// Create a detector for an explicit mode.
    pub fn new(mode: DetectionMode, settings: &EngineSettings) -> Self {
        let backend: Box<dyn DetectionBackend> = match mode {
            DetectionMode::SpeciesNet => Box::new(SpeciesNetBackend::new(settings)),
            DetectionMode::CameraTrapAi | DetectionMode::MegaDetector => {
                Box::new(PlaceholderBackend::new(mode))
            }
            DetectionMode::Mock => Box::new(MockBackend::new()),
        };
        Self { backend }
    }

    /// Create a detector around a custom backend.
    pub fn with_backend(backend: Box<dyn DetectionBackend>) -> Self {
        Self { backend }
    }

    /// Pick the best available backend.
    ///
    /// Uses `SpeciesNet` if its interpreter answers, otherwise falls back to
    /// the mock backend.
    pub fn auto(settings: &EngineSettings) -> Self {
        let speciesnet = SpeciesNetBackend::new(settings);
        match speciesnet.check_available() {
            Ok(()) => {
                info!("Auto-selected speciesnet detection mode");
                Self::with_backend(Box::new(speciesnet))
            }
            Err(e) => {
                warn!("SpeciesNet not available, using mock detections: {e}");
                Self::with_backend(Box::new(MockBackend::new()))
            }
        }
    }

    /// Build the detector described by `settings`.
    ///
    /// An explicitly requested backend that cannot run is an error.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self> {
        match settings.mode {
            Some(mode) => {
                let detector = Self::new(mode, settings);
                detector.check_available()?;
                Ok(detector)
            }
            None => Ok(Self::auto(settings)),
        }
    }

    /// Mode reported on this detector's outcomes.
    pub fn mode(&self) -> DetectionMode {
        self.backend.mode()
    }

    /// Check that the backend can run.
    pub fn check_available(&self) -> Result<()> {
        self.backend.check_available()
    }

    /// Detect animals in one image.
    ///
    /// Never fails: every problem becomes a failed outcome carrying the
    /// error message.
    pub fn detect_single(&self, image_path: &Path) -> DetectionOutcome {
        let mode = self.mode();

        if !image_path.exists() {
            let err = Error::ImageNotFound {
                path: image_path.to_path_buf(),
            };
            error!("{err}");
            return DetectionOutcome::failure(image_path.to_path_buf(), mode, err.to_string());
        }

        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let metadata = probe_metadata(image_path);
            (metadata, self.backend.detect(image_path))
        }));

        let mut outcome = match result {
            Ok((metadata, Ok(detections))) => {
                let mut outcome =
                    DetectionOutcome::success(image_path.to_path_buf(), mode, detections);
                outcome.metadata = Some(metadata);
                outcome
            }
            Ok((metadata, Err(e))) => {
                error!("Detection failed for {}: {e}", image_path.display());
                let mut outcome =
                    DetectionOutcome::failure(image_path.to_path_buf(), mode, e.to_string());
                outcome.metadata = Some(metadata);
                outcome
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Detection panicked for {}: {message}", image_path.display());
                DetectionOutcome::failure(image_path.to_path_buf(), mode, message)
            }
        };
        outcome.processing_time = start.elapsed().as_secs_f64();
        outcome
    }
}

/// Human-readable text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || "detection panicked".to_string(),
            |msg| format!("detection panicked: {msg}"),
        )
}
