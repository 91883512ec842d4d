//! Batch detection engine.

use crate::config::{EngineSettings, validate_settings};
use crate::constants::{BYTES_PER_MB, estimate};
use crate::detector::{DetectionMode, DetectionOutcome, SpeciesDetector, file_name_of, panic_message};
use crate::error::{Error, Result};
use crate::pipeline::stats::{ProcessingStats, StatsAggregator};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Phase reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    /// An image is about to start (sequential) or just finished (parallel).
    Processing,
    /// The batch returned.
    Done,
}

impl ProgressStatus {
    /// Lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Done => "done",
        }
    }
}

/// One progress notification.
///
/// In sequential mode `current` is the index of the image about to be
/// processed; in parallel mode it is the number of completed images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Position within the batch.
    pub current: usize,
    /// Number of images in the batch.
    pub total: usize,
    /// Phase of the batch.
    pub status: ProgressStatus,
    /// File name of the image concerned, empty for [`ProgressStatus::Done`].
    pub filename: String,
}

/// Progress callback, always invoked on the thread that called
/// [`BatchEngine::process_batch`].
pub type ProgressCallback<'a> = &'a dyn Fn(&ProgressUpdate);

/// Cloneable handle that requests cancellation from another thread or a
/// signal handler.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation of the running batch.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives many images through a [`SpeciesDetector`].
///
/// Lifecycle: uninitialized until [`initialize`](Self::initialize) succeeds,
/// then ready; running while [`process_batch`](Self::process_batch) executes.
#[derive(Debug)]
pub struct BatchEngine {
    settings: EngineSettings,
    detector: Option<SpeciesDetector>,
    stats: StatsAggregator,
    cancel_flag: Arc<AtomicBool>,
    running: AtomicBool,
}

/// Stamps the batch time and leaves the running state on every exit path.
struct RunGuard<'a> {
    engine: &'a BatchEngine,
    start: Instant,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        self.engine.stats.finish(elapsed);
        self.engine.cancel_flag.store(false, Ordering::SeqCst);
        self.engine.running.store(false, Ordering::SeqCst);
    }
}

impl BatchEngine {
    /// Create an uninitialized engine.
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            detector: None,
            stats: StatsAggregator::new(),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
        }
    }

    /// Create a ready engine around an existing detector.
    pub fn with_detector(settings: EngineSettings, detector: SpeciesDetector) -> Self {
        let mut engine = Self::new(settings);
        engine.detector = Some(detector);
        engine
    }

    /// Select and check the detection backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are out of range or an explicitly
    /// configured backend cannot run.
    pub fn initialize(&mut self) -> Result<()> {
        validate_settings(&self.settings)?;
        let detector = SpeciesDetector::from_settings(&self.settings)?;
        info!("Detector initialized in {} mode", detector.mode());
        self.detector = Some(detector);
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.detector.is_some()
    }

    /// Mode of the initialized detector.
    pub fn mode(&self) -> Option<DetectionMode> {
        self.detector.as_ref().map(SpeciesDetector::mode)
    }

    /// Settings this engine was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Whether a batch is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cancellation of the running batch.
    ///
    /// No new images are started once observed; images already in flight
    /// finish and are kept. Ignored when no batch is running.
    pub fn cancel(&self) {
        if !self.is_running() {
            debug!("Cancel requested while idle, ignoring");
            return;
        }
        if !self.cancel_flag.swap(true, Ordering::SeqCst) {
            info!("Cancellation requested");
        }
    }

    /// Handle for requesting cancellation without borrowing the engine.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel_flag))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Snapshot of the current or last batch's statistics.
    pub fn get_statistics(&self) -> ProcessingStats {
        self.stats.snapshot()
    }

    /// Rough wall-clock estimate in seconds for `image_count` images.
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_processing_time(&self, image_count: usize) -> f64 {
        let observed = self.stats.snapshot().average_time_per_image();
        let per_image = if observed > 0.0 {
            observed
        } else {
            estimate::DEFAULT_SECS_PER_IMAGE
        };
        let workers = self.settings.max_workers.max(1) as f64;
        image_count as f64 * per_image / workers * estimate::BUFFER_FACTOR
    }

    /// Run detection on every image.
    ///
    /// Per-image failures become failed outcomes; they never abort the
    /// batch. In parallel mode the returned order is completion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineNotInitialized`] before a successful
    /// [`initialize`](Self::initialize), and [`Error::EngineBusy`] if a batch
    /// is already running.
    pub fn process_batch(
        &self,
        image_paths: &[PathBuf],
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<Vec<DetectionOutcome>> {
        let detector = self.detector.as_ref().ok_or(Error::EngineNotInitialized)?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::EngineBusy);
        }

        self.stats.reset(image_paths.len());
        let _guard = RunGuard {
            engine: self,
            start: Instant::now(),
        };

        let workers = self.settings.max_workers.max(1);
        info!(
            "Processing {} image(s) with {} worker(s) in {} mode",
            image_paths.len(),
            workers,
            detector.mode()
        );

        let notify = |current: usize, status: ProgressStatus, filename: String| {
            if let Some(callback) = progress {
                callback(&ProgressUpdate {
                    current,
                    total: image_paths.len(),
                    status,
                    filename,
                });
            }
        };

        let outcomes = if workers == 1 {
            self.run_sequential(detector, image_paths, &notify)
        } else {
            self.run_parallel(detector, image_paths, workers, &notify)
        };

        if self.is_cancelled() {
            warn!(
                "Batch cancelled after {} of {} image(s)",
                outcomes.len(),
                image_paths.len()
            );
        }
        notify(outcomes.len(), ProgressStatus::Done, String::new());
        Ok(outcomes)
    }

    fn run_sequential(
        &self,
        detector: &SpeciesDetector,
        image_paths: &[PathBuf],
        notify: &dyn Fn(usize, ProgressStatus, String),
    ) -> Vec<DetectionOutcome> {
        let mut outcomes = Vec::with_capacity(image_paths.len());
        for (index, path) in image_paths.iter().enumerate() {
            if self.is_cancelled() {
                break;
            }
            notify(index, ProgressStatus::Processing, file_name_of(path));

            let outcome = self.process_image(detector, path);
            self.stats.record(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    fn run_parallel(
        &self,
        detector: &SpeciesDetector,
        image_paths: &[PathBuf],
        workers: usize,
        notify: &dyn Fn(usize, ProgressStatus, String),
    ) -> Vec<DetectionOutcome> {
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<DetectionOutcome>();
        let mut outcomes = Vec::with_capacity(image_paths.len());

        std::thread::scope(|scope| {
            for _ in 0..workers.min(image_paths.len()) {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || {
                    loop {
                        if self.is_cancelled() {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(path) = image_paths.get(index) else {
                            break;
                        };

                        let outcome =
                            catch_unwind(AssertUnwindSafe(|| self.process_image(detector, path)))
                                .unwrap_or_else(|payload| {
                                    DetectionOutcome::failure(
                                        path.clone(),
                                        detector.mode(),
                                        panic_message(payload.as_ref()),
                                    )
                                });
                        if tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            // Workers hold the remaining senders; the loop ends when all exit.
            drop(tx);

            for outcome in rx {
                self.stats.record(&outcome);
                let filename = outcome.file_name();
                outcomes.push(outcome);
                notify(outcomes.len(), ProgressStatus::Processing, filename);
            }
        });

        outcomes
    }

    /// Size guard, detection and confidence filter for one image.
    fn process_image(&self, detector: &SpeciesDetector, path: &Path) -> DetectionOutcome {
        if let Err(e) = self.check_size(path) {
            warn!("Skipping {}: {e}", path.display());
            return DetectionOutcome::failure(path.to_path_buf(), detector.mode(), e.to_string());
        }

        let mut outcome = detector.detect_single(path);
        outcome.retain_confident(self.settings.confidence_threshold);
        outcome
    }

    #[allow(clippy::cast_precision_loss)]
    fn check_size(&self, path: &Path) -> Result<()> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            // The detector reports missing files itself.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let size_mb = metadata.len() as f64 / BYTES_PER_MB;
        if size_mb > self.settings.max_image_size_mb {
            return Err(Error::ImageTooLarge {
                path: path.to_path_buf(),
                size_mb,
                max_mb: self.settings.max_image_size_mb,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::detector::MockBackend;
    use std::time::Duration;

    fn ready_engine(workers: usize) -> BatchEngine {
        let mut settings = EngineSettings::default();
        settings.max_workers = workers;
        let detector =
            SpeciesDetector::with_backend(Box::new(MockBackend::with_delay(Duration::ZERO)));
        BatchEngine::with_detector(settings, detector)
    }

    #[test]
    fn test_uninitialized_engine_rejects_batch() {
        let engine = BatchEngine::new(EngineSettings::default());
        assert!(!engine.is_initialized());
        assert!(matches!(
            engine.process_batch(&[], None),
            Err(Error::EngineNotInitialized)
        ));
    }

    #[test]
    fn test_empty_batch() {
        let engine = ready_engine(4);
        let updates = std::cell::RefCell::new(Vec::new());
        let callback = |u: &ProgressUpdate| updates.borrow_mut().push(u.clone());
        let outcomes = engine.process_batch(&[], Some(&callback)).unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(engine.get_statistics().processed_images, 0);
        assert_eq!(updates.borrow().len(), 1);
        assert_eq!(updates.borrow()[0].status, ProgressStatus::Done);
    }

    #[test]
    fn test_estimate_without_history() {
        let engine = ready_engine(4);
        assert!((engine.estimate_processing_time(10) - 6.0).abs() < 1e-9);
        assert_eq!(engine.estimate_processing_time(0), 0.0);
    }

    #[test]
    fn test_cancel_while_idle_is_ignored() {
        let engine = ready_engine(1);
        engine.cancel();
        assert!(!engine.cancel_handle().is_cancelled());
    }

    #[test]
    fn test_progress_status_labels() {
        assert_eq!(ProgressStatus::Processing.as_str(), "processing");
        assert_eq!(ProgressStatus::Done.as_str(), "done");
    }
}
