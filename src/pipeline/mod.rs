//! Batch processing pipeline components.

mod engine;
mod files;
mod stats;

pub use engine::{BatchEngine, CancelHandle, ProgressCallback, ProgressStatus, ProgressUpdate};
pub use files::collect_image_files;
pub use stats::{ImageError, ProcessingStats, StatsAggregator};
