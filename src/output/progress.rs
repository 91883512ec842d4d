//! Progress bar utilities for batch processing.

use crate::pipeline::{ProgressStatus, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a progress bar for a batch of images.
pub fn create_batch_progress(total_images: usize, enabled: bool) -> Option<ProgressBar> {
    if !enabled || total_images == 0 {
        return None;
    }

    let pb = ProgressBar::new(total_images as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} images ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Reflect one engine progress update on the bar.
///
/// Sequential updates arrive before an image starts, parallel ones after it
/// finished, so the position is only ever moved forward.
pub fn apply_update(pb: Option<&ProgressBar>, update: &ProgressUpdate) {
    let Some(pb) = pb else {
        return;
    };
    match update.status {
        ProgressStatus::Processing => {
            if (update.current as u64) > pb.position() {
                pb.set_position(update.current as u64);
            }
            pb.set_message(update.filename.clone());
        }
        ProgressStatus::Done => {
            pb.set_position(update.current as u64);
            pb.set_message(String::new());
        }
    }
}

/// Finish a progress bar with a message.
pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}
