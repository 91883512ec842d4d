//! Per-image species detection.

mod backend;
mod metadata;
mod single;
mod speciesnet;
pub mod taxonomy;
mod types;

pub use backend::{DetectionBackend, MockBackend, PlaceholderBackend};
pub use metadata::probe_metadata;
pub(crate) use single::panic_message;
pub use single::SpeciesDetector;
pub use speciesnet::{EnvOverlay, SpeciesNetBackend};
pub use types::{
    BboxFormat, Category, Detection, DetectionMode, DetectionOutcome, ImageMetadata,
};
pub(crate) use types::file_name_of;
