//! Best-effort image header probe.

use crate::detector::ImageMetadata;
use image::{ImageDecoder, ImageReader};
use std::path::Path;
use tracing::debug;

/// Read dimensions, container format and color mode from the image header.
///
/// Never fails: an unreadable image yields [`ImageMetadata::Unreadable`] and
/// detection proceeds regardless.
pub fn probe_metadata(path: &Path) -> ImageMetadata {
    match read_properties(path) {
        Ok(metadata) => metadata,
        Err(error) => {
            debug!("Could not read image header of {}: {error}", path.display());
            ImageMetadata::Unreadable { error }
        }
    }
}

fn read_properties(path: &Path) -> std::result::Result<ImageMetadata, String> {
    let reader = ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    let format = reader
        .format()
        .map_or_else(|| "unknown".to_string(), |f| format!("{f:?}").to_uppercase());
    let decoder = reader.into_decoder().map_err(|e| e.to_string())?;
    let (width, height) = decoder.dimensions();

    Ok(ImageMetadata::Properties {
        width,
        height,
        format,
        color: format!("{:?}", decoder.color_type()),
    })
}
