//! Configuration validation.

use crate::config::{Config, EngineSettings};
use crate::constants::confidence;
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_detection(config)?;
    validate_processing(config)?;
    Ok(())
}

/// Validate merged engine settings, after flags and overrides are applied.
pub fn validate_settings(settings: &EngineSettings) -> Result<()> {
    check_confidence(settings.confidence_threshold)
        .and_then(|()| check_batch_size(settings.batch_size))
        .and_then(|()| check_timeout(settings.timeout_secs))
        .and_then(|()| check_country_code(&settings.country_code))
        .and_then(|()| check_workers(settings.max_workers))
        .and_then(|()| check_max_image_size(settings.max_image_size_mb))
        .map_err(invalid)
}

fn invalid(message: String) -> Error {
    Error::ConfigValidation { message }
}

pub(crate) fn check_confidence(threshold: f64) -> std::result::Result<(), String> {
    if (confidence::MIN..=confidence::MAX).contains(&threshold) {
        Ok(())
    } else {
        Err(format!(
            "confidence_threshold must be between {} and {}, got {threshold}",
            confidence::MIN,
            confidence::MAX
        ))
    }
}

pub(crate) fn check_batch_size(batch_size: usize) -> std::result::Result<(), String> {
    if batch_size == 0 {
        return Err("batch_size must be at least 1".to_string());
    }
    Ok(())
}

pub(crate) fn check_timeout(timeout_secs: u64) -> std::result::Result<(), String> {
    if timeout_secs == 0 {
        return Err("timeout must be at least 1 second".to_string());
    }
    Ok(())
}

pub(crate) fn check_country_code(code: &str) -> std::result::Result<(), String> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!(
            "country_code must be a 3-letter ISO code, got '{code}'"
        ));
    }
    Ok(())
}

pub(crate) fn check_workers(max_workers: usize) -> std::result::Result<(), String> {
    if max_workers == 0 {
        return Err("max_workers must be at least 1".to_string());
    }
    Ok(())
}

/// `NaN` and infinities are rejected; a `NaN` limit would disable the size guard.
pub(crate) fn check_max_image_size(max_mb: f64) -> std::result::Result<(), String> {
    if !max_mb.is_finite() || max_mb <= 0.0 {
        return Err(format!("max_image_size_mb must be positive, got {max_mb}"));
    }
    Ok(())
}

/// Validate detection settings.
fn validate_detection(config: &Config) -> Result<()> {
    let detection = &config.detection;

    check_confidence(detection.confidence_threshold)
        .and_then(|()| check_batch_size(detection.batch_size))
        .and_then(|()| check_timeout(detection.timeout))
        .and_then(|()| check_country_code(&detection.country_code))
        .map_err(invalid)
}

/// Validate processing settings.
fn validate_processing(config: &Config) -> Result<()> {
    let processing = &config.processing;

    check_workers(processing.max_workers)
        .and_then(|()| check_max_image_size(processing.max_image_size_mb))
        .map_err(invalid)
}
