//! Flat runtime settings consumed by the detection engine.

use crate::config::validate;
use crate::config::{BackendConfig, Config};
use crate::detector::DetectionMode;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one [`BatchEngine`](crate::pipeline::BatchEngine).
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Backend to use. `None` selects automatically.
    pub mode: Option<DetectionMode>,
    /// Number of worker threads (1 = sequential).
    pub max_workers: usize,
    /// Batch size passed to the classifier.
    pub batch_size: usize,
    /// Request GPU inference. Advisory only.
    pub use_gpu: bool,
    /// Detections below this confidence are dropped after detection.
    pub confidence_threshold: f64,
    /// ISO-3 country code passed to the classifier.
    pub country_code: String,
    /// Per-image classifier timeout in seconds.
    pub timeout_secs: u64,
    /// Images larger than this are rejected before detection.
    pub max_image_size_mb: f64,
    /// External classifier invocation.
    pub backend: BackendConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Config::default().engine_settings()
    }
}

impl EngineSettings {
    /// Build settings from `key=value` string pairs on top of the defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            settings.set(key.as_ref(), value.as_ref())?;
        }
        Ok(settings)
    }

    /// Set one setting from its string form.
    ///
    /// Recognized keys: `mode`, `max_workers`, `batch_size`, `use_gpu`,
    /// `confidence_threshold`, `country_code`, `timeout`, `max_image_size_mb`.
    /// Values are range-checked with the same rules as the config file.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
            reason,
        };
        let unparsable = |e: &dyn std::fmt::Display| invalid(e.to_string());
        let value = value.trim();

        match key {
            "mode" => {
                self.mode = if value.eq_ignore_ascii_case("auto") {
                    None
                } else {
                    Some(value.parse().map_err(|_| invalid(format!("unknown mode '{value}'")))?)
                };
            }
            "max_workers" => {
                let workers = value.parse::<usize>().map_err(|e| unparsable(&e))?;
                validate::check_workers(workers).map_err(invalid)?;
                self.max_workers = workers;
            }
            "batch_size" => {
                let batch_size = value.parse::<usize>().map_err(|e| unparsable(&e))?;
                validate::check_batch_size(batch_size).map_err(invalid)?;
                self.batch_size = batch_size;
            }
            "use_gpu" => self.use_gpu = value.parse::<bool>().map_err(|e| unparsable(&e))?,
            "confidence_threshold" => {
                let threshold = value.parse::<f64>().map_err(|e| unparsable(&e))?;
                validate::check_confidence(threshold).map_err(invalid)?;
                self.confidence_threshold = threshold;
            }
            "country_code" => {
                let code = value.to_uppercase();
                validate::check_country_code(&code).map_err(invalid)?;
                self.country_code = code;
            }
            "timeout" => {
                let timeout = value.parse::<u64>().map_err(|e| unparsable(&e))?;
                validate::check_timeout(timeout).map_err(invalid)?;
                self.timeout_secs = timeout;
            }
            "max_image_size_mb" => {
                let max_mb = value.parse::<f64>().map_err(|e| unparsable(&e))?;
                validate::check_max_image_size(max_mb).map_err(invalid)?;
                self.max_image_size_mb = max_mb;
            }
            other => {
                return Err(Error::UnknownSetting {
                    key: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Per-image classifier timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Directory for temporary prediction files.
    pub fn work_dir(&self) -> PathBuf {
        self.backend
            .work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(crate::constants::APP_NAME))
    }
}

impl Config {
    /// Flatten into engine settings.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            mode: self.detection.mode,
            max_workers: self.processing.max_workers,
            batch_size: self.detection.batch_size,
            use_gpu: self.processing.use_gpu,
            confidence_threshold: self.detection.confidence_threshold,
            country_code: self.detection.country_code.clone(),
            timeout_secs: self.detection.timeout,
            max_image_size_mb: self.processing.max_image_size_mb,
            backend: self.backend.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs() {
        let settings = EngineSettings::from_pairs([
            ("max_workers", "8"),
            ("confidence_threshold", "0.25"),
            ("country_code", "usa"),
            ("timeout", "60"),
            ("max_image_size_mb", "12.5"),
            ("use_gpu", "true"),
            ("mode", "mock"),
        ])
        .unwrap();
        assert_eq!(settings.max_workers, 8);
        assert_eq!(settings.confidence_threshold, 0.25);
        assert_eq!(settings.country_code, "USA");
        assert_eq!(settings.timeout(), Duration::from_secs(60));
        assert_eq!(settings.max_image_size_mb, 12.5);
        assert!(settings.use_gpu);
        assert_eq!(settings.mode, Some(DetectionMode::Mock));
    }

    #[test]
    fn test_mode_auto_clears_mode() {
        let mut settings = EngineSettings::from_pairs([("mode", "mock")]).unwrap();
        settings.set("mode", "auto").unwrap();
        assert!(settings.mode.is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = EngineSettings::from_pairs([("colour", "blue")]);
        assert!(matches!(result, Err(Error::UnknownSetting { .. })));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineSettings::from_pairs([("max_workers", "0")]).is_err());
        assert!(EngineSettings::from_pairs([("max_workers", "many")]).is_err());
        assert!(EngineSettings::from_pairs([("confidence_threshold", "1.5")]).is_err());
        assert!(EngineSettings::from_pairs([("use_gpu", "maybe")]).is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for (key, value) in [
            ("timeout", "0"),
            ("batch_size", "0"),
            ("max_image_size_mb", "NaN"),
            ("max_image_size_mb", "-5"),
            ("max_image_size_mb", "inf"),
            ("country_code", "not-a-code"),
            ("country_code", "JP"),
        ] {
            let result = EngineSettings::from_pairs([(key, value)]);
            assert!(
                matches!(result, Err(Error::InvalidSetting { .. })),
                "{key}={value} was accepted"
            );
        }
    }

    #[test]
    fn test_rejected_value_leaves_setting_unchanged() {
        let mut settings = EngineSettings::default();
        let before = settings.max_image_size_mb;
        let err = settings.set("max_image_size_mb", "NaN").unwrap_err();
        assert_eq!(settings.max_image_size_mb, before);
        assert!(err.to_string().contains("max_image_size_mb must be positive"));
    }

    #[test]
    fn test_work_dir_default_is_under_temp() {
        let settings = EngineSettings::default();
        assert!(settings.work_dir().starts_with(std::env::temp_dir()));
    }
}
