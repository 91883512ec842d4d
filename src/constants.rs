//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "trapcam";

/// Default minimum confidence threshold for retained detections.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Default number of worker threads.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default batch size passed to the external classifier.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Default per-image classifier timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default maximum accepted image size in megabytes.
pub const DEFAULT_MAX_IMAGE_SIZE_MB: f64 = 50.0;

/// Default ISO-3 country code passed to the classifier.
pub const DEFAULT_COUNTRY_CODE: &str = "JPN";

/// Bytes per megabyte used for the size guard.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Confidence value bounds.
pub mod confidence {
    /// Minimum valid confidence value.
    pub const MIN: f64 = 0.0;
    /// Maximum valid confidence value.
    pub const MAX: f64 = 1.0;
    /// Decimal places for confidence formatting in reports.
    pub const DECIMAL_PLACES: usize = 3;
}

/// Processing time estimation.
pub mod estimate {
    /// Assumed seconds per image when no history is available.
    pub const DEFAULT_SECS_PER_IMAGE: f64 = 2.0;
    /// Multiplier applied to estimates as a safety buffer.
    pub const BUFFER_FACTOR: f64 = 1.2;
}

/// External classifier (`SpeciesNet`) invocation constants.
pub mod speciesnet {
    /// Default Python interpreter.
    pub const DEFAULT_PYTHON: &str = "python3";
    /// Python module that runs the model.
    pub const DEFAULT_MODULE: &str = "speciesnet.scripts.run_model";
    /// PATH fragments dropped from the subprocess environment by default.
    pub const DEFAULT_PATH_EXCLUDE: &[&str] = &["miniforge3"];
    /// Environment variables removed before launching the interpreter.
    pub const STRIPPED_ENV_VARS: &[&str] = &["PYTHONHOME", "PYTHONPATH"];
    /// Prefix for per-call temporary prediction files.
    pub const OUTPUT_FILE_PREFIX: &str = "speciesnet_temp_";
    /// Timeout for the availability probe in seconds.
    pub const PROBE_TIMEOUT_SECS: u64 = 30;
    /// Poll interval while waiting for the subprocess, in milliseconds.
    pub const POLL_INTERVAL_MS: u64 = 50;
    /// How long to wait for pipe readers after killing a timed-out process.
    pub const READER_GRACE_MS: u64 = 2000;
}

/// Taxonomy string handling.
pub mod taxonomy {
    /// Number of semicolon-separated fields in a full prediction label.
    pub const FIELD_COUNT: usize = 7;
    /// Common names too generic to use as a display name.
    pub const GENERIC_NAMES: &[&str] = &["bird", "mammal", "animal"];
    /// Suffix of generic common names such as "bear species".
    pub const GENERIC_SUFFIX: &str = " species";
    /// Conventional suffix of zoological family names.
    pub const FAMILY_SUFFIX: &str = "idae";
    /// Prediction source marker for genus rollups.
    pub const ROLLUP_GENUS: &str = "rollup_to_genus";
    /// Prediction source marker for family rollups.
    pub const ROLLUP_FAMILY: &str = "rollup_to_family";
    /// Prediction source marker for order rollups.
    pub const ROLLUP_ORDER: &str = "rollup_to_order";
}

/// Mock backend constants.
pub mod mock {
    /// Maximum number of synthesized detections per image.
    pub const MAX_DETECTIONS: usize = 3;
    /// Lower bound of synthesized confidence.
    pub const MIN_CONFIDENCE: f64 = 0.5;
    /// Upper bound (exclusive) of synthesized confidence.
    pub const MAX_CONFIDENCE: f64 = 0.99;
    /// Simulated processing delay in milliseconds.
    pub const DELAY_MS: u64 = 100;
    /// Species table: scientific name, English name, category.
    pub const SPECIES: &[(&str, &str, &str)] = &[
        ("Ursus thibetanus", "Asian black bear", "mammal"),
        ("Cervus nippon", "Sika deer", "mammal"),
        ("Sus scrofa", "Wild boar", "mammal"),
        ("Nyctereutes procyonoides", "Raccoon dog", "mammal"),
        ("Corvus macrorhynchos", "Large-billed crow", "bird"),
        ("Ardea cinerea", "Grey heron", "bird"),
        ("Phasianus versicolor", "Green pheasant", "bird"),
    ];
}

/// Default image file extensions.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

/// Default report output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Report file names and formatting.
pub mod reports {
    /// Detailed results file prefix.
    pub const DETAILED_PREFIX: &str = "wildlife_detection_results";
    /// Summary file prefix.
    pub const SUMMARY_PREFIX: &str = "wildlife_detection_summary";
    /// Species statistics file prefix.
    pub const SPECIES_PREFIX: &str = "wildlife_species_stats";
    /// Error log file prefix.
    pub const ERRORS_PREFIX: &str = "wildlife_detection_errors";
    /// JSON report prefix.
    pub const JSON_PREFIX: &str = "wildlife_detection";
    /// Timestamp format used in report file names.
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
}

/// UTF-8 Byte Order Mark for Excel compatibility in CSV files.
pub const UTF8_BOM: &[u8; 3] = b"\xEF\xBB\xBF";
