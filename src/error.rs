//! Error types for trapcam.

use std::path::PathBuf;

/// Result type alias for trapcam operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for trapcam.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Unknown key in a flat settings map.
    #[error("unknown setting '{key}'")]
    UnknownSetting {
        /// The unrecognized key.
        key: String,
    },

    /// Setting value could not be parsed.
    #[error("invalid value '{value}' for setting '{key}': {reason}")]
    InvalidSetting {
        /// Setting key.
        key: String,
        /// Offending value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No valid image files found.
    #[error("no valid image files found in the provided paths")]
    NoValidImageFiles,

    /// Image file does not exist.
    #[error("image file not found: {path}")]
    ImageNotFound {
        /// Path to the missing image.
        path: PathBuf,
    },

    /// Image file exceeds the configured size limit.
    #[error("image file too large: {size_mb:.1}MB (max: {max_mb}MB)")]
    ImageTooLarge {
        /// Path to the image.
        path: PathBuf,
        /// Actual file size in megabytes.
        size_mb: f64,
        /// Configured limit in megabytes.
        max_mb: f64,
    },

    /// The classifier process could not be started.
    #[error("failed to launch classifier '{program}': {source}")]
    BackendLaunch {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The classifier process exited unsuccessfully.
    #[error("classifier failed ({status}): {stderr}")]
    BackendFailed {
        /// Exit status description.
        status: String,
        /// Captured standard error output.
        stderr: String,
    },

    /// The classifier process did not finish in time.
    #[error("classifier timed out after {seconds}s")]
    BackendTimeout {
        /// Timeout that elapsed, in seconds.
        seconds: u64,
    },

    /// The classifier finished without writing its output file.
    #[error("classifier output file not created: {path}")]
    BackendOutputMissing {
        /// Expected output path.
        path: PathBuf,
    },

    /// The classifier output file exists but could not be read.
    #[error("failed to read classifier output '{path}': {source}")]
    BackendOutputRead {
        /// Path to the output file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The classifier output file is not valid JSON.
    #[error("failed to parse classifier output '{path}': {source}")]
    BackendOutputParse {
        /// Path to the output file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The classifier is not usable in this environment.
    #[error("classifier backend unavailable: {reason}")]
    BackendUnavailable {
        /// Description of the problem.
        reason: String,
    },

    /// Batch processing was requested before the engine was initialized.
    #[error("detector not initialized, call initialize() first")]
    EngineNotInitialized,

    /// A batch is already running on this engine.
    #[error("a batch is already running")]
    EngineBusy,

    /// Failed to create output directory.
    #[error("failed to create output directory '{path}'")]
    OutputDirCreateFailed {
        /// Path to the output directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a CSV report.
    #[error("failed to write report '{path}'")]
    ReportWrite {
        /// Path to the report file.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// Failed to read a CSV report.
    #[error("failed to read report '{path}'")]
    ReportRead {
        /// Path to the report file.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// A report row has an unexpected value.
    #[error("invalid report '{path}' line {line}: {message}")]
    ReportFormat {
        /// Path to the report file.
        path: PathBuf,
        /// 1-based line number including the header.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// Failed to write JSON output file.
    #[error("failed to write JSON output file '{path}'")]
    JsonWrite {
        /// Path to the JSON file.
        path: PathBuf,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}
