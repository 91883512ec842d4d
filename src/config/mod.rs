//! Configuration loading and management.

mod file;
mod paths;
mod settings;
mod types;
mod validate;

pub use file::{load_config, load_config_file, save_config, save_default_config};
pub use paths::{config_dir, config_file_path};
pub use settings::EngineSettings;
pub use types::{BackendConfig, Config, DetectionConfig, OutputConfig, ProcessingConfig};
pub use validate::{validate_config, validate_settings};
