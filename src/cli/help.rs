//! Help message display for CLI.

#![allow(clippy::print_stdout)]

use crate::config::Config;

/// Usage hint shown when no inputs were given.
pub fn usage_hint(config: &Config) -> String {
    let mode = config
        .detection
        .mode
        .map_or_else(|| "auto".to_string(), |m| m.to_string());
    format!(
        "Usage: trapcam [IMAGES]... [OPTIONS]\n\
         \n\
         Example: trapcam ./camera01 -w 4 -c 0.6 --country {country}\n\
         \n\
         Configured mode: {mode}, reports go to '{output}'.\n\
         Run 'trapcam config init' to create a configuration file, or 'trapcam -h' for all options.",
        country = config.detection.country_code,
        output = config.output.directory.display(),
    )
}

/// Print the usage hint.
pub fn print_smart_help(config: &Config) {
    println!("{}", usage_hint(config));
}
