//! CLI argument parsing and command handling.

mod args;
pub mod help;

pub use args::{AnalyzeArgs, Cli, Command, ConfigAction, ModeArg};
