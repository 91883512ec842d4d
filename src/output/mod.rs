//! Report writers and progress display.

mod csv;
mod json;
pub mod progress;

pub use csv::{ReportExporter, ReportFiles, import_detailed_results};
pub use json::{JsonReport, JsonSettings, write_json_report};
