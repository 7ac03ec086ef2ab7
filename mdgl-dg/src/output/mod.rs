//! Dataset output: per-patient CSV files, statistics report, run summary

pub mod csv_writer;
pub mod report;

pub use csv_writer::{read_patient_dir, write_cohort, write_patient_csv};
pub use report::{AggregateReporter, ParameterStatistics};

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Prefix of every generated dataset directory
pub const OUTPUT_DIR_PREFIX: &str = "patientfiles";

pub const REPORT_FILE_NAME: &str = "StatisticsReport.txt";

pub const SUMMARY_FILE_NAME: &str = "run_summary.json";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid patient file {path}: {reason}")]
    InvalidPatientFile { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, OutputError>;

/// Create `<root>/patientfiles YYYYMMDD-HHMMSS` for a run started at `started`
pub fn create_output_dir(root: &Path, started: NaiveDateTime) -> Result<PathBuf> {
    let name = format!(
        "{} {}",
        OUTPUT_DIR_PREFIX,
        started.format("%Y%m%d-%H%M%S")
    );
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    info!("Output directory: {}", dir.display());
    Ok(dir)
}

/// Copy the catalog a run was generated from next to its output
pub fn copy_catalog(catalog_path: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = catalog_path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("catalog.toml"));
    let target = dir.join(file_name);
    std::fs::copy(catalog_path, &target)?;
    Ok(target)
}

/// Write `value` as pretty JSON to `dir/file_name`
pub fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
