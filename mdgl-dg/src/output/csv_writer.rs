//! Patient time series CSV files
//!
//! One `<record id>.csv` per patient with header `Time,Parameter,Id,Value`.
//! Values are written with three decimals.

use super::{OutputError, Result};
use mdgl_common::{CanonicalMeasurement, ElapsedTime, PatientTimeSeries};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CSV_HEADER: [&str; 4] = ["Time", "Parameter", "Id", "Value"];

/// Write one patient's series to `dir/<record_id>.csv`
pub fn write_patient_csv(dir: &Path, series: &PatientTimeSeries) -> Result<PathBuf> {
    let path = dir.join(format!("{}.csv", series.record_id));
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(CSV_HEADER)?;
    for entry in series.entries() {
        writer.write_record([
            entry.elapsed.to_string(),
            entry.label.clone(),
            entry.source_id.to_string(),
            format!("{:.3}", entry.value),
        ])?;
    }
    writer.flush()?;
    Ok(path)
}

/// Write every series, returning how many files were written
pub fn write_cohort<'a, I>(dir: &Path, cohort: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a PatientTimeSeries>,
{
    let mut written = 0;
    for series in cohort {
        write_patient_csv(dir, series)?;
        written += 1;
    }
    debug!(files = written, "Patient files written");
    Ok(written)
}

/// Read back one patient file
pub fn read_patient_csv(path: &Path) -> Result<Vec<CanonicalMeasurement>> {
    let invalid = |reason: String| OutputError::InvalidPatientFile {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.iter().ne(CSV_HEADER) {
        return Err(invalid(format!("unexpected header {:?}", headers)));
    }

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or_default();
        entries.push(CanonicalMeasurement {
            elapsed: field(0)
                .parse::<ElapsedTime>()
                .map_err(|e| invalid(format!("{}", e)))?,
            label: field(1).to_string(),
            source_id: field(2)
                .parse()
                .map_err(|_| invalid(format!("bad Id {:?}", field(2))))?,
            value: field(3)
                .parse()
                .map_err(|_| invalid(format!("bad Value {:?}", field(3))))?,
        });
    }
    Ok(entries)
}

/// Read every `*.csv` patient file of a dataset directory, in file name order
pub fn read_patient_dir(dir: &Path) -> Result<Vec<Vec<CanonicalMeasurement>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    paths.iter().map(|p| read_patient_csv(p)).collect()
}
