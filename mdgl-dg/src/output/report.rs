//! Cohort statistics report
//!
//! Per catalog parameter: how many patients have it, how many values were
//! recorded, and the five-number summary plus mean of those values.
//! Percentiles interpolate linearly between closest ranks.

use super::{Result, REPORT_FILE_NAME};
use chrono::NaiveDateTime;
use mdgl_common::{CanonicalMeasurement, PatientTimeSeries, SpecificationCatalog};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub min: f64,
    pub first_quartile: f64,
    pub median: f64,
    pub mean: f64,
    pub third_quartile: f64,
    pub max: f64,
}

impl Summary {
    /// `None` for an empty sample
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            min: sorted[0],
            first_quartile: percentile(&sorted, 25.0),
            median: percentile(&sorted, 50.0),
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            third_quartile: percentile(&sorted, 75.0),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Linear-interpolated percentile of an ascending, non-empty slice
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterStatistics {
    pub abbreviation: String,
    pub patients: usize,
    pub values: usize,
    pub summary: Option<Summary>,
}

#[derive(Debug, Default)]
struct Tally {
    patients: usize,
    values: Vec<f64>,
}

/// Accumulates dynamic entries patient by patient
#[derive(Debug, Default)]
pub struct AggregateReporter {
    patients: usize,
    tallies: BTreeMap<String, Tally>,
}

impl AggregateReporter {
    /// Reporter listing every catalog parameter, even ones never observed
    pub fn new(catalog: &SpecificationCatalog) -> Self {
        let tallies = catalog
            .parameters()
            .iter()
            .map(|p| (p.abbreviation.clone(), Tally::default()))
            .collect();
        Self {
            patients: 0,
            tallies,
        }
    }

    pub fn add_series(&mut self, series: &PatientTimeSeries) {
        self.add_entries(series.dynamic_entries());
    }

    /// Add one patient's dynamic entries
    pub fn add_entries(&mut self, entries: &[CanonicalMeasurement]) {
        self.patients += 1;
        let mut seen = BTreeSet::new();
        for entry in entries {
            let tally = self.tallies.entry(entry.label.clone()).or_default();
            tally.values.push(entry.value);
            if seen.insert(entry.label.as_str()) {
                tally.patients += 1;
            }
        }
    }

    pub fn patient_count(&self) -> usize {
        self.patients
    }

    /// Statistics per parameter, ordered by abbreviation
    pub fn statistics(&self) -> Vec<ParameterStatistics> {
        self.tallies
            .iter()
            .map(|(abbreviation, tally)| ParameterStatistics {
                abbreviation: abbreviation.clone(),
                patients: tally.patients,
                values: tally.values.len(),
                summary: Summary::of(&tally.values),
            })
            .collect()
    }

    /// Report text for the dataset at `location`
    pub fn render(&self, generated_at: NaiveDateTime, location: &Path) -> String {
        let mut out = String::from("Statistics Report\n");
        out.push_str(&format!(
            "Generated on {} for the patient dataset located at: {}\n",
            generated_at.format("%Y-%m-%d %H:%M:%S"),
            location.display()
        ));
        out.push_str(&format!("Total number of patients: {}\n\n", self.patients));

        for stats in self.statistics() {
            out.push_str(&render_parameter(&stats));
        }
        out
    }

    /// Write `StatisticsReport.txt` into `dir`
    pub fn write(&self, dir: &Path, generated_at: NaiveDateTime) -> Result<PathBuf> {
        let path = dir.join(REPORT_FILE_NAME);
        std::fs::write(&path, self.render(generated_at, dir))?;
        Ok(path)
    }
}

/// One parameter's block, blank-line terminated
fn render_parameter(stats: &ParameterStatistics) -> String {
    let name = &stats.abbreviation;
    let mut block = format!(
        "Measurement: {name}\nNumber of patients with {name} recorded: {}\nNumber of values recorded: {}\n",
        stats.patients, stats.values
    );
    if let Some(s) = stats.summary {
        let rows = [
            ("Minimum", s.min),
            ("First Q", s.first_quartile),
            ("Median ", s.median),
            ("Mean   ", s.mean),
            ("Third Q", s.third_quartile),
            ("Maximum", s.max),
        ];
        for (label, value) in rows {
            block.push_str(&format!("{}: {:13.3}\n", label, value));
        }
    }
    block.push('\n');
    block
}
