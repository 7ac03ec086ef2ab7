//! End-to-end dataset generation run
//!
//! Opens the worker pool and a coordinator connection, selects the cohort,
//! runs the three parallel phases and writes the dataset directory. Pool
//! construction and cohort selection failures abort the run before any
//! output exists; partition failures in later phases are logged, counted in
//! the run summary and do not stop the run.

use crate::extract::{self, enrich_demographics, fetch_measurements};
use crate::normalize::{normalize_cohort, Normalizer};
use crate::output::{
    self, read_patient_dir, write_cohort, AggregateReporter, OutputError, SUMMARY_FILE_NAME,
};
use crate::pool::{detect_concurrency, ExecutionReport, PoolError, WorkerPool};
use crate::store::ClinicalStore;
use chrono::{Local, NaiveDateTime};
use mdgl_common::{PatientTimeSeries, SpecificationCatalog};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Clinical store error: {0}")]
    Store(#[from] mdgl_common::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

/// Settings of one generation run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Clinical SQLite store
    pub database_path: PathBuf,
    /// Parent of the timestamped output directory
    pub output_root: PathBuf,
    /// Catalog file to copy next to the output, when loaded from disk
    pub catalog_path: Option<PathBuf>,
    /// Worker count; hardware parallelism when `None`
    pub concurrency: Option<usize>,
}

/// Outcome of one parallel phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub partitions: usize,
    pub failed_partitions: usize,
    /// Patients lost with their failed partitions
    pub failed_patients: usize,
}

impl PhaseSummary {
    fn of<A>(phase: &str, report: &ExecutionReport<A>) -> Self {
        let summary = Self {
            partitions: report.partitions().len(),
            failed_partitions: report.failed_count(),
            failed_patients: report.failed_items(),
        };
        if summary.failed_partitions > 0 {
            error!(
                phase,
                failed_partitions = summary.failed_partitions,
                failed_patients = summary.failed_patients,
                "Phase finished with failed partitions"
            );
        }
        summary
    }
}

/// Written to `run_summary.json` in the output directory
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: NaiveDateTime,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub cohort_size: usize,
    pub patients_written: usize,
    pub diagnostics: usize,
    pub enrichment: PhaseSummary,
    pub extraction: PhaseSummary,
    pub normalization: PhaseSummary,
    pub elapsed_seconds: f64,
}

/// Generate the dataset described by `catalog`
pub async fn generate_dataset(
    catalog: &SpecificationCatalog,
    options: &RunOptions,
) -> Result<RunSummary, PipelineError> {
    let clock = Instant::now();
    let started_at = Local::now().naive_local();
    let concurrency = options.concurrency.unwrap_or_else(detect_concurrency);
    let database = options.database_path.as_path();

    info!(concurrency, database = %database.display(), "Opening clinical store");
    let mut coordinator = ClinicalStore::open(database).await?;
    let pool = WorkerPool::connect(concurrency, |_unit| ClinicalStore::open(database)).await?;

    let cohort = extract::select_cohort(&mut coordinator, catalog.filter()).await?;
    drop(coordinator);
    let cohort_size = cohort.len();

    let phase = Instant::now();
    let enriched = enrich_demographics(&pool, cohort).await;
    let enrichment = PhaseSummary::of("enrichment", &enriched);
    let mut patients = enriched.into_results();
    patients.sort_by_key(|p| p.subject_id);
    info!(
        patients = patients.len(),
        elapsed_ms = phase.elapsed().as_millis() as u64,
        "Demographics attached"
    );

    let phase = Instant::now();
    let fetched = fetch_measurements(&pool, patients, catalog.measurement_ids()).await;
    let extraction = PhaseSummary::of("extraction", &fetched);
    let feeds = fetched.into_results();
    info!(
        patients = feeds.len(),
        rows = feeds.iter().map(|p| p.measurements.len()).sum::<usize>(),
        elapsed_ms = phase.elapsed().as_millis() as u64,
        "Measurements fetched"
    );

    let phase = Instant::now();
    let normalized = normalize_cohort(&pool, Normalizer::new(catalog.clone()), feeds).await;
    let normalization = PhaseSummary::of("normalization", &normalized);
    let mut normalized = normalized.into_results();
    normalized.sort_by_key(|p| p.series.record_id);
    info!(
        patients = normalized.len(),
        elapsed_ms = phase.elapsed().as_millis() as u64,
        "Patients normalized"
    );

    let mut diagnostics = 0;
    for patient in &normalized {
        for line in &patient.diagnostics {
            warn!("Invalid measurement: {}", line);
        }
        diagnostics += patient.diagnostics.len();
    }

    let series: Vec<PatientTimeSeries> = normalized.into_iter().map(|p| p.series).collect();
    let dir = output::create_output_dir(&options.output_root, started_at)?;
    let patients_written = write_cohort(&dir, &series)?;

    let mut reporter = AggregateReporter::new(catalog);
    for s in &series {
        reporter.add_series(s);
    }
    reporter.write(&dir, Local::now().naive_local())?;

    if let Some(path) = &options.catalog_path {
        output::copy_catalog(path, &dir)?;
    }

    let summary = RunSummary {
        started_at,
        output_dir: dir.clone(),
        concurrency: pool.concurrency(),
        cohort_size,
        patients_written,
        diagnostics,
        enrichment,
        extraction,
        normalization,
        elapsed_seconds: clock.elapsed().as_secs_f64(),
    };
    output::write_json(&dir, SUMMARY_FILE_NAME, &summary)?;

    info!(
        patients = patients_written,
        diagnostics,
        elapsed_seconds = summary.elapsed_seconds,
        "Dataset written to {}",
        dir.display()
    );
    Ok(summary)
}

/// Recompute `StatisticsReport.txt` from the patient files of an existing
/// dataset directory. Returns the number of patients read.
pub fn rebuild_report(catalog: &SpecificationCatalog, dir: &Path) -> Result<usize, PipelineError> {
    let patients = read_patient_dir(dir)?;
    let mut reporter = AggregateReporter::new(catalog);
    for entries in &patients {
        let dynamic = entries
            .get(PatientTimeSeries::STATIC_ENTRIES..)
            .unwrap_or_default();
        reporter.add_entries(dynamic);
    }
    reporter.write(dir, Local::now().naive_local())?;
    info!(patients = patients.len(), "Statistics report rebuilt in {}", dir.display());
    Ok(patients.len())
}
