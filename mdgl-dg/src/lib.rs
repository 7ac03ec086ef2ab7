//! # mdgl-dg (Dataset Generator)
//!
//! Builds a per-patient ICU time series dataset from a MIMIC-III style
//! clinical store:
//! - Cohort selection from the catalog's filter
//! - Parallel demographic enrichment and measurement extraction
//! - Parallel normalization into canonical time series
//! - CSV patient files, statistics report and run summary

pub mod extract;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod store;

pub use extract::PatientMeasurements;
pub use normalize::{NormalizedPatient, Normalizer};
pub use pipeline::{generate_dataset, rebuild_report, PipelineError, RunOptions, RunSummary};
pub use pool::{ExecutionReport, PartitionError, PoolError, WorkerPool};
pub use store::ClinicalStore;
