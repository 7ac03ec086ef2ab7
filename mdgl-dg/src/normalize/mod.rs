//! Per-patient normalization of the raw measurement feed
//!
//! A patient's raw rows arrive in ascending charting order. The normalizer
//! walks them once, turning each into a canonical entry relative to the
//! admission anchor, and collects a diagnostic for every row it has to
//! drop. Ventilation decoder memory lives only for the duration of one
//! patient's walk.

pub mod decoders;

use crate::extract::PatientMeasurements;
use crate::pool::{ExecutionReport, UnitContext, WorkerPool};
use anyhow::Context;
use decoders::{DecoderTable, VentilationState};
use mdgl_common::{
    CanonicalMeasurement, ElapsedTime, PatientRecord, PatientTimeSeries, RawMeasurement,
    SpecificationCatalog,
};
use tracing::debug;

/// Label used in diagnostics for source IDs no parameter claims
pub const UNMAPPED_LABEL: &str = "<unmapped>";

/// Series of one patient plus the rows that could not be used
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPatient {
    pub series: PatientTimeSeries,
    pub diagnostics: Vec<String>,
}

/// Catalog-driven decoder for patient measurement streams
#[derive(Debug, Clone)]
pub struct Normalizer {
    catalog: SpecificationCatalog,
    decoders: DecoderTable,
}

impl Normalizer {
    pub fn new(catalog: SpecificationCatalog) -> Self {
        Self::with_decoders(catalog, DecoderTable::default())
    }

    pub fn with_decoders(catalog: SpecificationCatalog, decoders: DecoderTable) -> Self {
        Self { catalog, decoders }
    }

    pub fn catalog(&self) -> &SpecificationCatalog {
        &self.catalog
    }

    /// Build one patient's series from their ascending raw feed
    pub fn normalize(
        &self,
        patient: &PatientRecord,
        measurements: &[RawMeasurement],
    ) -> NormalizedPatient {
        let horizon = self.catalog.filter().horizon;
        let mut series = PatientTimeSeries::for_patient(patient);
        let mut diagnostics = Vec::new();
        let mut ventilation = VentilationState::new();

        for raw in measurements {
            let elapsed = ElapsedTime::between(patient.admitted_at, raw.charted_at);
            if elapsed.is_negative() {
                continue;
            }
            // Feed is ascending, so nothing later can be inside the horizon
            if horizon.is_reached(elapsed.hours) {
                break;
            }

            let Some(descriptor) = self.catalog.descriptor_for(raw.source_id) else {
                diagnostics.push(diagnostic(patient, elapsed, UNMAPPED_LABEL, raw));
                continue;
            };

            let decoder = self.decoders.decoder_for(raw.source_id);
            match decoder.decode(&raw.value, raw.charted_at, &mut ventilation) {
                Ok(value) => series.push(CanonicalMeasurement {
                    elapsed,
                    label: descriptor.abbreviation.clone(),
                    source_id: raw.source_id,
                    value,
                }),
                Err(_) => {
                    diagnostics.push(diagnostic(patient, elapsed, &descriptor.abbreviation, raw))
                }
            }
        }

        NormalizedPatient {
            series,
            diagnostics,
        }
    }
}

fn diagnostic(
    patient: &PatientRecord,
    elapsed: ElapsedTime,
    label: &str,
    raw: &RawMeasurement,
) -> String {
    format!(
        "PatientID - {}, Time - {}, Measurement - {}, MeasurementID - {}, Value - {}",
        patient.subject_id, elapsed, label, raw.source_id, raw.value
    )
}

/// Normalize every patient of the cohort across the pool.
///
/// Decoding is CPU-bound, so each unit runs its partition on the blocking
/// thread pool. Unit resources are held but not used.
pub async fn normalize_cohort<R: Send + 'static>(
    pool: &WorkerPool<R>,
    normalizer: Normalizer,
    cohort: Vec<PatientMeasurements>,
) -> ExecutionReport<NormalizedPatient> {
    pool.execute(normalize_partition, normalizer, cohort).await
}

async fn normalize_partition<R>(
    normalizer: Normalizer,
    chunk: Vec<PatientMeasurements>,
    ctx: UnitContext<R, NormalizedPatient>,
) -> anyhow::Result<()> {
    let unit = ctx.unit;
    let decoded = tokio::task::spawn_blocking(move || {
        chunk
            .iter()
            .map(|p| normalizer.normalize(&p.patient, &p.measurements))
            .collect::<Vec<_>>()
    })
    .await;

    let decoded = match decoded {
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        other => other.context("Normalization task did not finish")?,
    };

    debug!(unit, patients = decoded.len(), "Normalized partition");
    ctx.results.extend(decoded);
    Ok(())
}
