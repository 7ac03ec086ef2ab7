//! Cohort extraction from the clinical store
//!
//! Three phases: cohort selection on a single coordinator connection, then
//! demographic enrichment and measurement fetching fanned out across the
//! worker pool, one store round trip per patient.

use crate::pool::{ExecutionReport, UnitContext, WorkerPool};
use crate::store::ClinicalStore;
use anyhow::Context;
use mdgl_common::model::MISSING_VALUE;
use mdgl_common::{CohortFilter, PatientRecord, RawMeasurement, Result};
use tracing::{debug, info};

const LB_TO_KG: f64 = 0.45359;
const OZ_TO_KG: f64 = 0.028349;
const IN_TO_CM: f64 = 2.54;

/// Admission weight items and their factor to kilograms
pub const WEIGHT_ITEMS: [(i64, f64); 6] = [
    (762, 1.0),
    (763, 1.0),
    (3723, 1.0),
    (3580, 1.0),
    (3581, LB_TO_KG),
    (3582, OZ_TO_KG),
];

/// Height items and their factor to centimetres
pub const HEIGHT_ITEMS: [(i64, f64); 8] = [
    (920, IN_TO_CM),
    (1394, IN_TO_CM),
    (4187, IN_TO_CM),
    (3486, IN_TO_CM),
    (3485, 1.0),
    (4188, 1.0),
    (226707, IN_TO_CM),
    (226730, 1.0),
];

/// One patient with their raw measurement feed
#[derive(Debug, Clone, PartialEq)]
pub struct PatientMeasurements {
    pub patient: PatientRecord,
    pub measurements: Vec<RawMeasurement>,
}

/// Select the cohort on the coordinator connection
pub async fn select_cohort(
    store: &mut ClinicalStore,
    filter: &CohortFilter,
) -> Result<Vec<PatientRecord>> {
    let patients = store.select_cohort(filter).await?;
    info!(
        patients = patients.len(),
        icu_types = filter.icu_types.len(),
        min_los_days = filter.min_length_of_stay_days(),
        "Cohort selected"
    );
    Ok(patients)
}

/// Attach admission height and weight to every patient
pub async fn enrich_demographics(
    pool: &WorkerPool<ClinicalStore>,
    patients: Vec<PatientRecord>,
) -> ExecutionReport<PatientRecord> {
    pool.execute(enrich_partition, (), patients).await
}

async fn enrich_partition(
    _shared: (),
    chunk: Vec<PatientRecord>,
    mut ctx: UnitContext<ClinicalStore, PatientRecord>,
) -> anyhow::Result<()> {
    let mut enriched = Vec::with_capacity(chunk.len());
    for mut patient in chunk {
        patient.weight = admission_value(&mut ctx.resource, &patient, &WEIGHT_ITEMS)
            .await
            .with_context(|| format!("Weight lookup failed for patient {}", patient.subject_id))?;
        patient.height = admission_value(&mut ctx.resource, &patient, &HEIGHT_ITEMS)
            .await
            .with_context(|| format!("Height lookup failed for patient {}", patient.subject_id))?;
        enriched.push(patient);
    }

    debug!(unit = ctx.unit, patients = enriched.len(), "Enriched partition");
    ctx.results.extend(enriched);
    Ok(())
}

/// Latest value charted at or before admission, converted with the item's
/// factor, or [`MISSING_VALUE`]
async fn admission_value(
    store: &mut ClinicalStore,
    patient: &PatientRecord,
    items: &[(i64, f64)],
) -> Result<f64> {
    let ids: Vec<i64> = items.iter().map(|(id, _)| *id).collect();
    let found = store.latest_charted_value(patient, &ids).await?;
    Ok(found
        .map(|(itemid, value)| convert(items, itemid, value))
        .unwrap_or(MISSING_VALUE))
}

fn convert(items: &[(i64, f64)], itemid: i64, value: f64) -> f64 {
    items
        .iter()
        .find(|(id, _)| *id == itemid)
        .map(|(_, factor)| value * factor)
        .unwrap_or(value)
}

/// Fetch every patient's raw measurement feed restricted to `ids`
pub async fn fetch_measurements(
    pool: &WorkerPool<ClinicalStore>,
    patients: Vec<PatientRecord>,
    ids: Vec<i64>,
) -> ExecutionReport<PatientMeasurements> {
    pool.execute(fetch_partition, ids, patients).await
}

async fn fetch_partition(
    ids: Vec<i64>,
    chunk: Vec<PatientRecord>,
    mut ctx: UnitContext<ClinicalStore, PatientMeasurements>,
) -> anyhow::Result<()> {
    let mut fetched = Vec::with_capacity(chunk.len());
    let mut rows = 0;
    for patient in chunk {
        let measurements = ctx
            .resource
            .measurements(&patient, &ids)
            .await
            .with_context(|| {
                format!("Measurement query failed for patient {}", patient.subject_id)
            })?;
        rows += measurements.len();
        fetched.push(PatientMeasurements {
            patient,
            measurements,
        });
    }

    debug!(unit = ctx.unit, patients = fetched.len(), rows, "Fetched partition");
    ctx.results.extend(fetched);
    Ok(())
}
