//! Clinical store access
//!
//! [`ClinicalStore`] wraps one read-only SQLite connection and runs the
//! generator's three parameterized queries against it. The worker pool
//! binds one store to each unit.

pub mod queries;

use mdgl_common::db::connect_readonly;
use mdgl_common::model::MISSING_VALUE;
use mdgl_common::time::{format_timestamp, parse_timestamp};
use mdgl_common::{CohortFilter, IcuType, PatientRecord, RawMeasurement, Result, Sex};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::path::Path;
use tracing::debug;

/// One connection to the clinical store
#[derive(Debug)]
pub struct ClinicalStore {
    conn: SqliteConnection,
}

impl ClinicalStore {
    /// Open the store read-only
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(connect_readonly(path).await?))
    }

    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// Latest qualifying ICU stay of every subject matching `filter`,
    /// ordered by subject id. Height and weight are left missing.
    pub async fn select_cohort(&mut self, filter: &CohortFilter) -> Result<Vec<PatientRecord>> {
        let genders = filter.sex.codes();
        let units: Vec<&str> = filter.icu_types.iter().map(|u| u.code()).collect();
        let sql = queries::cohort_query(genders.len(), units.len());

        let mut query = sqlx::query(&sql)
            .bind(filter.min_length_of_stay_days())
            .bind(filter.age_min as i64)
            .bind(filter.age_max as i64);
        for code in genders {
            query = query.bind(*code);
        }
        for code in units {
            query = query.bind(code);
        }

        let rows = query.fetch_all(&mut self.conn).await?;
        debug!(rows = rows.len(), "Cohort query returned");

        rows.iter()
            .map(|row| -> Result<PatientRecord> {
                let unit: String = row.try_get("first_careunit")?;
                let gender: String = row.try_get("gender")?;
                let intime: String = row.try_get("intime")?;
                let dob: String = row.try_get("dob")?;
                Ok(PatientRecord {
                    subject_id: row.try_get("subject_id")?,
                    hadm_id: row.try_get("hadm_id")?,
                    icustay_id: row.try_get("icustay_id")?,
                    admitted_at: parse_timestamp(&intime)?,
                    date_of_birth: parse_timestamp(&dob)?,
                    sex: Sex::from_code(&gender)?,
                    icu_type: unit.parse::<IcuType>()?,
                    height: MISSING_VALUE,
                    weight: MISSING_VALUE,
                })
            })
            .collect()
    }

    /// Most recent numeric chart value among `ids` charted at or before the
    /// patient's admission, as `(itemid, value)`.
    pub async fn latest_charted_value(
        &mut self,
        patient: &PatientRecord,
        ids: &[i64],
    ) -> Result<Option<(i64, f64)>> {
        if ids.is_empty() {
            return Ok(None);
        }

        let sql = queries::latest_charted_value_query(ids.len());
        let mut query = sqlx::query(&sql)
            .bind(patient.subject_id)
            .bind(patient.hadm_id)
            .bind(format_timestamp(&patient.admitted_at));
        for id in ids {
            query = query.bind(*id);
        }

        match query.fetch_optional(&mut self.conn).await? {
            Some(row) => Ok(Some((row.try_get("itemid")?, row.try_get("valuenum")?))),
            None => Ok(None),
        }
    }

    /// Raw measurement feed of one stay for the given source IDs, in
    /// ascending charting order, starting at admission.
    pub async fn measurements(
        &mut self,
        patient: &PatientRecord,
        ids: &[i64],
    ) -> Result<Vec<RawMeasurement>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = queries::measurements_query(ids.len());
        let admitted_at = format_timestamp(&patient.admitted_at);
        let mut query = sqlx::query(&sql);
        for _ in 0..queries::MEASUREMENT_SOURCES {
            query = query
                .bind(patient.subject_id)
                .bind(patient.hadm_id)
                .bind(admitted_at.clone());
            for id in ids {
                query = query.bind(*id);
            }
        }

        let rows = query.fetch_all(&mut self.conn).await?;
        rows.iter()
            .map(|row| -> Result<RawMeasurement> {
                let charted: String = row.try_get("charttime")?;
                Ok(RawMeasurement {
                    subject_id: row.try_get("subject_id")?,
                    charted_at: parse_timestamp(&charted)?,
                    source_id: row.try_get("itemid")?,
                    value: row.try_get("value")?,
                })
            })
            .collect()
    }
}
