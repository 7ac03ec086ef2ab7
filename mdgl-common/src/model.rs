//! Patient and measurement models shared by extraction and normalization

use crate::catalog::IcuType;
use crate::time::ElapsedTime;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Value used for height/weight when nothing was charted before admission
pub const MISSING_VALUE: f64 = -1.0;

/// Source ID carried by the static demographic entries
pub const STATIC_SOURCE_ID: i64 = -1;

/// Labels of the static entries, in output order
pub const STATIC_LABELS: [&str; 6] = ["RecordID", "Age", "Gender", "ICUType", "Height", "Weight"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub fn from_code(code: &str) -> Result<Self> {
        match code.trim() {
            "F" => Ok(Sex::Female),
            "M" => Ok(Sex::Male),
            other => Err(Error::Parse(format!("Unknown gender code: {:?}", other))),
        }
    }

    /// `Gender` static value: 0 for female, 1 otherwise
    pub fn indicator(self) -> f64 {
        match self {
            Sex::Female => 0.0,
            Sex::Male => 1.0,
        }
    }
}

/// One ICU stay selected into the cohort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRecord {
    pub subject_id: i64,
    pub hadm_id: i64,
    pub icustay_id: i64,
    /// Admission anchor (t0) for elapsed offsets
    pub admitted_at: NaiveDateTime,
    pub date_of_birth: NaiveDateTime,
    pub sex: Sex,
    pub icu_type: IcuType,
    /// Centimetres, or [`MISSING_VALUE`]
    pub height: f64,
    /// Kilograms, or [`MISSING_VALUE`]
    pub weight: f64,
}

impl PatientRecord {
    /// Age in whole years at admission (days / 365, floored)
    pub fn age_years(&self) -> i64 {
        (self.admitted_at - self.date_of_birth)
            .num_days()
            .div_euclid(365)
    }
}

/// One row of the measurement feed, before decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurement {
    pub subject_id: i64,
    pub charted_at: NaiveDateTime,
    pub source_id: i64,
    pub value: String,
}

/// One entry of a patient time series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMeasurement {
    pub elapsed: ElapsedTime,
    pub label: String,
    pub source_id: i64,
    pub value: f64,
}

impl CanonicalMeasurement {
    fn fixed(label: &str, value: f64) -> Self {
        Self {
            elapsed: ElapsedTime::ZERO,
            label: label.to_string(),
            source_id: STATIC_SOURCE_ID,
            value,
        }
    }
}

/// Output series for one patient: six static entries then decoded readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientTimeSeries {
    pub record_id: i64,
    entries: Vec<CanonicalMeasurement>,
}

impl PatientTimeSeries {
    /// Number of static entries heading every series
    pub const STATIC_ENTRIES: usize = 6;

    /// Start a series with the patient's static demographics
    pub fn for_patient(patient: &PatientRecord) -> Self {
        let values = [
            patient.subject_id as f64,
            patient.age_years() as f64,
            patient.sex.indicator(),
            patient.icu_type.ordinal() as f64,
            patient.height,
            patient.weight,
        ];
        let entries = STATIC_LABELS
            .iter()
            .zip(values)
            .map(|(label, value)| CanonicalMeasurement::fixed(label, value))
            .collect();

        Self {
            record_id: patient.subject_id,
            entries,
        }
    }

    pub fn push(&mut self, measurement: CanonicalMeasurement) {
        self.entries.push(measurement);
    }

    pub fn entries(&self) -> &[CanonicalMeasurement] {
        &self.entries
    }

    pub fn static_entries(&self) -> &[CanonicalMeasurement] {
        &self.entries[..Self::STATIC_ENTRIES]
    }

    pub fn dynamic_entries(&self) -> &[CanonicalMeasurement] {
        &self.entries[Self::STATIC_ENTRIES..]
    }
}
