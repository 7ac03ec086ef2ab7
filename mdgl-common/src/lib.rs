//! # MDGL Common Library
//!
//! Shared code for the MIMIC dataset generator:
//! - Specification catalog (cohort filter, measurement parameters)
//! - Patient and measurement models
//! - Bootstrap configuration loading
//! - Clinical store schema and connections
//! - Timestamp utilities

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod time;

pub use catalog::{CohortFilter, Horizon, IcuType, ParameterDescriptor, SexFilter, SpecificationCatalog};
pub use error::{Error, Result};
pub use model::{CanonicalMeasurement, PatientRecord, PatientTimeSeries, RawMeasurement, Sex};
pub use time::ElapsedTime;
