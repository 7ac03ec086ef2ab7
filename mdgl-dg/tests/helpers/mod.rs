//! Shared test helpers for mdgl-dg integration tests

#![allow(dead_code)]

pub mod clinical_store;

pub use clinical_store::ClinicalFixture;

use mdgl_common::SpecificationCatalog;

/// Catalog over MICU/SICU with the given horizon (`None` = unlimited) and
/// HCT, MechVent and TroponinT parameters
pub fn test_catalog(hours: Option<i64>) -> SpecificationCatalog {
    let hours = hours
        .map(|h| format!("hours = {}\n", h))
        .unwrap_or_default();
    let text = format!(
        r#"
icu_types = ["MICU", "SICU"]

[cohort]
age_min = 15
age_max = 90
sex = "Both"
{hours}
[[parameters]]
abbreviation = "HCT"
name = "Hematocrit"
unit = "%"
ids = [50810]

[[parameters]]
abbreviation = "MechVent"
name = "Mechanical ventilation"
ids = [467, 468, 720, 722]

[[parameters]]
abbreviation = "TroponinT"
name = "Troponin-T"
unit = "ng/mL"
ids = [51003]

[[parameters]]
abbreviation = "Urine"
name = "Urine output"
unit = "mL"
ids = [40055]
"#
    );
    SpecificationCatalog::from_toml_str(&text).expect("test catalog is valid")
}
