//! Specification catalog: cohort filter and measurement parameters
//!
//! The catalog is the immutable input of a dataset generation run. It is
//! loaded from a TOML document and validated once; everything downstream
//! relies on the validated invariants (non-empty ICU set, disjoint
//! parameter ID sets, unique abbreviations).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// ICU care unit, in the fixed order used for the `ICUType` ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IcuType {
    #[serde(rename = "CCU")]
    Ccu,
    #[serde(rename = "SICU")]
    Sicu,
    #[serde(rename = "MICU")]
    Micu,
    #[serde(rename = "NICU")]
    Nicu,
    #[serde(rename = "CSRU")]
    Csru,
    #[serde(rename = "TSICU")]
    Tsicu,
}

impl IcuType {
    /// Code table; the position of a unit is its ordinal
    pub const ALL: [IcuType; 6] = [
        IcuType::Ccu,
        IcuType::Sicu,
        IcuType::Micu,
        IcuType::Nicu,
        IcuType::Csru,
        IcuType::Tsicu,
    ];

    /// Care unit code as stored in `icustays.first_careunit`
    pub fn code(self) -> &'static str {
        match self {
            IcuType::Ccu => "CCU",
            IcuType::Sicu => "SICU",
            IcuType::Micu => "MICU",
            IcuType::Nicu => "NICU",
            IcuType::Csru => "CSRU",
            IcuType::Tsicu => "TSICU",
        }
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl FromStr for IcuType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        IcuType::ALL
            .iter()
            .copied()
            .find(|icu| icu.code() == s.trim())
            .ok_or_else(|| Error::Parse(format!("Unknown ICU type: {:?}", s)))
    }
}

impl fmt::Display for IcuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which sexes the cohort admits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SexFilter {
    #[default]
    Both,
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl SexFilter {
    /// Gender codes matched against `patients.gender`
    pub fn codes(self) -> &'static [&'static str] {
        match self {
            SexFilter::Both => &["M", "F"],
            SexFilter::Male => &["M"],
            SexFilter::Female => &["F"],
        }
    }
}

/// How many hours of data to keep per patient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    Hours(u32),
    Unlimited,
}

impl Horizon {
    /// Build from the catalog's `hours` field: absent or negative means unlimited
    pub fn from_hours(hours: Option<i64>) -> Self {
        match hours {
            Some(h) if h >= 0 => Horizon::Hours(h.min(u32::MAX as i64) as u32),
            _ => Horizon::Unlimited,
        }
    }

    /// Minimum ICU length of stay in days a patient needs to cover the horizon
    pub fn min_length_of_stay_days(self) -> f64 {
        match self {
            Horizon::Hours(h) => h as f64 / 24.0,
            Horizon::Unlimited => 0.0,
        }
    }

    /// Whether a measurement at `elapsed_hours` is past the horizon
    pub fn is_reached(self, elapsed_hours: i64) -> bool {
        match self {
            Horizon::Hours(h) => elapsed_hours >= h as i64,
            Horizon::Unlimited => false,
        }
    }
}

/// Patient selection criteria
#[derive(Debug, Clone, PartialEq)]
pub struct CohortFilter {
    pub icu_types: BTreeSet<IcuType>,
    pub age_min: u32,
    pub age_max: u32,
    pub sex: SexFilter,
    pub horizon: Horizon,
}

impl CohortFilter {
    pub fn min_length_of_stay_days(&self) -> f64 {
        self.horizon.min_length_of_stay_days()
    }

    pub fn validate(&self) -> Result<()> {
        if self.icu_types.is_empty() {
            return Err(Error::Config(
                "At least one ICU type must be included".to_string(),
            ));
        }
        if self.age_min > self.age_max {
            return Err(Error::Config(format!(
                "Age range is empty: min {} > max {}",
                self.age_min, self.age_max
            )));
        }
        Ok(())
    }
}

/// One measurement parameter and the source item IDs that map to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub abbreviation: String,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub ids: BTreeSet<i64>,
}

/// Validated, immutable catalog
#[derive(Debug, Clone)]
pub struct SpecificationCatalog {
    filter: CohortFilter,
    parameters: Vec<ParameterDescriptor>,
    by_id: HashMap<i64, usize>,
}

impl SpecificationCatalog {
    /// Validate and build a catalog.
    ///
    /// Fails when the ICU set is empty, the age range is inverted, an
    /// abbreviation repeats, or two parameters claim the same source ID.
    pub fn new(filter: CohortFilter, parameters: Vec<ParameterDescriptor>) -> Result<Self> {
        filter.validate()?;

        let mut abbreviations = BTreeSet::new();
        let mut by_id = HashMap::new();
        for (index, param) in parameters.iter().enumerate() {
            if param.abbreviation.trim().is_empty() {
                return Err(Error::Config("Parameter abbreviation is empty".to_string()));
            }
            if !abbreviations.insert(param.abbreviation.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate parameter abbreviation: {}",
                    param.abbreviation
                )));
            }
            for id in &param.ids {
                if let Some(previous) = by_id.insert(*id, index) {
                    return Err(Error::Config(format!(
                        "Measurement ID {} is mapped by both {} and {}",
                        id, parameters[previous].abbreviation, param.abbreviation
                    )));
                }
            }
        }

        Ok(Self {
            filter,
            parameters,
            by_id,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(text)?;
        file.into_catalog()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read catalog {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn filter(&self) -> &CohortFilter {
        &self.filter
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Descriptor owning a source ID, if any
    pub fn descriptor_for(&self, source_id: i64) -> Option<&ParameterDescriptor> {
        self.by_id.get(&source_id).map(|&i| &self.parameters[i])
    }

    /// All configured source IDs, ascending
    pub fn measurement_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// On-disk catalog layout
#[derive(Debug, Deserialize)]
struct CatalogFile {
    icu_types: Vec<IcuType>,
    #[serde(default)]
    cohort: CohortSection,
    #[serde(default)]
    parameters: Vec<ParameterDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CohortSection {
    #[serde(default)]
    age_min: u32,
    #[serde(default = "default_age_max")]
    age_max: u32,
    #[serde(default)]
    sex: SexFilter,
    #[serde(default)]
    hours: Option<i64>,
}

impl Default for CohortSection {
    fn default() -> Self {
        Self {
            age_min: 0,
            age_max: default_age_max(),
            sex: SexFilter::Both,
            hours: None,
        }
    }
}

fn default_age_max() -> u32 {
    200
}

impl CatalogFile {
    fn into_catalog(self) -> Result<SpecificationCatalog> {
        let filter = CohortFilter {
            icu_types: self.icu_types.into_iter().collect(),
            age_min: self.cohort.age_min,
            age_max: self.cohort.age_max,
            sex: self.cohort.sex,
            horizon: Horizon::from_hours(self.cohort.hours),
        };
        SpecificationCatalog::new(filter, self.parameters)
    }
}
