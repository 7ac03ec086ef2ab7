//! Per-source-ID value decoders
//!
//! Most measurements are plain numbers. Two families need interpretation:
//! mechanical ventilation markers, which carry state across a patient's
//! stream, and censored troponin results reported as inequalities.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use thiserror::Error;

/// Ventilator supply items; a `None` value marks the end of ventilation
pub const VENTILATION_SUPPLY_IDS: [i64; 2] = [467, 468];

/// Ventilator setting items; a `D/C'd` stop marks the end of ventilation
pub const VENTILATION_SETTING_IDS: [i64; 2] = [720, 722];

/// All mechanical ventilation items
pub const VENTILATION_IDS: [i64; 4] = [467, 468, 720, 722];

/// An active ventilation episode lapses after this many hours without a marker
pub const VENTILATION_WINDOW_HOURS: i64 = 8;

/// Feed value for "ventilation observed"
pub const VENTILATION_ACTIVE: &str = "1.0";

/// Feed value for "ventilation stopped"
pub const VENTILATION_STOPPED: &str = "2.0";

const TROPONIN_T_IDS: [i64; 2] = [51003, 227429];
const TROPONIN_I_IDS: [i64; 1] = [51002];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("not a number: {0:?}")]
    NotNumeric(String),

    #[error("unknown ventilation marker: {0:?}")]
    UnknownVentilationMarker(String),
}

/// Assays whose results may be reported as a threshold inequality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CensoredAssay {
    /// Reported as `<0.01` or a value
    TroponinT,
    /// Reported as `<0.03`, `>50.0` or a value
    TroponinI,
}

impl CensoredAssay {
    /// Value substituted for a below-threshold result
    pub fn below(self) -> f64 {
        match self {
            CensoredAssay::TroponinT => 0.009,
            CensoredAssay::TroponinI => 0.029,
        }
    }

    /// Value substituted for an above-threshold result
    pub fn above(self) -> f64 {
        match self {
            CensoredAssay::TroponinT => 25.001,
            CensoredAssay::TroponinI => 50.001,
        }
    }

    pub fn decode(self, raw: &str) -> Result<f64, DecodeError> {
        let marker = raw.to_uppercase();
        if marker.contains('<') || marker.contains("LESS") {
            Ok(self.below())
        } else if marker.contains('>') || marker.contains("GREATER") {
            Ok(self.above())
        } else {
            parse_real(raw)
        }
    }
}

/// Parse a finite real number
pub fn parse_real(raw: &str) -> Result<f64, DecodeError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(DecodeError::NotNumeric(raw.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VentilationPhase {
    #[default]
    Off,
    On,
    Ending,
}

/// Ventilation decoder memory for one patient's stream.
///
/// Emits 0.0 (not ventilated), 1.0 (ventilated) or 2.0 (ventilation
/// ending). A new value must be created for every patient.
#[derive(Debug, Clone, Default)]
pub struct VentilationState {
    phase: VentilationPhase,
    last_activation: Option<NaiveDateTime>,
}

impl VentilationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> VentilationPhase {
        self.phase
    }

    pub fn last_activation(&self) -> Option<NaiveDateTime> {
        self.last_activation
    }

    /// Consume one ventilation marker charted at `at`.
    ///
    /// The window check looks only at the hour-of-day part of the gap since
    /// the last activation: a marker 26 hours later counts as 2 hours.
    pub fn observe(&mut self, raw: &str, at: NaiveDateTime) -> Result<f64, DecodeError> {
        match (raw.trim(), self.last_activation) {
            (VENTILATION_ACTIVE, None) => {
                self.activate(at);
                Ok(1.0)
            }
            (VENTILATION_ACTIVE, Some(last)) => {
                let hours = (at - last).num_seconds().rem_euclid(86_400) / 3600;
                if hours < VENTILATION_WINDOW_HOURS {
                    self.activate(at);
                    Ok(1.0)
                } else {
                    self.end();
                    Ok(2.0)
                }
            }
            (VENTILATION_STOPPED, Some(_)) => {
                self.end();
                Ok(2.0)
            }
            (VENTILATION_STOPPED, None) => {
                self.phase = VentilationPhase::Off;
                Ok(0.0)
            }
            _ => Err(DecodeError::UnknownVentilationMarker(raw.to_string())),
        }
    }

    fn activate(&mut self, at: NaiveDateTime) {
        self.phase = VentilationPhase::On;
        self.last_activation = Some(at);
    }

    fn end(&mut self) {
        self.phase = VentilationPhase::Ending;
        self.last_activation = None;
    }
}

/// How one source ID's raw text becomes a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Numeric,
    Ventilation,
    Censored(CensoredAssay),
}

impl Decoder {
    pub fn decode(
        self,
        raw: &str,
        at: NaiveDateTime,
        ventilation: &mut VentilationState,
    ) -> Result<f64, DecodeError> {
        match self {
            Decoder::Numeric => parse_real(raw),
            Decoder::Ventilation => ventilation.observe(raw, at),
            Decoder::Censored(assay) => assay.decode(raw),
        }
    }
}

/// Source ID to decoder lookup; unlisted IDs decode as plain numbers
#[derive(Debug, Clone)]
pub struct DecoderTable {
    by_id: HashMap<i64, Decoder>,
}

impl DecoderTable {
    /// Table with no special decoders
    pub fn numeric_only() -> Self {
        Self {
            by_id: HashMap::new(),
        }
    }

    /// Route `ids` to `decoder`, replacing earlier routes for them
    pub fn with(mut self, ids: &[i64], decoder: Decoder) -> Self {
        for id in ids {
            self.by_id.insert(*id, decoder);
        }
        self
    }

    pub fn decoder_for(&self, source_id: i64) -> Decoder {
        self.by_id.get(&source_id).copied().unwrap_or(Decoder::Numeric)
    }
}

impl Default for DecoderTable {
    /// Ventilation items and troponin assays
    fn default() -> Self {
        Self::numeric_only()
            .with(&VENTILATION_IDS, Decoder::Ventilation)
            .with(&TROPONIN_T_IDS, Decoder::Censored(CensoredAssay::TroponinT))
            .with(&TROPONIN_I_IDS, Decoder::Censored(CensoredAssay::TroponinI))
    }
}
