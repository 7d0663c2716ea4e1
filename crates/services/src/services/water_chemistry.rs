//! Fixed range table for pool water chemistry and reading validation.
//!
//! Each parameter has a hard valid range (readings outside it are rejected)
//! and a narrower ideal range used only for display classification.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use db::models::visit::{Parameter, ParameterReading, ParameterReadings, ReadingStatus};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::visit_workflow::StepValidationError;

/// Hard floor/ceiling. A reading outside this range blocks submission.
pub fn valid_range(parameter: Parameter) -> (f64, f64) {
    match parameter {
        Parameter::Ph => (6.0, 8.5),
        Parameter::Chlorine => (0.5, 5.0),
        Parameter::Alkalinity => (80.0, 200.0),
        Parameter::CalciumHardness => (150.0, 500.0),
        Parameter::CyanuricAcid => (30.0, 100.0),
        Parameter::Temperature => (15.0, 40.0),
    }
}

/// Target band. Readings outside it but inside the valid range only warn.
pub fn ideal_range(parameter: Parameter) -> (f64, f64) {
    match parameter {
        Parameter::Ph => (7.2, 7.6),
        Parameter::Chlorine => (1.0, 3.0),
        Parameter::Alkalinity => (80.0, 120.0),
        Parameter::CalciumHardness => (200.0, 400.0),
        Parameter::CyanuricAcid => (30.0, 50.0),
        Parameter::Temperature => (24.0, 28.0),
    }
}

pub fn unit(parameter: Parameter) -> &'static str {
    match parameter {
        Parameter::Ph => "",
        Parameter::Chlorine
        | Parameter::Alkalinity
        | Parameter::CalciumHardness
        | Parameter::CyanuricAcid => "ppm",
        Parameter::Temperature => "°C",
    }
}

pub fn label(parameter: Parameter) -> &'static str {
    match parameter {
        Parameter::Ph => "pH",
        Parameter::Chlorine => "Cloro Livre",
        Parameter::Alkalinity => "Alcalinidade Total",
        Parameter::CalciumHardness => "Dureza Cálcica",
        Parameter::CyanuricAcid => "Ácido Cianúrico",
        Parameter::Temperature => "Temperatura",
    }
}

/// Classification for display. Assumes `value` is inside the valid range;
/// values outside it are `Critical` and never reach a stored reading.
pub fn classify(parameter: Parameter, value: f64) -> ReadingStatus {
    let (valid_min, valid_max) = valid_range(parameter);
    if value < valid_min || value > valid_max {
        return ReadingStatus::Critical;
    }
    let (ideal_min, ideal_max) = ideal_range(parameter);
    if value >= ideal_min && value <= ideal_max {
        ReadingStatus::Ideal
    } else {
        ReadingStatus::Warning
    }
}

/// Raw form input: numeric-string values keyed by parameter, as the
/// measurement form submits them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WaterParametersInput {
    pub ph: Option<String>,
    pub chlorine: Option<String>,
    pub alkalinity: Option<String>,
    pub calcium_hardness: Option<String>,
    pub cyanuric_acid: Option<String>,
    pub temperature: Option<String>,
}

impl WaterParametersInput {
    pub fn raw_value(&self, parameter: Parameter) -> Option<&str> {
        let field = match parameter {
            Parameter::Ph => &self.ph,
            Parameter::Chlorine => &self.chlorine,
            Parameter::Alkalinity => &self.alkalinity,
            Parameter::CalciumHardness => &self.calcium_hardness,
            Parameter::CyanuricAcid => &self.cyanuric_acid,
            Parameter::Temperature => &self.temperature,
        };
        field.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Validate all six parameters. Fails on the first missing, non-numeric or
/// out-of-valid-range value; classification tags are attached to accepted
/// readings for downstream display.
pub fn validate_readings(
    input: &WaterParametersInput,
    recorded_at: DateTime<Utc>,
) -> Result<ParameterReadings, StepValidationError> {
    let mut readings = BTreeMap::new();

    for parameter in Parameter::ALL {
        let raw = input
            .raw_value(parameter)
            .ok_or(StepValidationError::MissingParameter(parameter))?;

        let value: f64 = raw
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or(StepValidationError::NonNumericValue(parameter))?;

        let (valid_min, valid_max) = valid_range(parameter);
        if value < valid_min || value > valid_max {
            return Err(StepValidationError::OutOfRange {
                parameter,
                value,
                valid_min,
                valid_max,
            });
        }

        readings.insert(
            parameter,
            ParameterReading {
                value,
                unit: unit(parameter).to_string(),
                status: classify(parameter, value),
            },
        );
    }

    Ok(ParameterReadings {
        readings,
        recorded_at,
    })
}
