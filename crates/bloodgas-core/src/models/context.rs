//! Per-request clinical context: vital signs and anesthesia parameters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::schema::{check_bound, parse_numeric, Range};

/// Vital sign bounds, keyed by wire name.
pub const SYSTOLIC_BOUND: Range = Range::new(50.0, 250.0);
pub const DIASTOLIC_BOUND: Range = Range::new(30.0, 150.0);
pub const HEART_RATE_BOUND: Range = Range::new(30.0, 200.0);
pub const TEMPERATURE_BOUND: Range = Range::new(35.0, 42.0);
pub const SPO2_BOUND: Range = Range::new(70.0, 100.0);
pub const RESPIRATORY_RATE_BOUND: Range = Range::new(8.0, 40.0);

/// Bedside fluid volumes in ml.
const VOLUME_BOUND: Range = Range::new(0.0, 50_000.0);

fn bounded(map: &Map<String, Value>, key: &str, bound: Range) -> Result<Option<f64>, ValidationError> {
    match map.get(key) {
        None => Ok(None),
        Some(raw) => parse_numeric(key, raw)?
            .map(|v| check_bound(key, v, bound))
            .transpose(),
    }
}

fn expect_object<'a>(field: &str, value: &'a Value) -> Result<Option<&'a Map<String, Value>>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(ValidationError::Malformed {
            field: field.to_string(),
            reason: "expected a JSON object".into(),
        }),
    }
}

/// Vital signs; each value optional and independently bounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VitalSigns {
    pub blood_pressure_systolic: Option<f64>,
    pub blood_pressure_diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    /// Core temperature (°C)
    pub temperature: Option<f64>,
    pub spo2: Option<f64>,
    pub respiratory_rate: Option<f64>,
}

impl VitalSigns {
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let Some(map) = expect_object("vital_signs", value)? else {
            return Ok(Self::default());
        };
        Ok(Self {
            blood_pressure_systolic: bounded(map, "blood_pressure_systolic", SYSTOLIC_BOUND)?,
            blood_pressure_diastolic: bounded(map, "blood_pressure_diastolic", DIASTOLIC_BOUND)?,
            heart_rate: bounded(map, "heart_rate", HEART_RATE_BOUND)?,
            temperature: bounded(map, "temperature", TEMPERATURE_BOUND)?,
            spo2: bounded(map, "spo2", SPO2_BOUND)?,
            respiratory_rate: bounded(map, "respiratory_rate", RESPIRATORY_RATE_BOUND)?,
        })
    }

    /// Parse a form-decoded JSON string. Absent or blank means no vitals.
    pub fn from_json_str(raw: Option<&str>) -> Result<Self, ValidationError> {
        match raw.map(str::trim).filter(|t| !t.is_empty()) {
            None => Ok(Self::default()),
            Some(text) => Self::from_value(&parse_json("vital_signs", text)?),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl<'de> Deserialize<'de> for VitalSigns {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        VitalSigns::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Anesthesia parameters. Advisory only; never an input to a formula.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnesthesiaContext {
    pub anesthesia_type: Option<String>,
    pub intubated: Option<bool>,
    pub medications: Vec<String>,
    pub notes: Option<String>,
    pub position: Option<String>,
    pub surgery_type: Option<String>,
    pub fluid_input_ml: Option<f64>,
    pub blood_loss_ml: Option<f64>,
    pub urine_output_ml: Option<f64>,
}

fn text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn volume(map: &Map<String, Value>, keys: &[&str]) -> Result<Option<f64>, ValidationError> {
    for key in keys {
        if let Some(v) = bounded(map, key, VOLUME_BOUND)? {
            return Ok(Some(v));
        }
    }
    Ok(None)
}

fn parse_intubated(value: Option<&Value>) -> Result<Option<bool>, ValidationError> {
    let malformed = |found: &str| ValidationError::Malformed {
        field: "intubated".into(),
        reason: format!("expected yes/no, found {found}"),
    };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(malformed(&n.to_string())),
        },
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "yes" | "y" | "true" | "1" | "是" => Ok(Some(true)),
            "no" | "n" | "false" | "0" | "否" => Ok(Some(false)),
            other => Err(malformed(&format!("{:?}", crate::error::excerpt(other, 20)))),
        },
        Some(_) => Err(malformed("a structured value")),
    }
}

fn parse_medications(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .split([',', ';', '，', '、'])
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

impl AnesthesiaContext {
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let Some(map) = expect_object("anesthesia", value)? else {
            return Ok(Self::default());
        };
        Ok(Self {
            anesthesia_type: text(map, &["anesthesia_type", "type"]),
            intubated: parse_intubated(map.get("intubated"))?,
            medications: parse_medications(map.get("medications")),
            notes: text(map, &["notes", "anesthesia_notes"]),
            position: text(map, &["position"]),
            surgery_type: text(map, &["surgery_type"]),
            fluid_input_ml: volume(map, &["fluid_input_ml", "fluid_input"])?,
            blood_loss_ml: volume(map, &["blood_loss_ml", "blood_loss"])?,
            urine_output_ml: volume(map, &["urine_output_ml", "urine_output"])?,
        })
    }

    pub fn from_json_str(raw: Option<&str>) -> Result<Self, ValidationError> {
        match raw.map(str::trim).filter(|t| !t.is_empty()) {
            None => Ok(Self::default()),
            Some(text) => Self::from_value(&parse_json("anesthesia", text)?),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl<'de> Deserialize<'de> for AnesthesiaContext {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        AnesthesiaContext::from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn parse_json(field: &str, text: &str) -> Result<Value, ValidationError> {
    serde_json::from_str(text).map_err(|e| ValidationError::Malformed {
        field: field.to_string(),
        reason: format!("not valid JSON ({e})"),
    })
}
