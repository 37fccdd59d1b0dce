//! Panel validation: raw key/value mapping → validated [`Panel`].

use serde_json::{Map, Value};

use crate::error::{BloodGasError, BloodGasResult, ValidationError};
use crate::models::Panel;

use super::field::{PanelField, Range};
use super::normalizer::FieldNormalizer;

/// Interpret a raw JSON value as an optional number.
///
/// `null` and blank strings are absent; numeric strings are accepted because
/// form-decoded payloads arrive as text.
pub fn parse_numeric(field: &str, value: &Value) -> Result<Option<f64>, ValidationError> {
    let number = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64().ok_or_else(|| ValidationError::NotFinite {
            field: field.to_string(),
        })?,
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| ValidationError::InvalidType {
            field: field.to_string(),
            found: format!("text {:?}", crate::error::excerpt(s, 20)),
        })?,
        Value::Bool(_) => {
            return Err(ValidationError::InvalidType {
                field: field.to_string(),
                found: "boolean".into(),
            })
        }
        Value::Array(_) => {
            return Err(ValidationError::InvalidType {
                field: field.to_string(),
                found: "array".into(),
            })
        }
        Value::Object(_) => {
            return Err(ValidationError::InvalidType {
                field: field.to_string(),
                found: "object".into(),
            })
        }
    };

    if !number.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
        });
    }
    Ok(Some(number))
}

/// Reject a value outside its declared bound. Never clamps.
pub fn check_bound(field: &str, value: f64, bound: Range) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
        });
    }
    if !bound.contains(value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min: bound.low,
            max: bound.high,
        });
    }
    Ok(value)
}

/// Authoritative panel schema.
#[derive(Default)]
pub struct PanelSchema {
    normalizer: FieldNormalizer,
}

impl PanelSchema {
    pub fn new() -> Self {
        Self {
            normalizer: FieldNormalizer::new(),
        }
    }

    pub fn normalizer(&self) -> &FieldNormalizer {
        &self.normalizer
    }

    /// Validate a raw JSON document (an object of indicator → value).
    pub fn validate_json(&self, raw: &str) -> BloodGasResult<Panel> {
        let value: Value = serde_json::from_str(raw).map_err(|e| ValidationError::Malformed {
            field: "blood_gas".into(),
            reason: format!("not valid JSON ({e})"),
        })?;
        match value {
            Value::Object(map) => self.validate_map(&map),
            Value::Null => Err(BloodGasError::EmptyPanel),
            _ => Err(ValidationError::Malformed {
                field: "blood_gas".into(),
                reason: "expected a JSON object".into(),
            }
            .into()),
        }
    }

    /// Validate a key/value mapping. Unknown keys are ignored; canonical keys
    /// take precedence over aliases naming the same indicator.
    pub fn validate_map(&self, map: &Map<String, Value>) -> BloodGasResult<Panel> {
        let mut values = [None; PanelField::COUNT];
        let mut from_canonical = [false; PanelField::COUNT];

        for (key, raw) in map {
            let Some(field) = self.normalizer.resolve(key) else {
                continue;
            };
            let Some(value) = parse_numeric(field.key(), raw)? else {
                continue;
            };
            let is_canonical = key.trim().to_lowercase() == field.key();
            let slot = field.index();
            if values[slot].is_none() || (is_canonical && !from_canonical[slot]) {
                values[slot] = Some(value);
                from_canonical[slot] = is_canonical;
            }
        }

        self.validate_values(values)
    }

    /// Bounds-check a full set of optional values.
    pub fn validate_values(&self, values: [Option<f64>; PanelField::COUNT]) -> BloodGasResult<Panel> {
        for field in PanelField::ALL {
            if let Some(value) = values[field.index()] {
                check_bound(field.key(), value, field.bound())?;
            }
        }

        if values.iter().all(Option::is_none) {
            return Err(BloodGasError::EmptyPanel);
        }

        Ok(Panel::from_validated(values))
    }
}
