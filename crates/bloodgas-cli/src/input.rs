//! Command-line input loading.
//!
//! JSON arguments are given inline or as `@path`. Every defect is reported
//! as a validation error naming the argument.

use std::path::Path;

use serde_json::{Map, Value};

use bloodgas_core::schema::{parse_numeric, FieldNormalizer, PanelField};
use bloodgas_core::{
    AnesthesiaContext, BloodGasError, BloodGasResult, Panel, ValidationError, VitalSigns, Weight,
};

fn malformed(field: &str, reason: impl Into<String>) -> BloodGasError {
    ValidationError::Malformed {
        field: field.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// The argument text, or the contents of the file it names with `@`.
pub fn read_argument(field: &str, raw: &str) -> BloodGasResult<String> {
    match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| malformed(field, format!("cannot read '{path}': {e}"))),
        None => Ok(raw.to_string()),
    }
}

fn parse_object(field: &str, raw: &str) -> BloodGasResult<Map<String, Value>> {
    let text = read_argument(field, raw)?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(malformed(field, "expected a JSON object")),
        Err(e) => Err(malformed(field, format!("invalid JSON: {e}"))),
    }
}

/// A panel plus what a previous `extract` run recorded about it.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelInput {
    pub panel: Panel,
    pub missing_fields: Vec<PanelField>,
    pub confidence: Option<f64>,
    pub weight: Weight,
}

/// Accepts a bare panel object or the JSON printed by `bloodgas extract`.
pub fn load_panel(raw: &str) -> BloodGasResult<PanelInput> {
    let map = parse_object("panel", raw)?;

    let Some(Value::Object(inner)) = map.get("panel") else {
        return Ok(PanelInput {
            panel: Panel::from_map(&map)?,
            missing_fields: Vec::new(),
            confidence: None,
            weight: Weight::Unavailable,
        });
    };

    let normalizer = FieldNormalizer::new();
    let missing_fields = match map.get("missing_fields") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|name| normalizer.resolve(name))
            .collect(),
        _ => Vec::new(),
    };
    let confidence = match map.get("confidence") {
        Some(value) => parse_numeric("confidence", value)?.map(|c| c.clamp(0.0, 1.0)),
        None => None,
    };
    let weight = match map.get("weight") {
        Some(value) => match parse_numeric("weight", value)? {
            Some(kg) => Weight::from_kg(kg)?,
            None => Weight::Unavailable,
        },
        None => Weight::Unavailable,
    };

    Ok(PanelInput {
        panel: Panel::from_map(inner)?,
        missing_fields,
        confidence,
        weight,
    })
}

pub fn load_vitals(raw: Option<&str>) -> BloodGasResult<VitalSigns> {
    match raw {
        Some(raw) => Ok(VitalSigns::from_value(&Value::Object(parse_object(
            "vital_signs",
            raw,
        )?))?),
        None => Ok(VitalSigns::default()),
    }
}

pub fn load_anesthesia(raw: Option<&str>) -> BloodGasResult<AnesthesiaContext> {
    match raw {
        Some(raw) => Ok(AnesthesiaContext::from_value(&Value::Object(parse_object(
            "anesthesia",
            raw,
        )?))?),
        None => Ok(AnesthesiaContext::default()),
    }
}

/// Comma-separated indicator names.
pub fn parse_missing_fields(raw: &str) -> BloodGasResult<Vec<PanelField>> {
    let normalizer = FieldNormalizer::new();
    let mut fields = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let field = normalizer
            .resolve(name)
            .ok_or_else(|| malformed("missing_fields", format!("unknown indicator '{name}'")))?;
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields.sort();
    Ok(fields)
}

/// MIME type from the file extension; JPEG when unknown.
pub fn infer_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "image/jpeg",
    }
}
