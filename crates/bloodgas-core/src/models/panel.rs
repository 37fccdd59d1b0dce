//! Blood-gas panel and patient weight models.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{BloodGasResult, ValidationError};
use crate::schema::{check_bound, PanelField, PanelSchema, Range};

/// Physiologically plausible body weight, in kg.
pub const WEIGHT_BOUND: Range = Range::new(0.0, 500.0);

type Values = [Option<f64>; PanelField::COUNT];

fn serialize_values<S: Serializer>(values: &Values, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(PanelField::COUNT))?;
    for field in PanelField::ALL {
        map.serialize_entry(field.key(), &values[field.index()])?;
    }
    map.end()
}

/// A validated panel: every present value is finite and within its bound,
/// and at least one value is present. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    values: Values,
}

impl Panel {
    pub(crate) fn from_validated(values: Values) -> Self {
        Self { values }
    }

    /// Validate a raw JSON object.
    pub fn from_json_str(raw: &str) -> BloodGasResult<Self> {
        PanelSchema::new().validate_json(raw)
    }

    /// Validate a key/value mapping.
    pub fn from_map(map: &Map<String, Value>) -> BloodGasResult<Self> {
        PanelSchema::new().validate_map(map)
    }

    /// Validate explicit (indicator, value) pairs.
    pub fn from_pairs(pairs: &[(PanelField, f64)]) -> BloodGasResult<Self> {
        let mut values = [None; PanelField::COUNT];
        for (field, value) in pairs {
            values[field.index()] = Some(*value);
        }
        PanelSchema::new().validate_values(values)
    }

    pub fn get(&self, field: PanelField) -> Option<f64> {
        self.values[field.index()]
    }

    /// Present values in public order.
    pub fn iter(&self) -> impl Iterator<Item = (PanelField, f64)> + '_ {
        PanelField::ALL
            .into_iter()
            .filter_map(|f| self.get(f).map(|v| (f, v)))
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Base excess used for bicarbonate sizing: BEecf, falling back to BE(B).
    pub fn base_excess(&self) -> Option<(PanelField, f64)> {
        [PanelField::BeEcf, PanelField::BeB]
            .into_iter()
            .find_map(|f| self.get(f).map(|v| (f, v)))
    }

    /// Canonical JSON (all 18 keys in public order, absent values as null).
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// SHA-256 of the canonical JSON, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // String keys and optional floats into an in-memory hasher; cannot fail.
        if let Err(e) = serde_json::to_writer(&mut hasher, self) {
            tracing::warn!(error = %e, "Panel serialization failed while fingerprinting");
        }
        hex::encode(hasher.finalize())
    }
}

impl Serialize for Panel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_values(&self.values, serializer)
    }
}

impl<'de> Deserialize<'de> for Panel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Panel::from_map(&map).map_err(D::Error::custom)
    }
}

/// An unvalidated panel as proposed by the recognition model: each of the
/// 18 indicators is a number or explicitly absent. Bounds are not checked
/// until [`CandidatePanel::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePanel {
    values: Values,
}

impl CandidatePanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: PanelField) -> Option<f64> {
        self.values[field.index()]
    }

    pub fn set(&mut self, field: PanelField, value: Option<f64>) {
        self.values[field.index()] = value;
    }

    /// Indicators with no value, in public order.
    pub fn absent_fields(&self) -> Vec<PanelField> {
        PanelField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Promote to a validated [`Panel`] through the schema.
    pub fn validate(&self) -> BloodGasResult<Panel> {
        PanelSchema::new().validate_values(self.values)
    }
}

impl Serialize for CandidatePanel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_values(&self.values, serializer)
    }
}

/// Patient weight. Absence is an explicit state that every dosage
/// calculation must honour; there is no placeholder weight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Weight {
    Available(f64),
    #[default]
    Unavailable,
}

impl Weight {
    /// Validate a weight in kg.
    pub fn from_kg(kg: f64) -> Result<Weight, ValidationError> {
        let kg = check_bound("weight", kg, WEIGHT_BOUND)?;
        if kg <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "weight".into(),
                value: kg,
                min: WEIGHT_BOUND.low,
                max: WEIGHT_BOUND.high,
            });
        }
        Ok(Weight::Available(kg))
    }

    /// Parse a form-decoded weight. Absent or blank means unavailable.
    pub fn parse(raw: Option<&str>) -> Result<Weight, ValidationError> {
        let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(Weight::Unavailable);
        };
        let kg = text.parse::<f64>().map_err(|_| ValidationError::InvalidType {
            field: "weight".into(),
            found: format!("text {:?}", crate::error::excerpt(text, 20)),
        })?;
        Weight::from_kg(kg)
    }

    pub fn kg(&self) -> Option<f64> {
        match self {
            Weight::Available(kg) => Some(*kg),
            Weight::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Weight::Available(_))
    }
}

impl From<Option<f64>> for Weight {
    /// Unchecked conversion for already-validated values.
    fn from(kg: Option<f64>) -> Self {
        kg.map_or(Weight::Unavailable, Weight::Available)
    }
}

impl Serialize for Weight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.kg().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BloodGasError;

    fn example_panel() -> Panel {
        Panel::from_pairs(&[
            (PanelField::Ph, 7.15),
            (PanelField::BeEcf, -12.0),
            (PanelField::Thbc, 75.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_serializes_all_18_keys() {
        let json = serde_json::to_value(example_panel()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 18);
        assert_eq!(obj["ph"], 7.15);
        assert!(obj["k"].is_null());
    }

    #[test]
    fn test_deserialize_runs_validation() {
        let panel: Panel = serde_json::from_str(r#"{"ph": 7.4, "k": 4.0}"#).unwrap();
        assert_eq!(panel.present_count(), 2);

        assert!(serde_json::from_str::<Panel>(r#"{"ph": 9.0}"#).is_err());
        assert!(serde_json::from_str::<Panel>(r#"{}"#).is_err());
    }

    #[test]
    fn test_base_excess_prefers_ecf() {
        let panel = Panel::from_pairs(&[(PanelField::BeEcf, -8.0), (PanelField::BeB, -6.0)]).unwrap();
        assert_eq!(panel.base_excess(), Some((PanelField::BeEcf, -8.0)));

        let panel = Panel::from_pairs(&[(PanelField::BeB, -6.0)]).unwrap();
        assert_eq!(panel.base_excess(), Some((PanelField::BeB, -6.0)));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = example_panel();
        let b = example_panel();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = Panel::from_pairs(&[(PanelField::Ph, 7.16)]).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_canonical_json_parses() {
        let canonical = example_panel().to_canonical_json().unwrap();
        let json: Value = serde_json::from_str(&canonical).unwrap();
        assert_eq!(json["be_ecf"], -12.0);
        assert!(json["temp"].is_null());

        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), PanelField::COUNT);
        assert!(canonical.starts_with(r#"{"ph":7.15,"po2":null"#));
    }

    #[test]
    fn test_fingerprint_hashes_canonical_json() {
        let panel = example_panel();
        let expected = hex::encode(Sha256::digest(panel.to_canonical_json().unwrap().as_bytes()));
        assert_eq!(panel.fingerprint(), expected);
    }

    #[test]
    fn test_candidate_validation() {
        let mut candidate = CandidatePanel::new();
        assert_eq!(candidate.validate().unwrap_err(), BloodGasError::EmptyPanel);
        assert_eq!(candidate.absent_fields().len(), 18);

        candidate.set(PanelField::Ph, Some(73.5));
        assert!(matches!(
            candidate.validate().unwrap_err(),
            BloodGasError::Validation(ValidationError::OutOfRange { .. })
        ));

        candidate.set(PanelField::Ph, Some(7.35));
        let panel = candidate.validate().unwrap();
        assert_eq!(panel.get(PanelField::Ph), Some(7.35));
    }

    #[test]
    fn test_weight_parse() {
        assert_eq!(Weight::parse(None).unwrap(), Weight::Unavailable);
        assert_eq!(Weight::parse(Some("  ")).unwrap(), Weight::Unavailable);
        assert_eq!(Weight::parse(Some("70")).unwrap(), Weight::Available(70.0));
        assert!(Weight::parse(Some("seventy")).is_err());
        assert!(Weight::parse(Some("0")).is_err());
        assert!(Weight::parse(Some("-3")).is_err());
        assert!(Weight::parse(Some("900")).is_err());
        assert!(Weight::parse(Some("inf")).is_err());
    }

    #[test]
    fn test_weight_serializes_as_number_or_null() {
        assert_eq!(serde_json::to_value(Weight::Available(70.0)).unwrap(), 70.0);
        assert!(serde_json::to_value(Weight::Unavailable).unwrap().is_null());
    }
}
