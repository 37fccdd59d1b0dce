//! The 18 panel indicators, their physiologic bounds and reference ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed numeric interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// Nearest point of the interval to `value`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.low, self.high)
    }
}

/// Static description of one indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Canonical wire key (fixed public vocabulary)
    pub key: &'static str,
    /// Display label as printed on analyser reports
    pub label: &'static str,
    /// Unit of measure ("" for dimensionless)
    pub unit: &'static str,
    /// Values outside this interval are rejected, never clamped
    pub bound: Range,
    /// Normal reference range
    pub reference: Range,
    /// Reference range as shown to clinicians
    pub reference_label: &'static str,
}

/// One of the 18 blood-gas indicators, in the fixed public order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelField {
    Ph,
    Po2,
    Pco2,
    Na,
    K,
    Ca,
    Glu,
    Lac,
    Hct,
    #[serde(rename = "ca_74")]
    Ca74,
    Hco3Act,
    Hco3Std,
    Ctco2,
    BeEcf,
    BeB,
    So2c,
    Thbc,
    Temp,
}

const fn spec(
    key: &'static str,
    label: &'static str,
    unit: &'static str,
    bound: (f64, f64),
    reference: (f64, f64),
    reference_label: &'static str,
) -> FieldSpec {
    FieldSpec {
        key,
        label,
        unit,
        bound: Range::new(bound.0, bound.1),
        reference: Range::new(reference.0, reference.1),
        reference_label,
    }
}

static FIELD_SPECS: [FieldSpec; PanelField::COUNT] = [
    spec("ph", "pH", "", (6.5, 8.0), (7.35, 7.45), "7.35-7.45"),
    spec("po2", "PO2", "mmHg", (0.0, 800.0), (80.0, 100.0), "80-100"),
    spec("pco2", "PCO2", "mmHg", (0.0, 200.0), (35.0, 45.0), "35-45"),
    spec("na", "Na+", "mmol/L", (80.0, 200.0), (135.0, 145.0), "135-145"),
    spec("k", "K+", "mmol/L", (1.0, 10.0), (3.5, 5.5), "3.5-5.5"),
    spec("ca", "Ca++", "mmol/L", (0.2, 3.0), (1.10, 1.35), "1.10-1.35"),
    spec("glu", "GLU", "mmol/L", (0.0, 60.0), (3.9, 6.1), "3.9-6.1"),
    spec("lac", "LAC", "mmol/L", (0.0, 30.0), (0.5, 2.2), "0.5-2.2"),
    spec("hct", "HCT", "%", (0.0, 80.0), (35.0, 50.0), "35-50"),
    spec("ca_74", "Ca++(7.4)", "mmol/L", (0.2, 3.0), (1.10, 1.35), "1.10-1.35"),
    spec("hco3_act", "HCO3-", "mmol/L", (0.0, 60.0), (22.0, 27.0), "22-27"),
    spec("hco3_std", "HCO3std", "mmol/L", (0.0, 60.0), (22.0, 27.0), "22-27"),
    spec("ctco2", "ctCO2", "mmol/L", (0.0, 70.0), (23.0, 28.0), "23-28"),
    spec("be_ecf", "BEecf", "mmol/L", (-40.0, 40.0), (-2.0, 2.0), "-2 to +2"),
    spec("be_b", "BE(B)", "mmol/L", (-40.0, 40.0), (-2.0, 2.0), "-2 to +2"),
    spec("so2c", "SO2c", "%", (0.0, 100.0), (95.0, 100.0), "95-100"),
    spec("thbc", "THbc", "g/L", (0.0, 250.0), (120.0, 175.0), "120-175"),
    spec("temp", "Temp", "°C", (25.0, 45.0), (36.0, 37.5), "36.0-37.5"),
];

impl PanelField {
    pub const COUNT: usize = 18;

    /// Every indicator in public order.
    pub const ALL: [PanelField; PanelField::COUNT] = [
        PanelField::Ph,
        PanelField::Po2,
        PanelField::Pco2,
        PanelField::Na,
        PanelField::K,
        PanelField::Ca,
        PanelField::Glu,
        PanelField::Lac,
        PanelField::Hct,
        PanelField::Ca74,
        PanelField::Hco3Act,
        PanelField::Hco3Std,
        PanelField::Ctco2,
        PanelField::BeEcf,
        PanelField::BeB,
        PanelField::So2c,
        PanelField::Thbc,
        PanelField::Temp,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn spec(self) -> &'static FieldSpec {
        &FIELD_SPECS[self.index()]
    }

    pub fn key(self) -> &'static str {
        self.spec().key
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    pub fn unit(self) -> &'static str {
        self.spec().unit
    }

    pub fn bound(self) -> Range {
        self.spec().bound
    }

    pub fn reference(self) -> Range {
        self.spec().reference
    }

    /// Exact lookup by canonical key.
    pub fn from_key(key: &str) -> Option<PanelField> {
        PanelField::ALL.iter().copied().find(|f| f.key() == key)
    }

    /// Clinical category used when reporting findings.
    pub fn category(self) -> &'static str {
        match self {
            PanelField::Ph
            | PanelField::Hco3Act
            | PanelField::Hco3Std
            | PanelField::Ctco2
            | PanelField::BeEcf
            | PanelField::BeB => "acid-base",
            PanelField::Po2 | PanelField::So2c => "oxygenation",
            PanelField::Pco2 => "ventilation",
            PanelField::Na | PanelField::K | PanelField::Ca | PanelField::Ca74 => "electrolytes",
            PanelField::Glu | PanelField::Lac => "metabolic",
            PanelField::Hct | PanelField::Thbc => "hematology",
            PanelField::Temp => "temperature",
        }
    }
}

impl fmt::Display for PanelField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_vocabulary_order() {
        let keys: Vec<&str> = PanelField::ALL.iter().map(|f| f.key()).collect();
        assert_eq!(
            keys,
            vec![
                "ph", "po2", "pco2", "na", "k", "ca", "glu", "lac", "hct", "ca_74", "hco3_act",
                "hco3_std", "ctco2", "be_ecf", "be_b", "so2c", "thbc", "temp"
            ]
        );
    }

    #[test]
    fn test_serde_name_matches_key() {
        for field in PanelField::ALL {
            let json = serde_json::to_value(field).unwrap();
            assert_eq!(json, serde_json::Value::String(field.key().to_string()));
            assert_eq!(PanelField::from_key(field.key()), Some(field));
        }
    }

    #[test]
    fn test_index_matches_table() {
        for (i, field) in PanelField::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
        }
    }

    #[test]
    fn test_reference_within_bound() {
        for field in PanelField::ALL {
            let bound = field.bound();
            let reference = field.reference();
            assert!(bound.contains(reference.low), "{field}");
            assert!(bound.contains(reference.high), "{field}");
        }
    }

    #[test]
    fn test_ph_bound() {
        assert!(PanelField::Ph.bound().contains(6.5));
        assert!(PanelField::Ph.bound().contains(8.0));
        assert!(!PanelField::Ph.bound().contains(8.01));
    }
}
