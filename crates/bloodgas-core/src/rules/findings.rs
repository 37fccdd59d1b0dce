//! Per-indicator findings against reference ranges.

use crate::models::{Finding, Panel};
use crate::schema::PanelField;

use super::acid_base::{AcidBaseClassification, Severity};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Deviation {
    Within,
    Below(f64),
    Above(f64),
}

fn deviation(field: PanelField, value: f64) -> Deviation {
    let reference = field.reference();
    if value < reference.low {
        Deviation::Below(reference.low - value)
    } else if value > reference.high {
        Deviation::Above(value - reference.high)
    } else {
        Deviation::Within
    }
}

/// Severity by distance outside the range relative to the range width.
fn severity_by_distance(field: PanelField, dev: Deviation) -> Severity {
    let distance = match dev {
        Deviation::Within => return Severity::Normal,
        Deviation::Below(d) | Deviation::Above(d) => d,
    };
    let ratio = distance / field.reference().width();
    if ratio <= 0.5 {
        Severity::Mild
    } else if ratio <= 1.5 {
        Severity::Moderate
    } else {
        Severity::Severe
    }
}

fn interpretation(field: PanelField, dev: Deviation) -> &'static str {
    use PanelField::*;
    let low = matches!(dev, Deviation::Below(_));
    match (dev, field) {
        (Deviation::Within, _) => "within normal limits",
        (_, Ph) if low => "acidemia",
        (_, Ph) => "alkalemia",
        (_, Po2) if low => "hypoxemia",
        (_, Po2) => "hyperoxemia, consistent with supplemental oxygen",
        (_, Pco2) if low => "hypocapnia, hyperventilation",
        (_, Pco2) => "hypercapnia, hypoventilation",
        (_, Na) if low => "hyponatremia",
        (_, Na) => "hypernatremia",
        (_, K) if low => "hypokalemia",
        (_, K) => "hyperkalemia",
        (_, Ca | Ca74) if low => "hypocalcemia",
        (_, Ca | Ca74) => "hypercalcemia",
        (_, Glu) if low => "hypoglycemia",
        (_, Glu) => "hyperglycemia",
        (_, Lac) if low => "low lactate, not clinically significant",
        (_, Lac) => "hyperlactatemia, possible tissue hypoperfusion",
        (_, Hct) if low => "low hematocrit",
        (_, Hct) => "hemoconcentration",
        (_, Hco3Act | Hco3Std | Ctco2) if low => "low bicarbonate, metabolic acid load",
        (_, Hco3Act | Hco3Std | Ctco2) => "high bicarbonate, metabolic alkali load",
        (_, BeEcf | BeB) if low => "base deficit, metabolic acidosis component",
        (_, BeEcf | BeB) => "base excess, metabolic alkalosis component",
        (_, So2c) if low => "low oxygen saturation",
        (_, So2c) => "oxygen saturation above range",
        (_, Thbc) if low => "anemia",
        (_, Thbc) => "elevated hemoglobin",
        (_, Temp) if low => "hypothermia",
        (_, Temp) => "hyperthermia",
    }
}

fn describe(field: PanelField, dev: Deviation) -> String {
    let unit = match field.unit() {
        "" => String::new(),
        u => format!(" {u}"),
    };
    match dev {
        Deviation::Within => "within range".to_string(),
        Deviation::Below(d) => format!("below range by {d:.2}{unit}"),
        Deviation::Above(d) => format!("above range by {d:.2}{unit}"),
    }
}

/// One finding per present indicator, in public order.
pub fn findings(panel: &Panel, classification: &AcidBaseClassification) -> Vec<Finding> {
    panel
        .iter()
        .map(|(field, value)| {
            let dev = deviation(field, value);
            let severity = match (field, classification.severity) {
                (PanelField::Ph, Some(s)) => s,
                _ => severity_by_distance(field, dev),
            };
            Finding {
                category: field.category().to_string(),
                parameter: field.label().to_string(),
                value: Some(value),
                reference: field.spec().reference_label.to_string(),
                deviation: describe(field, dev),
                interpretation: interpretation(field, dev).to_string(),
                severity: severity.as_str().to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::acid_base::classify;

    fn run(pairs: &[(PanelField, f64)]) -> Vec<Finding> {
        let panel = Panel::from_pairs(pairs).unwrap();
        findings(&panel, &classify(&panel))
    }

    #[test]
    fn test_one_finding_per_present_indicator() {
        let f = run(&[(PanelField::Ph, 7.15), (PanelField::BeEcf, -12.0), (PanelField::Thbc, 75.0)]);
        let params: Vec<&str> = f.iter().map(|f| f.parameter.as_str()).collect();
        assert_eq!(params, vec!["pH", "BEecf", "THbc"]);
    }

    #[test]
    fn test_ph_uses_acid_base_severity() {
        let f = run(&[(PanelField::Ph, 7.15)]);
        assert_eq!(f[0].severity, "severe");
        assert_eq!(f[0].interpretation, "acidemia");
        assert_eq!(f[0].reference, "7.35-7.45");
    }

    #[test]
    fn test_distance_severity() {
        // K range 3.5-5.5, width 2
        let f = run(&[(PanelField::K, 3.0)]);
        assert_eq!(f[0].severity, "mild");
        assert_eq!(f[0].deviation, "below range by 0.50 mmol/L");

        let f = run(&[(PanelField::K, 7.0)]);
        assert_eq!(f[0].severity, "moderate");
        assert_eq!(f[0].interpretation, "hyperkalemia");

        let f = run(&[(PanelField::K, 9.0)]);
        assert_eq!(f[0].severity, "severe");
    }

    #[test]
    fn test_within_range() {
        let f = run(&[(PanelField::Na, 140.0)]);
        assert_eq!(f[0].severity, "normal");
        assert_eq!(f[0].deviation, "within range");
        assert_eq!(f[0].category, "electrolytes");
    }
}
