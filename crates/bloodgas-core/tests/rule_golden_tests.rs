//! Golden tests for the clinical rule engine.
//!
//! Each case is a panel + weight with the expected classification and
//! corrections.

use bloodgas_core::models::{VitalSigns, Weight};
use bloodgas_core::rules::ClinicalRules;
use bloodgas_core::schema::PanelField;
use bloodgas_core::{assemble_from_rules, Panel};

/// Test case from golden table.
struct GoldenCase {
    id: &'static str,
    panel: &'static [(PanelField, f64)],
    weight_kg: Option<f64>,
    expected_status: &'static str,
    expected_severity: &'static str,
    expected_risk: &'static str,
    expected_nahco3_ml: Option<f64>,
    expected_units: Option<u32>,
}

fn get_golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            id: "severe-acidosis-anemia",
            panel: &[(PanelField::Ph, 7.15), (PanelField::BeEcf, -12.0), (PanelField::Thbc, 75.0)],
            weight_kg: Some(70.0),
            expected_status: "acidosis",
            expected_severity: "severe",
            expected_risk: "high",
            expected_nahco3_ml: Some(420.0),
            expected_units: Some(4),
        },
        GoldenCase {
            id: "severe-acidosis-no-weight",
            panel: &[(PanelField::Ph, 7.15), (PanelField::BeEcf, -12.0), (PanelField::Thbc, 75.0)],
            weight_kg: None,
            expected_status: "acidosis",
            expected_severity: "severe",
            expected_risk: "high",
            expected_nahco3_ml: None,
            expected_units: Some(4),
        },
        GoldenCase {
            id: "boundary-ph-7.35-is-normal",
            panel: &[(PanelField::Ph, 7.35), (PanelField::BeEcf, -4.0)],
            weight_kg: Some(60.0),
            expected_status: "normal",
            expected_severity: "none",
            expected_risk: "low",
            expected_nahco3_ml: None,
            expected_units: None,
        },
        GoldenCase {
            id: "mild-acidosis-be-b",
            panel: &[(PanelField::Ph, 7.32), (PanelField::BeB, -6.0)],
            weight_kg: Some(50.0),
            expected_status: "acidosis",
            expected_severity: "mild",
            expected_risk: "medium",
            expected_nahco3_ml: Some(6.0 * 50.0 * 0.3 / 0.6),
            expected_units: None,
        },
        GoldenCase {
            id: "moderate-alkalosis",
            panel: &[(PanelField::Ph, 7.57), (PanelField::Hco3Act, 34.0)],
            weight_kg: Some(80.0),
            expected_status: "alkalosis",
            expected_severity: "moderate",
            expected_risk: "medium",
            expected_nahco3_ml: None,
            expected_units: None,
        },
        GoldenCase {
            id: "hypoxemia-normal-ph",
            panel: &[(PanelField::Ph, 7.40), (PanelField::Po2, 65.0), (PanelField::Thbc, 130.0)],
            weight_kg: Some(70.0),
            expected_status: "normal",
            expected_severity: "none",
            expected_risk: "high",
            expected_nahco3_ml: None,
            expected_units: Some(0),
        },
        GoldenCase {
            id: "no-ph-reported",
            panel: &[(PanelField::K, 4.0), (PanelField::Thbc, 99.0)],
            weight_kg: Some(70.0),
            expected_status: "undetermined",
            expected_severity: "unknown",
            expected_risk: "low",
            expected_nahco3_ml: None,
            expected_units: Some(1),
        },
    ]
}

#[test]
fn test_golden_cases() {
    let rules = ClinicalRules::new();

    for case in get_golden_cases() {
        let panel = Panel::from_pairs(case.panel).unwrap();
        let weight = Weight::from(case.weight_kg);
        let report = rules.evaluate(&panel, weight, &VitalSigns::default());

        assert_eq!(report.assessment.status, case.expected_status, "Case {}: status", case.id);
        assert_eq!(
            report.assessment.severity, case.expected_severity,
            "Case {}: severity",
            case.id
        );
        assert_eq!(report.assessment.risk_level, case.expected_risk, "Case {}: risk", case.id);
        assert_eq!(
            report.acid_correction.nahco3_5_percent_ml, case.expected_nahco3_ml,
            "Case {}: NaHCO3 ml",
            case.id
        );
        assert_eq!(
            report.transfusion_guidance.prbc_units_estimated, case.expected_units,
            "Case {}: PRBC units",
            case.id
        );
    }
}

#[test]
fn test_end_to_end_result_json() {
    let panel = Panel::from_json_str(r#"{"ph": 7.15, "be_ecf": -12, "thbc": 75}"#).unwrap();
    let report = ClinicalRules::new().evaluate(&panel, Weight::Available(70.0), &VitalSigns::default());
    let result = assemble_from_rules(&panel, report);
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["acid_correction"]["calculated_na_hco3_mmol"], 252.0);
    assert_eq!(json["acid_correction"]["nahco3_5_percent_ml"], 420.0);
    assert_eq!(json["acid_correction"]["initial_dose_ml"], 210.0);
    assert!(json["acid_correction"]["recommendation"]
        .as_str()
        .unwrap()
        .contains("210.0"));
    assert_eq!(json["transfusion_guidance"]["hemoglobin_deficit"], 25.0);
    assert_eq!(json["transfusion_guidance"]["prbc_units_estimated"], 4);
    assert_eq!(json["engine"], "rules");
    assert!(json["analysis_id"].as_str().unwrap().starts_with("bga_"));
    assert!(!json["safety_warning"].as_str().unwrap().is_empty());
    assert!(!json["disclaimer"].as_str().unwrap().is_empty());
}

#[test]
fn test_missing_weight_result_json() {
    let panel = Panel::from_json_str(r#"{"ph": 7.15, "be_ecf": -12, "thbc": 75}"#).unwrap();
    let report = ClinicalRules::new().evaluate(&panel, Weight::Unavailable, &VitalSigns::default());
    let json = serde_json::to_value(assemble_from_rules(&panel, report)).unwrap();

    let acid = &json["acid_correction"];
    assert!(acid.is_object());
    assert!(acid["recommendation"].as_str().unwrap().contains("weight"));
    assert!(acid["calculated_na_hco3_mmol"].is_null());
    assert!(acid["nahco3_5_percent_ml"].is_null());
    assert!(json["electrolyte_correction"]["potassium"].is_null());
    assert!(json["electrolyte_correction"]["calcium"].is_null());
}

#[test]
fn test_legacy_keys_feed_rules() {
    let panel = Panel::from_json_str(r#"{"ph": "7.25", "base_excess": -8, "lactate": 4.1}"#).unwrap();
    let report = ClinicalRules::new().evaluate(&panel, Weight::Available(60.0), &VitalSigns::default());
    assert_eq!(report.acid_correction.be_value, Some(-8.0));
    assert_eq!(
        report.acid_correction.calculated_na_hco3_mmol,
        Some(8.0 * 60.0 * 0.3)
    );
    assert!(report
        .findings
        .iter()
        .any(|f| f.parameter == "LAC" && f.interpretation.contains("hyperlactatemia")));
}
