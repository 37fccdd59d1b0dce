//! Property tests for dosing arithmetic and the response sanitizer.

use proptest::prelude::*;
use serde_json::{json, Value};

use bloodgas_core::models::{VitalSigns, Weight};
use bloodgas_core::rules::{units_for_deficit, ClinicalRules};
use bloodgas_core::sanitize::{parse_model_json, sanitize_analysis, sanitize_object};
use bloodgas_core::schema::PanelField;
use bloodgas_core::{assemble_from_model, Panel};

proptest! {
    #[test]
    fn bicarbonate_volume_is_exact(
        ph in 6.5f64..7.3499,
        be in -40.0f64..40.0,
        weight in 0.5f64..500.0,
    ) {
        let panel = Panel::from_pairs(&[(PanelField::Ph, ph), (PanelField::BeEcf, be)]).unwrap();
        let report = ClinicalRules::new().evaluate(&panel, Weight::Available(weight), &VitalSigns::default());
        let ml = report.acid_correction.nahco3_5_percent_ml.unwrap();
        prop_assert_eq!(ml, be.abs() * weight * 0.3 / 0.6);
        prop_assert_eq!(report.acid_correction.initial_dose_ml.unwrap(), ml / 2.0);
    }

    #[test]
    fn prbc_units_match_formula(thbc in 0.0f64..250.0) {
        let panel = Panel::from_pairs(&[(PanelField::Thbc, thbc)]).unwrap();
        let report = ClinicalRules::new().evaluate(&panel, Weight::Unavailable, &VitalSigns::default());
        let units = report.transfusion_guidance.prbc_units_estimated.unwrap();
        prop_assert_eq!(units, ((100.0 - thbc).max(0.0) / 7.0).ceil() as u32);
        prop_assert_eq!(units, units_for_deficit(100.0 - thbc));
    }

    #[test]
    fn no_weight_means_no_dose(ph in 6.5f64..7.3499, be in -40.0f64..40.0) {
        let panel = Panel::from_pairs(&[(PanelField::Ph, ph), (PanelField::BeEcf, be)]).unwrap();
        let report = ClinicalRules::new().evaluate(&panel, Weight::Unavailable, &VitalSigns::default());
        prop_assert!(report.acid_correction.calculated_na_hco3_mmol.is_none());
        prop_assert!(report.acid_correction.nahco3_5_percent_ml.is_none());
        prop_assert!(report.electrolyte_correction.potassium.is_none());
    }

    #[test]
    fn sanitizing_rule_output_is_a_no_op(
        ph in 6.5f64..8.0,
        be in -40.0f64..40.0,
        thbc in 0.0f64..250.0,
        k in 1.0f64..10.0,
        weight in prop::option::of(1.0f64..200.0),
    ) {
        let panel = Panel::from_pairs(&[
            (PanelField::Ph, ph),
            (PanelField::BeEcf, be),
            (PanelField::Thbc, thbc),
            (PanelField::K, k),
        ])
        .unwrap();
        let body = ClinicalRules::new()
            .evaluate(&panel, Weight::from(weight), &VitalSigns::default())
            .into_body();
        let original = serde_json::to_value(&body).unwrap();

        let sanitized = sanitize_object(original.as_object().unwrap());
        prop_assert_eq!(serde_json::to_value(&sanitized).unwrap(), original);
    }

    #[test]
    fn fenced_payload_parses_identically(
        status in "[a-z ]{1,20}",
        units in 0u32..20,
        note in "[ -~]{0,40}",
    ) {
        let payload = json!({
            "assessment": {"status": status},
            "transfusion_guidance": {"prbc_units_estimated": units},
            "safety_warning": note,
        })
        .to_string();
        let fenced = format!("```json\n{payload}\n```");
        prop_assert_eq!(parse_model_json(&fenced).unwrap(), parse_model_json(&payload).unwrap());
    }

    #[test]
    fn merged_results_always_carry_fixed_texts(raw in r#"\{("safety_warning": "( |x)?"|"disclaimer": null)?\}"#) {
        let panel = Panel::from_pairs(&[(PanelField::Ph, 7.2)]).unwrap();
        let report = ClinicalRules::new().evaluate(&panel, Weight::Unavailable, &VitalSigns::default());
        let body = sanitize_analysis(&raw).unwrap();
        let result = assemble_from_model(&panel, report, body, "m");
        prop_assert!(!result.body.safety_warning.trim().is_empty());
        prop_assert!(!result.body.disclaimer.trim().is_empty());
    }
}

#[test]
fn malformed_model_output_example() {
    let body = sanitize_analysis("```json\n{\"assessment\":null}\n```").unwrap();
    let json: Value = serde_json::to_value(&body).unwrap();
    for key in [
        "status",
        "primary_disorder",
        "compensation",
        "severity",
        "oxygenation",
        "risk_level",
        "summary",
    ] {
        assert!(json["assessment"][key].is_string(), "assessment.{key}");
    }
    assert_eq!(json["findings"], json!([]));
    assert_eq!(json["recommendations"], json!([]));
    assert_eq!(json["alerts"], json!([]));
    assert!(!json["safety_warning"].as_str().unwrap().is_empty());
    assert!(!json["disclaimer"].as_str().unwrap().is_empty());
}
