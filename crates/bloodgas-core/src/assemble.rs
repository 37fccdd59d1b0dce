//! Result assembler: rule output and/or sanitized model output → [`AnalysisResult`].

use chrono::Utc;

use crate::models::{AnalysisBody, AnalysisResult, Engine, Panel, Section, DISCLAIMER, SAFETY_WARNING};
use crate::rules::RuleReport;

/// Stable correlation tag: `bga_` + the first 16 hex chars of the panel fingerprint.
pub fn analysis_id(panel: &Panel) -> String {
    let fingerprint = panel.fingerprint();
    format!("bga_{}", &fingerprint[..16])
}

/// Restore the two fixed texts if blank.
fn enforce_fixed_texts(body: &mut AnalysisBody) {
    if body.safety_warning.trim().is_empty() {
        body.safety_warning = SAFETY_WARNING.into();
    }
    if body.disclaimer.trim().is_empty() {
        body.disclaimer = DISCLAIMER.into();
    }
}

/// Result of the deterministic path.
pub fn assemble_from_rules(panel: &Panel, report: RuleReport) -> AnalysisResult {
    let mut body = report.into_body();
    enforce_fixed_texts(&mut body);
    AnalysisResult {
        analysis_id: analysis_id(panel),
        generated_at: Utc::now(),
        engine: Engine::Rules,
        model: None,
        body,
    }
}

/// Merge a sanitized model body with the rule report.
///
/// Engine-computed sections replace the model's; a default-filled model
/// assessment is replaced by the engine's; narrative lists come from the
/// model and fall back to the engine's when the model supplied none.
pub fn assemble_from_model(
    panel: &Panel,
    report: RuleReport,
    model_body: AnalysisBody,
    model_name: &str,
) -> AnalysisResult {
    let engine = report.into_body();

    let assessment = match model_body.assessment {
        Section::Defaulted(_) => engine.assessment,
        reported => reported,
    };
    let mut body = AnalysisBody {
        assessment,
        findings: prefer_model(model_body.findings, engine.findings),
        recommendations: prefer_model(model_body.recommendations, engine.recommendations),
        alerts: prefer_model(model_body.alerts, engine.alerts),
        acid_correction: engine.acid_correction,
        alkalosis_management: engine.alkalosis_management,
        transfusion_guidance: engine.transfusion_guidance,
        electrolyte_correction: engine.electrolyte_correction,
        safety_warning: model_body.safety_warning,
        disclaimer: model_body.disclaimer,
    };
    enforce_fixed_texts(&mut body);

    AnalysisResult {
        analysis_id: analysis_id(panel),
        generated_at: Utc::now(),
        engine: Engine::Model,
        model: Some(model_name.to_string()),
        body,
    }
}

fn prefer_model<T>(model: Vec<T>, engine: Vec<T>) -> Vec<T> {
    if model.is_empty() {
        engine
    } else {
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VitalSigns, Weight};
    use crate::rules::ClinicalRules;
    use crate::sanitize::sanitize_analysis;
    use crate::schema::PanelField;

    fn example() -> Panel {
        Panel::from_pairs(&[
            (PanelField::Ph, 7.15),
            (PanelField::BeEcf, -12.0),
            (PanelField::Thbc, 75.0),
        ])
        .unwrap()
    }

    fn report(weight: Weight) -> RuleReport {
        ClinicalRules::new().evaluate(&example(), weight, &VitalSigns::default())
    }

    #[test]
    fn test_analysis_id_is_stable() {
        let id = analysis_id(&example());
        assert!(id.starts_with("bga_"));
        assert_eq!(id.len(), 4 + 16);
        assert_eq!(id, analysis_id(&example()));
    }

    #[test]
    fn test_rules_result() {
        let result = assemble_from_rules(&example(), report(Weight::Available(70.0)));
        assert_eq!(result.engine, Engine::Rules);
        assert!(result.model.is_none());
        assert_eq!(
            result.body.acid_correction.value().nahco3_5_percent_ml,
            Some(420.0)
        );
        assert!(!result.body.safety_warning.is_empty());
        assert!(!result.body.disclaimer.is_empty());
    }

    #[test]
    fn test_engine_sections_replace_model_arithmetic() {
        let model = sanitize_analysis(
            r#"{"acid_correction": {"nahco3_5_percent_ml": 999}, "assessment": {"status": "acidosis", "risk_level": "high"}}"#,
        )
        .unwrap();
        let result = assemble_from_model(&example(), report(Weight::Available(70.0)), model, "gemini-2.5-flash");
        assert_eq!(result.engine, Engine::Model);
        assert_eq!(result.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(
            result.body.acid_correction.value().nahco3_5_percent_ml,
            Some(420.0)
        );
        assert_eq!(result.body.assessment.value().status, "acidosis");
        // Model supplied no findings, so the engine's are used
        assert_eq!(result.body.findings.len(), 3);
    }

    #[test]
    fn test_defaulted_model_assessment_replaced() {
        let model = sanitize_analysis("```json\n{\"assessment\":null}\n```").unwrap();
        let result = assemble_from_model(&example(), report(Weight::Unavailable), model, "m");
        assert!(!result.body.assessment.is_defaulted());
        assert_eq!(result.body.assessment.value().severity, "severe");
    }

    #[test]
    fn test_blank_fixed_texts_restored() {
        let model = sanitize_analysis(r#"{"safety_warning": "  ", "disclaimer": ""}"#).unwrap();
        let result = assemble_from_model(&example(), report(Weight::Unavailable), model, "m");
        assert_eq!(result.body.safety_warning, SAFETY_WARNING);
        assert_eq!(result.body.disclaimer, DISCLAIMER);
    }
}
