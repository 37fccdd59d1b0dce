//! Response sanitizer.
//!
//! Turns untrusted model output into a fully populated [`AnalysisBody`]:
//! fences are stripped, the text is parsed, and every expected key,
//! including nested sections, is default-filled when absent or null.

mod coerce;
mod fences;

pub use fences::*;

use serde_json::{Map, Value};

use crate::error::BloodGasResult;
use crate::models::{
    AcidCorrection, Alert, AlkalosisManagement, AnalysisBody, Assessment, CalciumCorrection,
    ElectrolyteCorrection, Finding, PotassiumCorrection, Recommendation, Section,
    TransfusionGuidance, DISCLAIMER, SAFETY_WARNING,
};

use coerce::{count, number, object, objects, strings, text, Object};

/// Parse and sanitize raw model output.
pub fn sanitize_analysis(raw: &str) -> BloodGasResult<AnalysisBody> {
    let map = parse_model_json(raw)?;
    Ok(sanitize_object(&map))
}

/// Sanitize an already-parsed object. Never fails.
pub fn sanitize_object(map: &Map<String, Value>) -> AnalysisBody {
    AnalysisBody {
        assessment: section(map, "assessment", assessment),
        findings: objects(map, "findings").into_iter().map(finding).collect(),
        recommendations: objects(map, "recommendations")
            .into_iter()
            .map(recommendation)
            .collect(),
        alerts: objects(map, "alerts").into_iter().map(alert).collect(),
        acid_correction: section(map, "acid_correction", acid_correction),
        alkalosis_management: section(map, "alkalosis_management", alkalosis_management),
        transfusion_guidance: section(map, "transfusion_guidance", transfusion_guidance),
        electrolyte_correction: section(map, "electrolyte_correction", electrolyte_correction),
        safety_warning: text(map, &["safety_warning"], SAFETY_WARNING),
        disclaimer: text(map, &["disclaimer"], DISCLAIMER),
    }
}

fn section<T: Default>(map: &Object, key: &str, build: fn(&Object) -> T) -> Section<T> {
    match object(map, key) {
        Some(inner) => Section::Reported(build(inner)),
        None => Section::defaulted(),
    }
}

fn assessment(m: &Object) -> Assessment {
    let d = Assessment::default();
    Assessment {
        status: text(m, &["status", "acid_base_status"], &d.status),
        primary_disorder: text(m, &["primary_disorder"], &d.primary_disorder),
        compensation: text(m, &["compensation", "compensation_status"], &d.compensation),
        severity: text(m, &["severity"], &d.severity),
        oxygenation: text(m, &["oxygenation"], &d.oxygenation),
        risk_level: text(m, &["risk_level"], &d.risk_level),
        summary: text(m, &["summary", "clinical_summary"], &d.summary),
    }
}

fn finding(m: &Object) -> Finding {
    Finding {
        category: text(m, &["category"], ""),
        parameter: text(m, &["parameter"], ""),
        value: number(m, &["value"]),
        reference: text(m, &["reference", "reference_range"], ""),
        deviation: text(m, &["deviation"], ""),
        interpretation: text(m, &["interpretation"], ""),
        severity: text(m, &["severity"], "unknown"),
    }
}

fn recommendation(m: &Object) -> Recommendation {
    Recommendation {
        priority: text(m, &["priority"], "medium"),
        category: text(m, &["category"], ""),
        action: text(m, &["action"], ""),
        detail: text(m, &["detail"], ""),
        rationale: text(m, &["rationale"], ""),
    }
}

fn alert(m: &Object) -> Alert {
    Alert {
        level: text(m, &["level"], "info"),
        message: text(m, &["message"], ""),
        recommendation: text(m, &["recommendation"], ""),
    }
}

fn acid_correction(m: &Object) -> AcidCorrection {
    let d = AcidCorrection::default();
    AcidCorrection {
        condition: text(m, &["condition"], &d.condition),
        be_value: number(m, &["be_value"]),
        calculated_na_hco3_mmol: number(m, &["calculated_na_hco3_mmol"]),
        nahco3_5_percent_ml: number(m, &["nahco3_5_percent_ml"]),
        initial_dose_ml: number(m, &["initial_dose_ml"]),
        recommendation: text(m, &["recommendation"], &d.recommendation),
        formula_used: text(m, &["formula_used"], &d.formula_used),
        weight_used: number(m, &["weight_used"]),
        calculation_basis: text(m, &["calculation_basis"], &d.calculation_basis),
    }
}

fn alkalosis_management(m: &Object) -> AlkalosisManagement {
    let d = AlkalosisManagement::default();
    AlkalosisManagement {
        condition: text(m, &["condition"], &d.condition),
        alkalosis_type: text(m, &["type", "alkalosis_type"], &d.alkalosis_type),
        cl_level: number(m, &["cl_level"]),
        k_level: number(m, &["k_level"]),
        fluid_therapy: text(m, &["fluid_therapy"], &d.fluid_therapy),
        ventilation_adjustment: text(m, &["ventilation_adjustment"], &d.ventilation_adjustment),
        potassium_advice: text(m, &["potassium_advice"], &d.potassium_advice),
        calculation_basis: text(m, &["calculation_basis"], &d.calculation_basis),
    }
}

fn transfusion_guidance(m: &Object) -> TransfusionGuidance {
    let d = TransfusionGuidance::default();
    TransfusionGuidance {
        condition: text(m, &["condition"], &d.condition),
        current_thbc: number(m, &["current_thbc"]),
        target_thbc: number(m, &["target_thbc"]),
        hemoglobin_deficit: number(m, &["hemoglobin_deficit"]),
        prbc_units_estimated: count(m, &["prbc_units_estimated"]),
        formula_used: text(m, &["formula_used"], &d.formula_used),
        clinical_reminders: strings(m, &["clinical_reminders"]),
    }
}

fn potassium(m: &Object) -> PotassiumCorrection {
    let d = PotassiumCorrection::default();
    PotassiumCorrection {
        current_k: number(m, &["current_k"]),
        normal_range: text(m, &["normal_range"], &d.normal_range),
        target_k: number(m, &["target_k"]),
        deficit: number(m, &["deficit"]),
        kcl_grams: number(m, &["kcl_grams"]),
        kcl_recommendation: text(m, &["kcl_recommendation"], &d.kcl_recommendation),
        formula: text(m, &["formula"], &d.formula),
    }
}

fn calcium(m: &Object) -> CalciumCorrection {
    let d = CalciumCorrection::default();
    CalciumCorrection {
        current_ca: number(m, &["current_ca"]),
        normal_range: text(m, &["normal_range"], &d.normal_range),
        target_ca: number(m, &["target_ca"]),
        deficit: number(m, &["deficit"]),
        calcium_gluconate_grams: number(m, &["calcium_gluconate_grams"]),
        calcium_chloride_grams: number(m, &["calcium_chloride_grams"]),
        calcium_recommendation: text(m, &["calcium_recommendation"], &d.calcium_recommendation),
        formula: text(m, &["formula"], &d.formula),
    }
}

fn electrolyte_correction(m: &Object) -> ElectrolyteCorrection {
    let d = ElectrolyteCorrection::default();
    ElectrolyteCorrection {
        potassium: object(m, "potassium").map(potassium),
        calcium: object(m, "calcium").map(calcium),
        note: text(m, &["note"], &d.note),
    }
}
