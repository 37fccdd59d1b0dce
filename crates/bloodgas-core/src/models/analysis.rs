//! Analysis result model.
//!
//! Every section is always present in the external JSON. Whether a section
//! was reported by its producer or default-filled is tracked by [`Section`]
//! without changing the wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Fixed text attached to every successful result.
pub const SAFETY_WARNING: &str =
    "Clinicians must adjust every dose dynamically according to actual blood loss and circulatory fluctuation.";

/// Fixed text attached to every successful result.
pub const DISCLAIMER: &str = "This analysis is generated algorithmically for clinical reference only. \
Treatment decisions must be made by a licensed attending physician based on the patient's overall condition. \
The system accepts no medical liability.";

pub const ACID_FORMULA: &str = "NaHCO3 (mmol) = |BE| x weight (kg) x 0.3; 5% NaHCO3 (ml) = mmol / 0.6";
pub const TRANSFUSION_FORMULA: &str = "deficit (g/L) = max(0, target - THbc); PRBC units = ceil(deficit / 7)";
pub const POTASSIUM_FORMULA: &str = "K+ (mmol) = (target - current) x weight (kg) x 0.3; KCl (g) = mmol / 13.4";
pub const CALCIUM_FORMULA: &str =
    "Ca++ (mmol) = (target - current) x weight (kg) x 0.3; gluconate (g) = mmol / 2.2; chloride (g) = mmol / 6.8";

/// A result section together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    /// Supplied by the producer (rule engine or model).
    Reported(T),
    /// Absent or unusable upstream; filled with the default skeleton.
    Defaulted(T),
}

impl<T> Section<T> {
    pub fn value(&self) -> &T {
        match self {
            Section::Reported(v) | Section::Defaulted(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Section::Reported(v) | Section::Defaulted(v) => v,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Section::Defaulted(_))
    }
}

impl<T: Default> Section<T> {
    pub fn defaulted() -> Self {
        Section::Defaulted(T::default())
    }
}

impl<T: Serialize> Serialize for Section<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// Overall clinical assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    /// Acid-base status ("acidosis", "alkalosis", "normal", ...)
    pub status: String,
    pub primary_disorder: String,
    pub compensation: String,
    pub severity: String,
    pub oxygenation: String,
    /// "low" | "medium" | "high"
    pub risk_level: String,
    /// One-line clinical summary
    pub summary: String,
}

impl Default for Assessment {
    fn default() -> Self {
        Self {
            status: "incomplete data".into(),
            primary_disorder: "undetermined".into(),
            compensation: "undetermined".into(),
            severity: "unknown".into(),
            oxygenation: "not assessable".into(),
            risk_level: "medium".into(),
            summary: "Blood-gas data is incomplete; a full assessment cannot be given.".into(),
        }
    }
}

/// One indicator compared with its reference range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Finding {
    pub category: String,
    pub parameter: String,
    pub value: Option<f64>,
    pub reference: String,
    pub deviation: String,
    pub interpretation: String,
    /// "normal" | "mild" | "moderate" | "severe"
    pub severity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recommendation {
    /// "high" | "medium" | "low"
    pub priority: String,
    pub category: String,
    pub action: String,
    pub detail: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Alert {
    /// "warning" | "caution" | "info"
    pub level: String,
    pub message: String,
    pub recommendation: String,
}

/// Bicarbonate dosing for metabolic acidosis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcidCorrection {
    pub condition: String,
    pub be_value: Option<f64>,
    pub calculated_na_hco3_mmol: Option<f64>,
    pub nahco3_5_percent_ml: Option<f64>,
    /// Half of the computed 5% volume
    pub initial_dose_ml: Option<f64>,
    pub recommendation: String,
    pub formula_used: String,
    pub weight_used: Option<f64>,
    pub calculation_basis: String,
}

impl Default for AcidCorrection {
    fn default() -> Self {
        Self {
            condition: "not evaluated".into(),
            be_value: None,
            calculated_na_hco3_mmol: None,
            nahco3_5_percent_ml: None,
            initial_dose_ml: None,
            recommendation: "No bicarbonate dosing was computed.".into(),
            formula_used: ACID_FORMULA.into(),
            weight_used: None,
            calculation_basis: "No calculation inputs were reported.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlkalosisManagement {
    pub condition: String,
    /// "metabolic" | "respiratory" | "mixed" | "undetermined"
    #[serde(rename = "type")]
    pub alkalosis_type: String,
    /// Chloride is not a panel indicator
    pub cl_level: Option<f64>,
    pub k_level: Option<f64>,
    pub fluid_therapy: String,
    pub ventilation_adjustment: String,
    pub potassium_advice: String,
    pub calculation_basis: String,
}

impl Default for AlkalosisManagement {
    fn default() -> Self {
        Self {
            condition: "not evaluated".into(),
            alkalosis_type: "undetermined".into(),
            cl_level: None,
            k_level: None,
            fluid_therapy: "No fluid therapy advice was provided.".into(),
            ventilation_adjustment: "No ventilation advice was provided.".into(),
            potassium_advice: "No potassium advice was provided.".into(),
            calculation_basis: "No calculation inputs were reported.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransfusionGuidance {
    pub condition: String,
    pub current_thbc: Option<f64>,
    pub target_thbc: Option<f64>,
    pub hemoglobin_deficit: Option<f64>,
    pub prbc_units_estimated: Option<u32>,
    pub formula_used: String,
    pub clinical_reminders: Vec<String>,
}

impl Default for TransfusionGuidance {
    fn default() -> Self {
        Self {
            condition: "not evaluated".into(),
            current_thbc: None,
            target_thbc: None,
            hemoglobin_deficit: None,
            prbc_units_estimated: None,
            formula_used: TRANSFUSION_FORMULA.into(),
            clinical_reminders: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PotassiumCorrection {
    pub current_k: Option<f64>,
    pub normal_range: String,
    pub target_k: Option<f64>,
    /// mmol; negative means excess
    pub deficit: Option<f64>,
    pub kcl_grams: Option<f64>,
    pub kcl_recommendation: String,
    pub formula: String,
}

impl Default for PotassiumCorrection {
    fn default() -> Self {
        Self {
            current_k: None,
            normal_range: "3.5-5.5".into(),
            target_k: None,
            deficit: None,
            kcl_grams: None,
            kcl_recommendation: "No potassium correction was computed.".into(),
            formula: POTASSIUM_FORMULA.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalciumCorrection {
    pub current_ca: Option<f64>,
    pub normal_range: String,
    pub target_ca: Option<f64>,
    /// mmol; negative means excess
    pub deficit: Option<f64>,
    pub calcium_gluconate_grams: Option<f64>,
    pub calcium_chloride_grams: Option<f64>,
    pub calcium_recommendation: String,
    pub formula: String,
}

impl Default for CalciumCorrection {
    fn default() -> Self {
        Self {
            current_ca: None,
            normal_range: "1.10-1.35".into(),
            target_ca: None,
            deficit: None,
            calcium_gluconate_grams: None,
            calcium_chloride_grams: None,
            calcium_recommendation: "No calcium correction was computed.".into(),
            formula: CALCIUM_FORMULA.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectrolyteCorrection {
    pub potassium: Option<PotassiumCorrection>,
    pub calcium: Option<CalciumCorrection>,
    pub note: String,
}

impl Default for ElectrolyteCorrection {
    fn default() -> Self {
        Self {
            potassium: None,
            calcium: None,
            note: "No electrolyte correction was computed.".into(),
        }
    }
}

/// The analysis payload shared by the rule and model paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisBody {
    pub assessment: Section<Assessment>,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<Recommendation>,
    pub alerts: Vec<Alert>,
    pub acid_correction: Section<AcidCorrection>,
    pub alkalosis_management: Section<AlkalosisManagement>,
    pub transfusion_guidance: Section<TransfusionGuidance>,
    pub electrolyte_correction: Section<ElectrolyteCorrection>,
    pub safety_warning: String,
    pub disclaimer: String,
}

impl Default for AnalysisBody {
    fn default() -> Self {
        Self {
            assessment: Section::defaulted(),
            findings: Vec::new(),
            recommendations: Vec::new(),
            alerts: Vec::new(),
            acid_correction: Section::defaulted(),
            alkalosis_management: Section::defaulted(),
            transfusion_guidance: Section::defaulted(),
            electrolyte_correction: Section::defaulted(),
            safety_warning: SAFETY_WARNING.into(),
            disclaimer: DISCLAIMER.into(),
        }
    }
}

/// Which path produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Rules,
    Model,
}

/// Terminal artifact returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Correlation tag derived from the panel fingerprint
    pub analysis_id: String,
    pub generated_at: DateTime<Utc>,
    pub engine: Engine,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub body: AnalysisBody,
}

impl AnalysisResult {
    pub fn to_json(&self) -> crate::error::BloodGasResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_serializes_transparently() {
        let reported = Section::Reported(Alert {
            level: "info".into(),
            message: "m".into(),
            recommendation: "r".into(),
        });
        let defaulted: Section<Alert> = Section::defaulted();
        assert_eq!(serde_json::to_value(&reported).unwrap()["level"], "info");
        assert_eq!(serde_json::to_value(&defaulted).unwrap()["message"], "");
        assert!(defaulted.is_defaulted());
        assert!(!reported.is_defaulted());
    }

    #[test]
    fn test_default_body_carries_fixed_texts() {
        let body = AnalysisBody::default();
        assert_eq!(body.safety_warning, SAFETY_WARNING);
        assert_eq!(body.disclaimer, DISCLAIMER);
        assert_eq!(body.assessment.value().status, "incomplete data");
        assert_eq!(body.assessment.value().risk_level, "medium");
    }

    #[test]
    fn test_result_flattens_body() {
        let result = AnalysisResult {
            analysis_id: "bga_0123456789abcdef".into(),
            generated_at: Utc::now(),
            engine: Engine::Rules,
            model: None,
            body: AnalysisBody::default(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["engine"], "rules");
        assert!(json.get("model").is_none());
        assert!(json["findings"].as_array().unwrap().is_empty());
        assert_eq!(json["alkalosis_management"]["type"], "undetermined");
        assert!(json["electrolyte_correction"]["potassium"].is_null());
        assert!(json.get("body").is_none());
    }
}
