//! Clinical rule engine.
//!
//! Pipeline: Panel → Classification → Findings → Corrections → Recommendations/Alerts
//!
//! Every function here is pure. Each computed section states the formula it
//! used and the literal inputs it consumed.

mod acid_base;
mod dosing;
mod findings;
mod transfusion;

pub use acid_base::*;
pub use dosing::*;
pub use findings::*;
pub use transfusion::*;

use crate::models::{
    AcidCorrection, Alert, AlkalosisManagement, AnalysisBody, Assessment, ElectrolyteCorrection,
    Finding, Panel, Recommendation, Section, TransfusionGuidance, VitalSigns, Weight, DISCLAIMER,
    SAFETY_WARNING,
};
use crate::schema::PanelField;

/// Everything the engine derives from one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub classification: AcidBaseClassification,
    pub oxygenation: Oxygenation,
    pub risk_level: RiskLevel,
    pub assessment: Assessment,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<Recommendation>,
    pub alerts: Vec<Alert>,
    pub acid_correction: AcidCorrection,
    pub alkalosis_management: AlkalosisManagement,
    pub transfusion_guidance: TransfusionGuidance,
    pub electrolyte_correction: ElectrolyteCorrection,
}

impl RuleReport {
    /// Convert into an analysis body with every section marked as reported.
    pub fn into_body(self) -> AnalysisBody {
        AnalysisBody {
            assessment: Section::Reported(self.assessment),
            findings: self.findings,
            recommendations: self.recommendations,
            alerts: self.alerts,
            acid_correction: Section::Reported(self.acid_correction),
            alkalosis_management: Section::Reported(self.alkalosis_management),
            transfusion_guidance: Section::Reported(self.transfusion_guidance),
            electrolyte_correction: Section::Reported(self.electrolyte_correction),
            safety_warning: SAFETY_WARNING.into(),
            disclaimer: DISCLAIMER.into(),
        }
    }
}

/// Deterministic clinical rules.
#[derive(Debug, Clone, Default)]
pub struct ClinicalRules {
    transfusion_target: TransfusionTarget,
}

impl ClinicalRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transfusion_target(mut self, target: TransfusionTarget) -> Self {
        self.transfusion_target = target;
        self
    }

    pub fn transfusion_target(&self) -> TransfusionTarget {
        self.transfusion_target
    }

    /// Evaluate a validated panel.
    pub fn evaluate(&self, panel: &Panel, weight: Weight, vitals: &VitalSigns) -> RuleReport {
        let classification = classify(panel);
        let oxygenation = classify_oxygenation(panel.get(PanelField::Po2));
        let risk_level = assess_risk(panel, vitals, &classification, oxygenation);

        let acid_correction = acid_correction(panel, weight);
        let alkalosis_management = alkalosis_management(panel);
        let transfusion_guidance = transfusion_guidance(panel, self.transfusion_target);
        let electrolyte_correction = electrolyte_correction(panel, weight);

        let assessment = assessment(&classification, oxygenation, risk_level);
        let findings = findings(panel, &classification);

        let mut report = RuleReport {
            classification,
            oxygenation,
            risk_level,
            assessment,
            findings,
            recommendations: Vec::new(),
            alerts: Vec::new(),
            acid_correction,
            alkalosis_management,
            transfusion_guidance,
            electrolyte_correction,
        };
        report.recommendations = recommendations(&report, panel);
        report.alerts = alerts(&report, panel, weight, vitals);

        tracing::debug!(
            present = panel.present_count(),
            risk = risk_level.as_str(),
            findings = report.findings.len(),
            "rules evaluated"
        );
        report
    }
}

fn assessment(
    classification: &AcidBaseClassification,
    oxygenation: Oxygenation,
    risk_level: RiskLevel,
) -> Assessment {
    let summary = match classification.status {
        AcidBaseStatus::Undetermined => format!(
            "Acid-base status undetermined (pH not reported); oxygenation {}; {} risk.",
            oxygenation.as_str(),
            risk_level.as_str()
        ),
        AcidBaseStatus::Normal => format!(
            "pH within normal limits; oxygenation {}; {} risk.",
            oxygenation.as_str(),
            risk_level.as_str()
        ),
        _ => format!(
            "{} {}; compensation: {}; oxygenation {}; {} risk.",
            capitalize(classification.severity_label()),
            classification.primary_disorder(),
            classification.compensation.as_str(),
            oxygenation.as_str(),
            risk_level.as_str()
        ),
    };
    Assessment {
        status: classification.status_label().into(),
        primary_disorder: classification.primary_disorder().into(),
        compensation: classification.compensation.as_str().into(),
        severity: classification.severity_label().into(),
        oxygenation: oxygenation.as_str().into(),
        risk_level: risk_level.as_str().into(),
        summary,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn recommendation(priority: &str, category: &str, action: &str, detail: String, rationale: String) -> Recommendation {
    Recommendation {
        priority: priority.into(),
        category: category.into(),
        action: action.into(),
        detail,
        rationale,
    }
}

fn recommendations(report: &RuleReport, panel: &Panel) -> Vec<Recommendation> {
    let mut out = Vec::new();

    let acid = &report.acid_correction;
    if let (Some(ml), Some(initial)) = (acid.nahco3_5_percent_ml, acid.initial_dose_ml) {
        out.push(recommendation(
            "high",
            "treatment",
            "Give 5% sodium bicarbonate, half dose first",
            format!("{initial:.1} ml now of {ml:.1} ml total; repeat blood gas before the remainder."),
            acid.calculation_basis.clone(),
        ));
    } else if report.classification.status == AcidBaseStatus::Acidosis
        && acid.be_value.is_some()
        && acid.weight_used.is_none()
    {
        out.push(recommendation(
            "high",
            "data",
            "Supply patient weight",
            WEIGHT_REQUIRED.into(),
            "Bicarbonate dosing is proportional to body weight.".into(),
        ));
    }

    if report.oxygenation == Oxygenation::Hypoxemia {
        out.push(recommendation(
            "high",
            "treatment",
            "Improve oxygenation",
            "Increase FiO2 and review ventilation; recheck PO2.".into(),
            format!("PO2 below {PO2_HYPOXEMIA} mmHg."),
        ));
    }

    let tx = &report.transfusion_guidance;
    if let (Some(units), Some(current), Some(target)) =
        (tx.prbc_units_estimated, tx.current_thbc, tx.target_thbc)
    {
        if units > 0 {
            out.push(recommendation(
                if units >= 2 { "high" } else { "medium" },
                "treatment",
                "Consider packed red cell transfusion",
                format!("Estimated {units} unit(s) to raise THbc from {current} to {target} g/L."),
                tx.formula_used.clone(),
            ));
        }
    }

    if let Some(k) = &report.electrolyte_correction.potassium {
        match k.deficit {
            Some(d) if d > 0.0 => out.push(recommendation(
                "medium",
                "treatment",
                "Replace potassium",
                k.kcl_recommendation.clone(),
                k.formula.clone(),
            )),
            Some(d) if d < 0.0 => out.push(recommendation(
                "high",
                "treatment",
                "Manage hyperkalemia",
                k.kcl_recommendation.clone(),
                "K+ above 5.5 mmol/L.".into(),
            )),
            _ => {}
        }
    }

    if let Some(ca) = &report.electrolyte_correction.calcium {
        if ca.deficit.is_some_and(|d| d > 0.0) {
            out.push(recommendation(
                "medium",
                "treatment",
                "Replace calcium",
                ca.calcium_recommendation.clone(),
                ca.formula.clone(),
            ));
        }
    }

    if report.classification.status == AcidBaseStatus::Alkalosis {
        let m = &report.alkalosis_management;
        out.push(recommendation(
            "medium",
            "treatment",
            "Manage alkalosis",
            format!("{} {}", m.fluid_therapy, m.ventilation_adjustment),
            m.calculation_basis.clone(),
        ));
    }

    if panel.get(PanelField::Lac).is_some_and(|v| v > 2.2) {
        out.push(recommendation(
            "medium",
            "monitoring",
            "Trend lactate",
            "Repeat lactate after resuscitation to confirm clearance.".into(),
            "Lactate above 2.2 mmol/L suggests tissue hypoperfusion.".into(),
        ));
    }

    out.push(recommendation(
        "low",
        "monitoring",
        "Repeat blood-gas analysis",
        "Recheck the panel after any correction and at clinically indicated intervals.".into(),
        "Corrections are titrated against measured response.".into(),
    ));

    out
}

fn alert(level: &str, message: String, recommendation: &str) -> Alert {
    Alert {
        level: level.into(),
        message,
        recommendation: recommendation.into(),
    }
}

fn alerts(report: &RuleReport, panel: &Panel, weight: Weight, vitals: &VitalSigns) -> Vec<Alert> {
    let mut out = Vec::new();
    let ph = panel.get(PanelField::Ph);

    if let (Some(Severity::Severe), Some(ph)) = (report.classification.severity, ph) {
        let message = match report.classification.status {
            AcidBaseStatus::Acidosis => format!("Severe acidosis: pH {ph}"),
            _ => format!("Severe alkalosis: pH {ph}"),
        };
        out.push(alert("warning", message, "Treat immediately and repeat the blood gas."));
    }

    if report.oxygenation == Oxygenation::Hypoxemia {
        if let Some(po2) = panel.get(PanelField::Po2) {
            out.push(alert(
                "warning",
                format!("Hypoxemia: PO2 {po2} mmHg"),
                "Secure the airway and increase oxygen delivery.",
            ));
        }
    }

    if let Some(spo2) = vitals.spo2.filter(|v| *v < 90.0) {
        out.push(alert(
            "warning",
            format!("SpO2 {spo2}% below 90%"),
            "Check probe placement and oxygen delivery.",
        ));
    }
    if let Some(sbp) = vitals.blood_pressure_systolic.filter(|v| *v < 90.0) {
        out.push(alert(
            "warning",
            format!("Hypotension: systolic {sbp} mmHg"),
            "Assess volume status and vasopressor need.",
        ));
    }

    if !weight.is_available() && needs_weight(report, panel) {
        out.push(alert(
            "caution",
            "Patient weight not supplied; dosage figures were withheld.".into(),
            WEIGHT_REQUIRED,
        ));
    }

    if let Some(k) = panel.get(PanelField::K) {
        if !PanelField::K.reference().contains(k) {
            out.push(alert(
                "caution",
                format!("Potassium out of range: {k} mmol/L"),
                "Monitor ECG and correct as indicated.",
            ));
        }
    }

    out
}

fn needs_weight(report: &RuleReport, panel: &Panel) -> bool {
    let acidosis_dosing = report.classification.status == AcidBaseStatus::Acidosis
        && report.acid_correction.be_value.is_some();
    let electrolytes = [PanelField::K, PanelField::Ca, PanelField::Ca74]
        .into_iter()
        .any(|f| panel.get(f).is_some_and(|v| !f.reference().contains(v)));
    acidosis_dosing || electrolytes
}
