//! Acid-base classification, compensation, oxygenation and risk.
//!
//! Boundary policy: normal pH is the closed interval [7.35, 7.45], so 7.35
//! and 7.45 are both normal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Panel, VitalSigns};
use crate::schema::PanelField;

pub const PH_LOW: f64 = 7.35;
pub const PH_HIGH: f64 = 7.45;
const ACIDOSIS_SEVERE: f64 = 7.20;
const ACIDOSIS_MODERATE: f64 = 7.30;
const ALKALOSIS_MODERATE: f64 = 7.55;
const ALKALOSIS_SEVERE: f64 = 7.60;

pub const PO2_HYPOXEMIA: f64 = 80.0;
pub const PO2_NORMAL: f64 = 100.0;

const LACTATE_HIGH: f64 = 2.2;
const SPO2_CRITICAL: f64 = 90.0;
const SYSTOLIC_CRITICAL: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcidBaseStatus {
    Acidosis,
    Normal,
    Alkalosis,
    /// pH not reported
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compensation {
    Appropriate,
    Inadequate,
    Excessive,
    NotApplicable,
    Undetermined,
}

impl Compensation {
    pub fn as_str(self) -> &'static str {
        match self {
            Compensation::Appropriate => "appropriate respiratory compensation",
            Compensation::Inadequate => "inadequate respiratory compensation",
            Compensation::Excessive => "excessive respiratory compensation",
            Compensation::NotApplicable => "not applicable",
            Compensation::Undetermined => "undetermined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Oxygenation {
    Hypoxemia,
    MildHypoxemia,
    Normal,
    Unknown,
}

impl Oxygenation {
    pub fn as_str(self) -> &'static str {
        match self {
            Oxygenation::Hypoxemia => "hypoxemia",
            Oxygenation::MildHypoxemia => "mild hypoxemia",
            Oxygenation::Normal => "normal",
            Oxygenation::Unknown => "not assessable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Acid-base picture of one panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcidBaseClassification {
    pub status: AcidBaseStatus,
    /// `None` when pH is absent
    pub severity: Option<Severity>,
    pub compensation: Compensation,
    /// PCO2 window predicted by the compensation rule, when computable
    pub expected_pco2: Option<(f64, f64)>,
}

impl AcidBaseClassification {
    pub fn primary_disorder(&self) -> &'static str {
        match self.status {
            AcidBaseStatus::Acidosis => "metabolic acidosis",
            AcidBaseStatus::Alkalosis => "metabolic alkalosis",
            AcidBaseStatus::Normal => "none",
            AcidBaseStatus::Undetermined => "undetermined",
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self.status {
            AcidBaseStatus::Acidosis => "acidosis",
            AcidBaseStatus::Alkalosis => "alkalosis",
            AcidBaseStatus::Normal => "normal",
            AcidBaseStatus::Undetermined => "undetermined",
        }
    }

    pub fn severity_label(&self) -> &'static str {
        match self.severity {
            Some(Severity::Normal) => "none",
            Some(s) => s.as_str(),
            None => "unknown",
        }
    }
}

/// Classify pH alone.
pub fn classify_ph(ph: f64) -> (AcidBaseStatus, Severity) {
    if ph < PH_LOW {
        let severity = if ph < ACIDOSIS_SEVERE {
            Severity::Severe
        } else if ph < ACIDOSIS_MODERATE {
            Severity::Moderate
        } else {
            Severity::Mild
        };
        (AcidBaseStatus::Acidosis, severity)
    } else if ph > PH_HIGH {
        let severity = if ph > ALKALOSIS_SEVERE {
            Severity::Severe
        } else if ph > ALKALOSIS_MODERATE {
            Severity::Moderate
        } else {
            Severity::Mild
        };
        (AcidBaseStatus::Alkalosis, severity)
    } else {
        (AcidBaseStatus::Normal, Severity::Normal)
    }
}

/// Measured bicarbonate, falling back to standard bicarbonate.
pub fn bicarbonate(panel: &Panel) -> Option<f64> {
    panel
        .get(PanelField::Hco3Act)
        .or_else(|| panel.get(PanelField::Hco3Std))
}

/// Expected PCO2 window for a primary metabolic disorder.
///
/// Acidosis uses Winter's formula (1.5 x HCO3 + 8 ± 2); alkalosis uses
/// 0.7 x HCO3 + 21 ± 2.
pub fn expected_pco2(status: AcidBaseStatus, hco3: f64) -> Option<(f64, f64)> {
    let centre = match status {
        AcidBaseStatus::Acidosis => 1.5 * hco3 + 8.0,
        AcidBaseStatus::Alkalosis => 0.7 * hco3 + 21.0,
        _ => return None,
    };
    Some((centre - 2.0, centre + 2.0))
}

fn assess_compensation(status: AcidBaseStatus, hco3: Option<f64>, pco2: Option<f64>) -> (Compensation, Option<(f64, f64)>) {
    if matches!(status, AcidBaseStatus::Normal) {
        return (Compensation::NotApplicable, None);
    }
    let Some(window) = hco3.and_then(|h| expected_pco2(status, h)) else {
        return (Compensation::Undetermined, None);
    };
    let Some(pco2) = pco2 else {
        return (Compensation::Undetermined, Some(window));
    };

    // Acidosis is compensated by lowering PCO2, alkalosis by raising it.
    let compensation = match status {
        AcidBaseStatus::Acidosis if pco2 > window.1 => Compensation::Inadequate,
        AcidBaseStatus::Acidosis if pco2 < window.0 => Compensation::Excessive,
        AcidBaseStatus::Alkalosis if pco2 < window.0 => Compensation::Inadequate,
        AcidBaseStatus::Alkalosis if pco2 > window.1 => Compensation::Excessive,
        _ => Compensation::Appropriate,
    };
    (compensation, Some(window))
}

pub fn classify(panel: &Panel) -> AcidBaseClassification {
    let Some(ph) = panel.get(PanelField::Ph) else {
        return AcidBaseClassification {
            status: AcidBaseStatus::Undetermined,
            severity: None,
            compensation: Compensation::Undetermined,
            expected_pco2: None,
        };
    };
    let (status, severity) = classify_ph(ph);
    let (compensation, expected_pco2) =
        assess_compensation(status, bicarbonate(panel), panel.get(PanelField::Pco2));
    AcidBaseClassification {
        status,
        severity: Some(severity),
        compensation,
        expected_pco2,
    }
}

/// `PO2 < 80` hypoxemia, `80 <= PO2 < 100` mild hypoxemia, `PO2 >= 100` normal.
pub fn classify_oxygenation(po2: Option<f64>) -> Oxygenation {
    match po2 {
        None => Oxygenation::Unknown,
        Some(v) if v < PO2_HYPOXEMIA => Oxygenation::Hypoxemia,
        Some(v) if v < PO2_NORMAL => Oxygenation::MildHypoxemia,
        Some(_) => Oxygenation::Normal,
    }
}

fn outside(panel: &Panel, field: PanelField) -> bool {
    panel
        .get(field)
        .is_some_and(|v| !field.reference().contains(v))
}

/// Overall risk. THbc never contributes.
pub fn assess_risk(
    panel: &Panel,
    vitals: &VitalSigns,
    classification: &AcidBaseClassification,
    oxygenation: Oxygenation,
) -> RiskLevel {
    let severe_disturbance = classification.severity == Some(Severity::Severe);
    let low_spo2 = vitals.spo2.is_some_and(|v| v < SPO2_CRITICAL);
    let hypotension = vitals
        .blood_pressure_systolic
        .is_some_and(|v| v < SYSTOLIC_CRITICAL);

    if severe_disturbance || oxygenation == Oxygenation::Hypoxemia || low_spo2 || hypotension {
        return RiskLevel::High;
    }

    let disturbance = matches!(
        classification.severity,
        Some(Severity::Mild | Severity::Moderate)
    );
    let electrolytes = outside(panel, PanelField::K) || outside(panel, PanelField::Ca);
    let lactate = panel.get(PanelField::Lac).is_some_and(|v| v > LACTATE_HIGH);

    if disturbance || oxygenation == Oxygenation::MildHypoxemia || electrolytes || lactate {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
