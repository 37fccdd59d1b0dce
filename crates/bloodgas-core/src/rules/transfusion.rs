//! Transfusion guidance from THbc.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::{Panel, TransfusionGuidance, TRANSFUSION_FORMULA};
use crate::schema::{check_bound, PanelField, Range};

/// g/L of hemoglobin one PRBC unit is assumed to add.
pub const GRAMS_PER_UNIT: f64 = 7.0;

/// Allowed range for a caller-lowered target.
pub const SURGICAL_RISK_TARGETS: Range = Range::new(70.0, 100.0);

/// THbc target in g/L.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransfusionTarget(f64);

impl Default for TransfusionTarget {
    fn default() -> Self {
        Self(100.0)
    }
}

impl TransfusionTarget {
    /// Target chosen by the caller for a higher surgical-risk case.
    pub fn for_surgical_risk(g_l: f64) -> Result<Self, ValidationError> {
        check_bound("transfusion_target", g_l, SURGICAL_RISK_TARGETS).map(Self)
    }

    pub fn g_l(self) -> f64 {
        self.0
    }
}

/// PRBC units to close `deficit` g/L.
pub fn units_for_deficit(deficit: f64) -> u32 {
    (deficit.max(0.0) / GRAMS_PER_UNIT).ceil() as u32
}

fn reminders() -> Vec<String> {
    vec![
        "Track intraoperative blood loss.".to_string(),
        "Assess circulatory status before and after each unit.".to_string(),
        "Balance oxygen supply and demand.".to_string(),
        "One PRBC unit raises hemoglobin by about 5-10 g/L; the estimate assumes 7 g/L.".to_string(),
    ]
}

pub fn transfusion_guidance(panel: &Panel, target: TransfusionTarget) -> TransfusionGuidance {
    let target_g_l = target.g_l();
    let Some(thbc) = panel.get(PanelField::Thbc) else {
        return TransfusionGuidance {
            condition: "not evaluated: THbc not reported".into(),
            target_thbc: Some(target_g_l),
            formula_used: TRANSFUSION_FORMULA.into(),
            clinical_reminders: reminders(),
            ..TransfusionGuidance::default()
        };
    };

    let deficit = (target_g_l - thbc).max(0.0);
    let units = units_for_deficit(deficit);
    let condition = if deficit > 0.0 {
        format!("met: THbc {thbc} g/L below target {target_g_l} g/L")
    } else {
        format!("not met: THbc {thbc} g/L at or above target {target_g_l} g/L")
    };

    TransfusionGuidance {
        condition,
        current_thbc: Some(thbc),
        target_thbc: Some(target_g_l),
        hemoglobin_deficit: Some(deficit),
        prbc_units_estimated: Some(units),
        formula_used: TRANSFUSION_FORMULA.into(),
        clinical_reminders: reminders(),
    }
}
