//! Weight-based dosing: bicarbonate, potassium, calcium; alkalosis management.
//!
//! Figures are returned unrounded. Rounding happens only in narrative text.

use crate::models::{
    AcidCorrection, AlkalosisManagement, CalciumCorrection, ElectrolyteCorrection, Panel,
    PotassiumCorrection, Weight, ACID_FORMULA, CALCIUM_FORMULA, POTASSIUM_FORMULA,
};
use crate::schema::PanelField;

use super::acid_base::{bicarbonate, PH_HIGH, PH_LOW};

/// Extracellular distribution factor.
pub const DISTRIBUTION_FACTOR: f64 = 0.3;
/// mmol NaHCO3 per ml of 5% solution.
pub const NAHCO3_5_PERCENT_MMOL_PER_ML: f64 = 0.6;
/// mmol K+ per g KCl.
pub const KCL_MMOL_PER_GRAM: f64 = 13.4;
/// mmol Ca++ per g calcium gluconate.
pub const CA_GLUCONATE_MMOL_PER_GRAM: f64 = 2.2;
/// mmol Ca++ per g calcium chloride.
pub const CA_CHLORIDE_MMOL_PER_GRAM: f64 = 6.8;

const ALKALOSIS_HCO3: f64 = 27.0;
const ALKALOSIS_PCO2: f64 = 35.0;
const HYPOKALEMIA: f64 = 3.5;

pub const WEIGHT_REQUIRED: &str =
    "Please supply the patient's weight before dosage can be computed.";

/// Bicarbonate requirement for `|be|` at `weight_kg`: (mmol, 5% ml).
pub fn bicarbonate_dose(be: f64, weight_kg: f64) -> (f64, f64) {
    let mmol = be.abs() * weight_kg * DISTRIBUTION_FACTOR;
    (mmol, mmol / NAHCO3_5_PERCENT_MMOL_PER_ML)
}

/// Bicarbonate correction for metabolic acidosis.
///
/// Computed only when pH < 7.35, a base excess is present and weight is
/// available. A missing weight yields an explicit weight request instead of
/// figures.
pub fn acid_correction(panel: &Panel, weight: Weight) -> AcidCorrection {
    let base = AcidCorrection {
        formula_used: ACID_FORMULA.into(),
        weight_used: weight.kg(),
        ..AcidCorrection::default()
    };

    let Some(ph) = panel.get(PanelField::Ph) else {
        return AcidCorrection {
            condition: "not evaluated: pH not reported".into(),
            recommendation: "Bicarbonate therapy cannot be assessed without pH.".into(),
            calculation_basis: "pH absent".into(),
            ..base
        };
    };

    if ph >= PH_LOW {
        return AcidCorrection {
            condition: format!("not met: pH {ph} is not below {PH_LOW}"),
            be_value: panel.base_excess().map(|(_, be)| be),
            recommendation: "No bicarbonate correction is indicated.".into(),
            calculation_basis: format!("pH {ph}"),
            ..base
        };
    }

    let Some((be_field, be)) = panel.base_excess() else {
        return AcidCorrection {
            condition: format!("pH {ph} is below {PH_LOW} but base excess was not reported"),
            recommendation: "Report BEecf or BE(B) so the bicarbonate requirement can be sized."
                .into(),
            calculation_basis: format!("pH {ph}; base excess absent"),
            ..base
        };
    };

    let Some(weight_kg) = weight.kg() else {
        return AcidCorrection {
            condition: format!("met: pH {ph}, {} {be}; weight unavailable", be_field.label()),
            be_value: Some(be),
            recommendation: WEIGHT_REQUIRED.into(),
            calculation_basis: format!(
                "pH {ph} and {} {be} mmol/L were reported; no weight was supplied, so no mmol or ml figure is given",
                be_field.label()
            ),
            ..base
        };
    };

    let (mmol, ml) = bicarbonate_dose(be, weight_kg);
    let initial = ml / 2.0;
    AcidCorrection {
        condition: format!("met: pH {ph} < {PH_LOW} with {} {be}", be_field.label()),
        be_value: Some(be),
        calculated_na_hco3_mmol: Some(mmol),
        nahco3_5_percent_ml: Some(ml),
        initial_dose_ml: Some(initial),
        recommendation: format!(
            "Administer half the computed volume first ({initial:.1} ml of 5% NaHCO3), \
             then reassess with a repeat blood-gas panel before giving the remainder."
        ),
        calculation_basis: format!(
            "{} {be} mmol/L, weight {weight_kg} kg: |{be}| x {weight_kg} x 0.3 = {mmol:.1} mmol; \
             {mmol:.1} / 0.6 = {ml:.1} ml",
            be_field.label()
        ),
        ..base
    }
}

/// Alkalosis typing and management advice. Chloride is not a panel
/// indicator, so `cl_level` is always null.
pub fn alkalosis_management(panel: &Panel) -> AlkalosisManagement {
    let k = panel.get(PanelField::K);
    let base = AlkalosisManagement {
        k_level: k,
        ..AlkalosisManagement::default()
    };

    let Some(ph) = panel.get(PanelField::Ph) else {
        return AlkalosisManagement {
            condition: "not evaluated: pH not reported".into(),
            calculation_basis: "pH absent".into(),
            ..base
        };
    };
    if ph <= PH_HIGH {
        return AlkalosisManagement {
            condition: format!("not met: pH {ph} is not above {PH_HIGH}"),
            alkalosis_type: "none".into(),
            fluid_therapy: "No alkalosis-specific fluid therapy is indicated.".into(),
            ventilation_adjustment: "No ventilation change is indicated for alkalosis.".into(),
            potassium_advice: potassium_advice(k),
            calculation_basis: format!("pH {ph}"),
            ..base
        };
    }

    let hco3 = bicarbonate(panel);
    let pco2 = panel.get(PanelField::Pco2);
    let metabolic = hco3.is_some_and(|v| v > ALKALOSIS_HCO3);
    let respiratory = pco2.is_some_and(|v| v < ALKALOSIS_PCO2);

    let (kind, fluid, ventilation) = match (metabolic, respiratory) {
        (true, false) => (
            "metabolic",
            "Check serum chloride; if Cl- < 98 mmol/L, replete volume with 0.9% saline.",
            "No ventilator change is indicated for the metabolic component; avoid hyperventilation.",
        ),
        (false, true) => (
            "respiratory",
            "No specific fluid therapy; treat the cause of hyperventilation.",
            "If mechanically ventilated, reduce minute ventilation and recheck PCO2.",
        ),
        (true, true) => (
            "mixed",
            "Check serum chloride; if Cl- < 98 mmol/L, replete volume with 0.9% saline.",
            "If mechanically ventilated, reduce minute ventilation and recheck PCO2.",
        ),
        (false, false) => (
            "undetermined",
            "Bicarbonate and PCO2 do not identify the driver; check serum chloride and volume status.",
            "Review ventilator settings against a repeat PCO2.",
        ),
    };

    let fmt_opt = |v: Option<f64>| v.map_or_else(|| "not reported".to_string(), |v| v.to_string());
    AlkalosisManagement {
        condition: format!("met: pH {ph} > {PH_HIGH}"),
        alkalosis_type: kind.into(),
        fluid_therapy: fluid.into(),
        ventilation_adjustment: ventilation.into(),
        potassium_advice: potassium_advice(k),
        calculation_basis: format!(
            "pH {ph}; HCO3 {} (metabolic if > {ALKALOSIS_HCO3}); PCO2 {} (respiratory if < {ALKALOSIS_PCO2})",
            fmt_opt(hco3),
            fmt_opt(pco2)
        ),
        ..base
    }
}

fn potassium_advice(k: Option<f64>) -> String {
    match k {
        None => "K+ not reported; check potassium before correcting alkalosis.".into(),
        Some(v) if v < HYPOKALEMIA => {
            format!("K+ {v} mmol/L is below {HYPOKALEMIA}; start potassium replacement.")
        }
        Some(v) => format!("K+ {v} mmol/L does not require replacement."),
    }
}

/// Deficit in mmol against the nearest bound of `field`'s reference range.
/// Negative means excess; zero means within range.
fn deficit(field: PanelField, current: f64, weight_kg: f64) -> (f64, f64) {
    let target = field.reference().clamp(current);
    (target, (target - current) * weight_kg * DISTRIBUTION_FACTOR)
}

fn potassium(k: f64, weight_kg: f64) -> PotassiumCorrection {
    let (target, mmol) = deficit(PanelField::K, k, weight_kg);
    let (grams, advice) = if mmol > 0.0 {
        let g = mmol / KCL_MMOL_PER_GRAM;
        (
            Some(g),
            format!(
                "Replace about {mmol:.1} mmol K+ (≈ {g:.2} g KCl) to reach {target} mmol/L; \
                 infuse slowly with ECG monitoring and recheck."
            ),
        )
    } else if mmol < 0.0 {
        (
            None,
            format!(
                "K+ {k} mmol/L exceeds {target}; excess ≈ {:.1} mmol. Do not supplement; treat hyperkalemia.",
                -mmol
            ),
        )
    } else {
        (None, format!("K+ {k} mmol/L is within range; no replacement needed."))
    };
    PotassiumCorrection {
        current_k: Some(k),
        target_k: Some(target),
        deficit: Some(mmol),
        kcl_grams: grams,
        kcl_recommendation: advice,
        formula: POTASSIUM_FORMULA.into(),
        ..PotassiumCorrection::default()
    }
}

fn calcium(field: PanelField, ca: f64, weight_kg: f64) -> CalciumCorrection {
    let (target, mmol) = deficit(field, ca, weight_kg);
    let (gluconate, chloride, advice) = if mmol > 0.0 {
        let gluc = mmol / CA_GLUCONATE_MMOL_PER_GRAM;
        let chl = mmol / CA_CHLORIDE_MMOL_PER_GRAM;
        (
            Some(gluc),
            Some(chl),
            format!(
                "Replace about {mmol:.1} mmol Ca++: ≈ {gluc:.1} g calcium gluconate \
                 or ≈ {chl:.1} g calcium chloride (central line preferred)."
            ),
        )
    } else if mmol < 0.0 {
        (
            None,
            None,
            format!("{} {ca} mmol/L exceeds {target}; do not supplement.", field.label()),
        )
    } else {
        (
            None,
            None,
            format!("{} {ca} mmol/L is within range; no replacement needed.", field.label()),
        )
    };
    CalciumCorrection {
        current_ca: Some(ca),
        target_ca: Some(target),
        deficit: Some(mmol),
        calcium_gluconate_grams: gluconate,
        calcium_chloride_grams: chloride,
        calcium_recommendation: advice,
        formula: CALCIUM_FORMULA.into(),
        ..CalciumCorrection::default()
    }
}

/// Potassium and calcium corrections. Each item is null unless both the
/// indicator and weight are present.
pub fn electrolyte_correction(panel: &Panel, weight: Weight) -> ElectrolyteCorrection {
    let Some(weight_kg) = weight.kg() else {
        return ElectrolyteCorrection {
            potassium: None,
            calcium: None,
            note: WEIGHT_REQUIRED.into(),
        };
    };

    let potassium = panel.get(PanelField::K).map(|k| potassium(k, weight_kg));
    let calcium = [PanelField::Ca, PanelField::Ca74]
        .into_iter()
        .find_map(|f| panel.get(f).map(|v| (f, v)))
        .map(|(f, v)| calcium(f, v, weight_kg));

    let mut missing = Vec::new();
    if potassium.is_none() {
        missing.push("K+");
    }
    if calcium.is_none() {
        missing.push("Ca++");
    }
    let note = if missing.is_empty() {
        format!("Computed for weight {weight_kg} kg with distribution factor 0.3.")
    } else {
        format!(
            "Computed for weight {weight_kg} kg; {} not reported.",
            missing.join(" and ")
        )
    };

    ElectrolyteCorrection {
        potassium,
        calcium,
        note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(pairs: &[(PanelField, f64)]) -> Panel {
        Panel::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_acid_correction_example() {
        let p = panel(&[(PanelField::Ph, 7.15), (PanelField::BeEcf, -12.0)]);
        let c = acid_correction(&p, Weight::Available(70.0));
        assert_eq!(c.calculated_na_hco3_mmol, Some(252.0));
        assert_eq!(c.nahco3_5_percent_ml, Some(420.0));
        assert_eq!(c.initial_dose_ml, Some(210.0));
        assert!(c.recommendation.contains("210.0"));
        assert!(c.calculation_basis.contains("70"));
        assert_eq!(c.weight_used, Some(70.0));
    }

    #[test]
    fn test_acid_correction_without_weight() {
        let p = panel(&[(PanelField::Ph, 7.15), (PanelField::BeEcf, -12.0)]);
        let c = acid_correction(&p, Weight::Unavailable);
        assert_eq!(c.recommendation, WEIGHT_REQUIRED);
        assert_eq!(c.be_value, Some(-12.0));
        assert_eq!(c.calculated_na_hco3_mmol, None);
        assert_eq!(c.nahco3_5_percent_ml, None);
        assert_eq!(c.initial_dose_ml, None);
        assert_eq!(c.weight_used, None);
    }

    #[test]
    fn test_acid_correction_not_triggered() {
        let p = panel(&[(PanelField::Ph, 7.35), (PanelField::BeEcf, -12.0)]);
        let c = acid_correction(&p, Weight::Available(70.0));
        assert!(c.condition.starts_with("not met"));
        assert_eq!(c.calculated_na_hco3_mmol, None);

        let p = panel(&[(PanelField::Ph, 7.15)]);
        let c = acid_correction(&p, Weight::Available(70.0));
        assert_eq!(c.calculated_na_hco3_mmol, None);
        assert!(c.recommendation.contains("BEecf"));
    }

    #[test]
    fn test_acid_correction_falls_back_to_be_b() {
        let p = panel(&[(PanelField::Ph, 7.25), (PanelField::BeB, -6.0)]);
        let c = acid_correction(&p, Weight::Available(50.0));
        assert_eq!(c.be_value, Some(-6.0));
        assert_eq!(c.calculated_na_hco3_mmol, Some(6.0 * 50.0 * 0.3));
    }

    #[test]
    fn test_alkalosis_typing() {
        let m = alkalosis_management(&panel(&[(PanelField::Ph, 7.50), (PanelField::Hco3Act, 32.0)]));
        assert_eq!(m.alkalosis_type, "metabolic");
        assert_eq!(m.cl_level, None);

        let m = alkalosis_management(&panel(&[(PanelField::Ph, 7.50), (PanelField::Pco2, 28.0)]));
        assert_eq!(m.alkalosis_type, "respiratory");

        let m = alkalosis_management(&panel(&[
            (PanelField::Ph, 7.58),
            (PanelField::Hco3Act, 30.0),
            (PanelField::Pco2, 30.0),
            (PanelField::K, 3.1),
        ]));
        assert_eq!(m.alkalosis_type, "mixed");
        assert_eq!(m.k_level, Some(3.1));
        assert!(m.potassium_advice.contains("replacement"));

        let m = alkalosis_management(&panel(&[(PanelField::Ph, 7.40)]));
        assert!(m.condition.starts_with("not met"));
    }

    #[test]
    fn test_potassium_nearest_bound() {
        let p = panel(&[(PanelField::K, 3.0)]);
        let e = electrolyte_correction(&p, Weight::Available(70.0));
        let k = e.potassium.unwrap();
        assert_eq!(k.target_k, Some(3.5));
        let expected = (3.5 - 3.0) * 70.0 * 0.3;
        assert_eq!(k.deficit, Some(expected));
        assert_eq!(k.kcl_grams, Some(expected / 13.4));
        assert!(e.note.contains("Ca++"));

        let p = panel(&[(PanelField::K, 6.0)]);
        let k = electrolyte_correction(&p, Weight::Available(70.0)).potassium.unwrap();
        assert_eq!(k.target_k, Some(5.5));
        assert!(k.deficit.unwrap() < 0.0);
        assert_eq!(k.kcl_grams, None);

        let p = panel(&[(PanelField::K, 4.2)]);
        let k = electrolyte_correction(&p, Weight::Available(70.0)).potassium.unwrap();
        assert_eq!(k.deficit, Some(0.0));
    }

    #[test]
    fn test_calcium_salts() {
        let p = panel(&[(PanelField::Ca, 0.9)]);
        let ca = electrolyte_correction(&p, Weight::Available(60.0)).calcium.unwrap();
        let mmol = (1.10 - 0.9) * 60.0 * 0.3;
        assert_eq!(ca.deficit, Some(mmol));
        assert_eq!(ca.calcium_gluconate_grams, Some(mmol / 2.2));
        assert_eq!(ca.calcium_chloride_grams, Some(mmol / 6.8));
    }

    #[test]
    fn test_calcium_falls_back_to_ca_74() {
        let p = panel(&[(PanelField::Ca74, 1.0)]);
        let ca = electrolyte_correction(&p, Weight::Available(60.0)).calcium.unwrap();
        assert_eq!(ca.current_ca, Some(1.0));
    }

    #[test]
    fn test_electrolytes_without_weight() {
        let p = panel(&[(PanelField::K, 3.0), (PanelField::Ca, 0.9)]);
        let e = electrolyte_correction(&p, Weight::Unavailable);
        assert!(e.potassium.is_none());
        assert!(e.calcium.is_none());
        assert_eq!(e.note, WEIGHT_REQUIRED);
    }
}
