//! Prompts for panel recognition and narrative analysis.
//!
//! The analysis prompt has two parts: fixed clinical instructions
//! ([`ANALYSIS_SYSTEM_TEMPLATE`]) and a per-request data digest
//! ([`ANALYSIS_DIGEST_TEMPLATE`]). Both are filled through [`PromptTemplate`].

use bloodgas_core::schema::PanelField;
use bloodgas_core::{
    AnesthesiaContext, BloodGasError, BloodGasResult, Panel, TransfusionTarget, VitalSigns, Weight,
};

/// A named slot in a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    WeightStatus,
    PanelDigest,
    VitalsDigest,
    AnesthesiaDigest,
    WeightDigest,
    TransfusionTarget,
}

impl Placeholder {
    pub const ALL: [Placeholder; 6] = [
        Placeholder::WeightStatus,
        Placeholder::PanelDigest,
        Placeholder::VitalsDigest,
        Placeholder::AnesthesiaDigest,
        Placeholder::WeightDigest,
        Placeholder::TransfusionTarget,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Placeholder::WeightStatus => "{{weight_status}}",
            Placeholder::PanelDigest => "{{panel_digest}}",
            Placeholder::VitalsDigest => "{{vitals_digest}}",
            Placeholder::AnesthesiaDigest => "{{anesthesia_digest}}",
            Placeholder::WeightDigest => "{{weight_digest}}",
            Placeholder::TransfusionTarget => "{{transfusion_target}}",
        }
    }
}

/// Static prompt text with placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    text: &'static str,
}

impl PromptTemplate {
    pub const fn new(text: &'static str) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &'static str {
        self.text
    }

    /// Placeholders the template uses, in first-occurrence order.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        let mut found: Vec<(usize, Placeholder)> = Placeholder::ALL
            .into_iter()
            .filter_map(|p| self.text.find(p.token()).map(|at| (at, p)))
            .collect();
        found.sort_by_key(|(at, _)| *at);
        found.into_iter().map(|(_, p)| p).collect()
    }

    /// Substitute every placeholder in a single pass over the template.
    ///
    /// Substituted values are never rescanned. A placeholder with no value
    /// is an internal error.
    pub fn render(&self, values: &[(Placeholder, &str)]) -> BloodGasResult<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match Placeholder::ALL.into_iter().find(|p| tail.starts_with(p.token())) {
                Some(placeholder) => {
                    let value = values
                        .iter()
                        .find(|(p, _)| *p == placeholder)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| {
                            BloodGasError::Internal(format!(
                                "prompt placeholder {} was not filled",
                                placeholder.token()
                            ))
                        })?;
                    out.push_str(value);
                    rest = &tail[placeholder.token().len()..];
                }
                None => {
                    out.push_str("{{");
                    rest = &tail[2..];
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Instructions for reading a blood-gas report image.
pub fn make_extraction_prompt() -> String {
    let table: Vec<String> = PanelField::ALL
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let unit = if f.unit().is_empty() {
                String::new()
            } else {
                format!(" ({})", f.unit())
            };
            format!(
                "| {} | {} | {}{} | {} |",
                i + 1,
                f.key(),
                f.label(),
                unit,
                f.spec().reference_label
            )
        })
        .collect();
    let skeleton: Vec<String> = PanelField::ALL
        .iter()
        .map(|f| format!("  \"{}\": number or null,", f.key()))
        .collect();

    format!(
        r#"You are an OCR system for arterial blood-gas analyser reports.

Hard rules:
1. Never invent a value. An indicator that is blurred, covered or absent must be null.
2. Never derive a value. Only transcribe numbers that are printed on the report; do not compute any indicator from a formula.
3. When in doubt, return null.

Extract these 18 indicators:

| # | key | indicator | reference |
|---|-----|-----------|-----------|
{table}

Return a single JSON object and nothing else, no markdown:

{{
{skeleton}
  "confidence": number between 0.0 and 1.0,
  "missing_fields": ["keys of indicators you could not read"]
}}

- Every indicator returned as null must also be listed in missing_fields.
- If the report uses a non-standard unit (for example kPa instead of mmHg), convert it to the unit above.
- Base confidence on legibility of the image and completeness of the data."#,
        table = table.join("\n"),
        skeleton = skeleton.join("\n"),
    )
}

/// Fixed clinical instructions for narrative analysis.
pub const ANALYSIS_SYSTEM_TEMPLATE: PromptTemplate = PromptTemplate::new(
    r#"You are a senior consultant anesthesiologist with extensive perioperative experience.

Your task: from the 18 blood-gas indicators, patient weight and vital signs, give quantified, specific and actionable clinical recommendations.

{{weight_status}}

## 1. Acid-base correction

### A. Metabolic acidosis (pH < 7.35 and a base excess is reported)
Formula: NaHCO3 (mmol) = |BE| x weight (kg) x 0.3
5% sodium bicarbonate: 1 ml = 0.6 mmol NaHCO3
- Compute the NaHCO3 mmol and convert to ml of 5% solution.
- Recommend giving half the computed volume first, then reassessing with a repeat blood gas before giving the remainder.

### B. Alkalosis (pH > 7.45)
- HCO3- above 27 suggests a metabolic component; PCO2 below 35 suggests a respiratory component.
- K+ < 3.5: potassium replacement.
- Adjust ventilation when a respiratory component is present.

## 2. Anemia and transfusion
Target THbc for this patient: {{transfusion_target}} g/L. Size every transfusion recommendation against this target.
deficit = max(0, target - current THbc); PRBC units = ceil(deficit / 7).
Remind the clinician to track blood loss, assess circulation and balance oxygen supply and demand.

## 3. Electrolytes
K+: normal 3.5-5.5 mmol/L; K+ (mmol) = (target - current) x weight (kg) x 0.3; 1 g KCl = 13.4 mmol K+.
Ca++: normal 1.10-1.35 mmol/L; 1 g calcium gluconate = 2.2 mmol; 1 g calcium chloride = 6.8 mmol.

## 4. Output format
Return only JSON with this structure:

{
  "assessment": {"status": "", "primary_disorder": "", "compensation": "", "severity": "mild|moderate|severe", "oxygenation": "", "risk_level": "low|medium|high", "summary": ""},
  "acid_correction": {"condition": "", "be_value": null, "calculated_na_hco3_mmol": null, "nahco3_5_percent_ml": null, "initial_dose_ml": null, "recommendation": "", "formula_used": "", "weight_used": null, "calculation_basis": ""},
  "alkalosis_management": {"condition": "", "type": "metabolic|respiratory|mixed", "cl_level": null, "k_level": null, "fluid_therapy": "", "ventilation_adjustment": "", "potassium_advice": "", "calculation_basis": ""},
  "transfusion_guidance": {"condition": "", "current_thbc": null, "target_thbc": null, "hemoglobin_deficit": null, "prbc_units_estimated": null, "formula_used": "", "clinical_reminders": []},
  "electrolyte_correction": {"potassium": {"current_k": null, "normal_range": "3.5-5.5", "target_k": null, "deficit": null, "kcl_grams": null, "kcl_recommendation": "", "formula": ""}, "calcium": {"current_ca": null, "normal_range": "1.10-1.35", "target_ca": null, "deficit": null, "calcium_gluconate_grams": null, "calcium_chloride_grams": null, "calcium_recommendation": "", "formula": ""}, "note": ""},
  "findings": [{"category": "", "parameter": "", "value": null, "reference": "", "deviation": "", "interpretation": "", "severity": "normal|mild|moderate|severe"}],
  "recommendations": [{"priority": "high|medium|low", "category": "", "action": "", "detail": "", "rationale": ""}],
  "alerts": [{"level": "warning|caution|info", "message": "", "recommendation": ""}],
  "safety_warning": "",
  "disclaimer": ""
}

## 5. Rules
1. Show your working: every computed value states its formula and the inputs used (for example "BE -10 mmol/L, weight 60 kg").
2. Without a weight, compute no dosage; the first line of the acid-base recommendation asks the user to supply the patient's weight.
3. Every computed result is followed by the reminder that the clinician must adjust to actual blood loss and circulatory change.
4. Every recommendation is supported by the data.
5. When a value cannot be computed, return null or say so. Never invent data.

Return only JSON."#,
);

/// Per-request data digest.
pub const ANALYSIS_DIGEST_TEMPLATE: PromptTemplate = PromptTemplate::new(
    r#"Analyse the following patient data.

## Blood-gas indicators
{{panel_digest}}

## Vital signs
{{vitals_digest}}

## Anesthesia parameters
{{anesthesia_digest}}

## Patient weight
{{weight_digest}}

Return the complete JSON analysis in the format given in the instructions. Return only JSON."#,
);

/// Weight line for the fixed instructions.
pub fn weight_status(weight: Weight) -> String {
    match weight {
        Weight::Available(kg) => format!(
            "IMPORTANT: patient weight is {kg} kg. Use it for every dosage calculation."
        ),
        Weight::Unavailable => "NOTE: patient weight was not provided. Precise dosage cannot be \
             calculated; ask the user to supply the patient's weight."
            .to_string(),
    }
}

/// Weight line for the data digest, tagged available or unavailable.
pub fn weight_digest(weight: Weight) -> String {
    match weight {
        Weight::Available(kg) => format!("{kg} kg (available: usable for precise dosage calculation)"),
        Weight::Unavailable => {
            "not provided (unavailable: precise dosage cannot be calculated)".to_string()
        }
    }
}

fn tag(abnormal: bool) -> &'static str {
    if abnormal {
        "abnormal"
    } else {
        "normal"
    }
}

/// Normal/abnormal tag for the indicators the digest flags.
fn panel_tag(field: PanelField, value: f64) -> Option<&'static str> {
    let abnormal = match field {
        PanelField::Ph => !(7.35..=7.45).contains(&value),
        PanelField::Po2 => value < 80.0,
        PanelField::Pco2 => !(35.0..=45.0).contains(&value),
        PanelField::So2c => value < 95.0,
        PanelField::Lac => value > 2.2,
        _ => return None,
    };
    Some(tag(abnormal))
}

/// One line per reported indicator, plus recognition confidence when known.
pub fn panel_digest(panel: &Panel, confidence: Option<f64>) -> String {
    let mut lines: Vec<String> = panel
        .iter()
        .map(|(field, value)| {
            let unit = if field.unit().is_empty() {
                String::new()
            } else {
                format!(" {}", field.unit())
            };
            match panel_tag(field, value) {
                Some(t) => format!("- {}: {}{} ({})", field.label(), value, unit, t),
                None => format!("- {}: {}{}", field.label(), value, unit),
            }
        })
        .collect();

    if lines.is_empty() {
        return "No blood-gas values supplied.".to_string();
    }
    if let Some(confidence) = confidence {
        lines.push(format!("\nRecognition confidence: {:.1}%", confidence * 100.0));
    }
    lines.join("\n")
}

pub fn vitals_digest(vitals: &VitalSigns) -> String {
    let mut lines = Vec::new();
    if let (Some(sys), Some(dia)) = (vitals.blood_pressure_systolic, vitals.blood_pressure_diastolic) {
        lines.push(format!("- Blood pressure: {sys}/{dia} mmHg"));
    }
    if let Some(hr) = vitals.heart_rate {
        lines.push(format!("- Heart rate: {hr} bpm ({})", tag(!(60.0..=100.0).contains(&hr))));
    }
    if let Some(t) = vitals.temperature {
        lines.push(format!("- Temperature: {t} °C ({})", tag(!(36.0..=37.5).contains(&t))));
    }
    if let Some(spo2) = vitals.spo2 {
        lines.push(format!("- SpO2: {spo2}% ({})", tag(spo2 < 95.0)));
    }
    if let Some(rr) = vitals.respiratory_rate {
        lines.push(format!(
            "- Respiratory rate: {rr} /min ({})",
            tag(!(12.0..=20.0).contains(&rr))
        ));
    }

    if lines.is_empty() {
        "No vital signs supplied.".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn anesthesia_digest(context: &AnesthesiaContext) -> String {
    let mut lines = Vec::new();
    if let Some(kind) = &context.anesthesia_type {
        lines.push(format!("- Anesthesia type: {kind}"));
    }
    if let Some(intubated) = context.intubated {
        lines.push(format!("- Intubated: {}", if intubated { "yes" } else { "no" }));
    }
    if let Some(position) = &context.position {
        lines.push(format!("- Surgical position: {position}"));
    }
    if let Some(surgery) = &context.surgery_type {
        lines.push(format!("- Surgery type: {surgery}"));
    }
    if !context.medications.is_empty() {
        lines.push(format!("- Medications: {}", context.medications.join(", ")));
    }
    if let Some(ml) = context.fluid_input_ml {
        lines.push(format!("- Fluid input: {ml} ml"));
    }
    if let Some(ml) = context.blood_loss_ml {
        lines.push(format!("- Blood loss: {ml} ml"));
    }
    if let Some(ml) = context.urine_output_ml {
        lines.push(format!("- Urine output: {ml} ml"));
    }
    if let Some(notes) = &context.notes {
        lines.push(format!("- Notes: {notes}"));
    }

    if lines.is_empty() {
        "No anesthesia parameters supplied.".to_string()
    } else {
        lines.join("\n")
    }
}

/// Render the instruction and digest halves of an analysis prompt.
pub fn make_analysis_prompts(
    panel: &Panel,
    vitals: &VitalSigns,
    anesthesia: &AnesthesiaContext,
    weight: Weight,
    transfusion_target: TransfusionTarget,
    confidence: Option<f64>,
) -> BloodGasResult<(String, String)> {
    let status = weight_status(weight);
    let target = transfusion_target.g_l().to_string();
    let system = ANALYSIS_SYSTEM_TEMPLATE.render(&[
        (Placeholder::WeightStatus, &status),
        (Placeholder::TransfusionTarget, &target),
    ])?;

    let panel_text = panel_digest(panel, confidence);
    let vitals_text = vitals_digest(vitals);
    let anesthesia_text = anesthesia_digest(anesthesia);
    let weight_text = weight_digest(weight);
    let digest = ANALYSIS_DIGEST_TEMPLATE.render(&[
        (Placeholder::PanelDigest, &panel_text),
        (Placeholder::VitalsDigest, &vitals_text),
        (Placeholder::AnesthesiaDigest, &anesthesia_text),
        (Placeholder::WeightDigest, &weight_text),
    ])?;

    Ok((system, digest))
}
