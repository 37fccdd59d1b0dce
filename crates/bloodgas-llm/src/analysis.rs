//! Analysis orchestrator.
//!
//! Pipeline: request → rule engine → (optional) model call → sanitizer → assembler
//!
//! The rule engine always runs. In [`AnalysisMode::Model`] its correction
//! sections replace whatever the model computed.

use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use bloodgas_core::models::{
    AcidCorrection, Alert, ElectrolyteCorrection, Section, TransfusionGuidance,
};
use bloodgas_core::schema::PanelField;
use bloodgas_core::{
    assemble_from_model, assemble_from_rules, sanitize_analysis, AnalysisResult,
    AnesthesiaContext, BloodGasError, BloodGasResult, ClinicalRules, Panel, RequestLifecycle,
    RequestState, VitalSigns, Weight,
};

use crate::client::{ModelClient, ModelRequest};
use crate::config::{MissingFieldPolicy, ServiceConfig};
use crate::extraction::PanelExtraction;
use crate::prompts::make_analysis_prompts;

/// Whether the external model takes part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisMode {
    /// Deterministic result, no model call
    RulesOnly,
    /// Rules plus narrative from the model
    #[default]
    Model,
}

/// Everything one Analyze call consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub panel: Panel,
    pub vitals: VitalSigns,
    pub anesthesia: AnesthesiaContext,
    pub weight: Weight,
    /// Indicators a prior recognition step could not read
    pub missing_fields: Vec<PanelField>,
    /// Recognition confidence, when the panel came from an image
    pub confidence: Option<f64>,
}

impl AnalysisRequest {
    pub fn new(panel: Panel) -> Self {
        Self {
            panel,
            vitals: VitalSigns::default(),
            anesthesia: AnesthesiaContext::default(),
            weight: Weight::Unavailable,
            missing_fields: Vec::new(),
            confidence: None,
        }
    }

    /// Build from a recognition result, validating its panel.
    pub fn from_extraction(extraction: &PanelExtraction) -> BloodGasResult<Self> {
        let mut request = Self::new(extraction.validate()?);
        request.weight = extraction.weight;
        request.missing_fields = extraction.missing_fields.clone();
        request.confidence = Some(extraction.confidence);
        Ok(request)
    }

    pub fn with_vitals(mut self, vitals: VitalSigns) -> Self {
        self.vitals = vitals;
        self
    }

    pub fn with_anesthesia(mut self, anesthesia: AnesthesiaContext) -> Self {
        self.anesthesia = anesthesia;
        self
    }

    pub fn with_weight(mut self, weight: Weight) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_missing_fields(mut self, missing_fields: Vec<PanelField>) -> Self {
        self.missing_fields = missing_fields;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

/// Inputs of each dosage section. Each group lists interchangeable
/// indicators in the order the rule engine prefers them.
const ACID_INPUTS: [&[PanelField]; 2] = [&[PanelField::Ph], &[PanelField::BeEcf, PanelField::BeB]];
const TRANSFUSION_INPUTS: [&[PanelField]; 1] = [&[PanelField::Thbc]];
const POTASSIUM_INPUTS: [&[PanelField]; 1] = [&[PanelField::K]];
const CALCIUM_INPUTS: [&[PanelField]; 1] = [&[PanelField::Ca, PanelField::Ca74]];

/// Runs one analysis request to completion.
pub struct AnalysisOrchestrator<'a> {
    client: Option<&'a dyn ModelClient>,
    config: &'a ServiceConfig,
}

impl<'a> AnalysisOrchestrator<'a> {
    pub fn new(client: &'a dyn ModelClient, config: &'a ServiceConfig) -> Self {
        Self {
            client: Some(client),
            config,
        }
    }

    /// Orchestrator with no model; only [`AnalysisMode::RulesOnly`] succeeds.
    pub fn rules_only(config: &'a ServiceConfig) -> Self {
        Self {
            client: None,
            config,
        }
    }

    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        mode: AnalysisMode,
    ) -> BloodGasResult<AnalysisResult> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "analyze",
            %request_id,
            ?mode,
            model = self.client.map(|c| c.model_name()).unwrap_or("none"),
            indicators = request.panel.present_count()
        );

        async {
            let started = Instant::now();
            let mut lifecycle = RequestLifecycle::new();
            match self.run(request, mode, &mut lifecycle).await {
                Ok(result) => {
                    tracing::info!(
                        engine = ?result.engine,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Analysis complete"
                    );
                    Ok(result)
                }
                Err(e) => {
                    tracing::warn!(kind = ?e.kind(), state = %lifecycle.current(), "Analysis failed");
                    Err(lifecycle.fail(e))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        mode: AnalysisMode,
        lifecycle: &mut RequestLifecycle,
    ) -> BloodGasResult<AnalysisResult> {
        // Panel, weight and context are typed, so they were validated on construction.
        lifecycle.advance(RequestState::Validated)?;

        let rules = ClinicalRules::new().with_transfusion_target(self.config.transfusion_target);
        let report = rules.evaluate(&request.panel, request.weight, &request.vitals);
        lifecycle.advance(RequestState::RuleComputed)?;

        let mut result = match mode {
            AnalysisMode::RulesOnly => assemble_from_rules(&request.panel, report),
            AnalysisMode::Model => {
                let client = self.client.ok_or_else(|| {
                    BloodGasError::Configuration("no model client is configured".into())
                })?;
                let (system, digest) = make_analysis_prompts(
                    &request.panel,
                    &request.vitals,
                    &request.anesthesia,
                    request.weight,
                    self.config.transfusion_target,
                    request.confidence,
                )?;
                let budget = self.config.analysis;
                let model_request = ModelRequest::new(digest, budget).with_system(system);

                lifecycle.advance(RequestState::ModelInvoked)?;
                let raw = match tokio::time::timeout(budget.timeout, client.generate(&model_request))
                    .await
                {
                    Err(_) => {
                        return Err(BloodGasError::Timeout {
                            budget_ms: budget.timeout_ms(),
                        })
                    }
                    Ok(result) => result?,
                };

                let body = sanitize_analysis(&raw)?;
                lifecycle.advance(RequestState::Sanitized)?;
                assemble_from_model(&request.panel, report, body, client.model_name())
            }
        };

        apply_missing_field_policy(
            &mut result,
            &request.panel,
            &request.missing_fields,
            self.config.missing_field_policy,
        );
        lifecycle.advance(RequestState::Assembled)?;
        lifecycle.advance(RequestState::Returned)?;
        Ok(result)
    }
}

fn labels(fields: &[PanelField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unresolved inputs a section actually depends on. Within a group only the
/// indicator the engine used counts; when none was read, every unresolved
/// member of the group does.
fn blocked_by(
    panel: &Panel,
    missing: &[PanelField],
    groups: &[&[PanelField]],
) -> Vec<PanelField> {
    let mut blocked = Vec::new();
    for group in groups {
        match group.iter().copied().find(|f| panel.get(*f).is_some()) {
            Some(used) => {
                if missing.contains(&used) {
                    blocked.push(used);
                }
            }
            None => blocked.extend(group.iter().copied().filter(|f| missing.contains(f))),
        }
    }
    blocked
}

fn withheld(fields: &[PanelField]) -> String {
    format!(
        "Dosage withheld: {} could not be read from the report. Confirm the value manually and re-run the analysis.",
        labels(fields)
    )
}

/// Annotate unresolved indicators and, under [`MissingFieldPolicy::BlockDosage`],
/// replace each dosage section that depends on one with an explanatory default.
/// A section computed from an alternate indicator that was read is kept.
pub fn apply_missing_field_policy(
    result: &mut AnalysisResult,
    panel: &Panel,
    missing: &[PanelField],
    policy: MissingFieldPolicy,
) {
    if missing.is_empty() {
        return;
    }

    result.body.alerts.push(Alert {
        level: "info".into(),
        message: format!("Not resolved from the report image: {}.", labels(missing)),
        recommendation: "Verify these indicators against the printed report or enter them manually."
            .into(),
    });

    if policy != MissingFieldPolicy::BlockDosage {
        return;
    }

    let blocked = blocked_by(panel, missing, &ACID_INPUTS);
    if !blocked.is_empty() {
        result.body.acid_correction = Section::Defaulted(AcidCorrection {
            condition: "not evaluated: acid-base inputs unresolved".into(),
            recommendation: withheld(&blocked),
            ..AcidCorrection::default()
        });
    }

    let blocked = blocked_by(panel, missing, &TRANSFUSION_INPUTS);
    if !blocked.is_empty() {
        result.body.transfusion_guidance = Section::Defaulted(TransfusionGuidance {
            condition: "not evaluated: THbc unresolved".into(),
            clinical_reminders: vec![withheld(&blocked)],
            ..TransfusionGuidance::default()
        });
    }

    let potassium = blocked_by(panel, missing, &POTASSIUM_INPUTS);
    let calcium = blocked_by(panel, missing, &CALCIUM_INPUTS);
    if !potassium.is_empty() || !calcium.is_empty() {
        let mut electrolytes = result.body.electrolyte_correction.value().clone();
        let mut notes = Vec::new();
        if !potassium.is_empty() {
            electrolytes.potassium = None;
            notes.push(withheld(&potassium));
        }
        if !calcium.is_empty() {
            electrolytes.calcium = None;
            notes.push(withheld(&calcium));
        }
        result.body.electrolyte_correction = Section::Defaulted(ElectrolyteCorrection {
            note: notes.join(" "),
            ..electrolytes
        });
    }
}
