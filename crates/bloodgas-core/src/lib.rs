//! Blood-Gas Core Library
//!
//! Deterministic clinical computation and model-output validation for
//! perioperative blood-gas interpretation.
//!
//! # Architecture
//!
//! ```text
//! raw panel / candidate panel
//!            │
//!            ▼
//!      Panel Schema ──── ValidationError / EmptyPanel
//!            │
//!            ▼
//!   Clinical Rule Engine ─────────────┐
//!            │                        │
//!            │           model output text (untrusted)
//!            │                        │
//!            │                        ▼
//!            │               Response Sanitizer ──── ParseError
//!            │                        │
//!            ▼                        ▼
//!   ┌─────────────────────────────────────────┐
//!   │            Result Assembler             │
//!   │  engine arithmetic is authoritative     │
//!   │  safety_warning + disclaimer always set │
//!   └────────────────────┬────────────────────┘
//!                        ▼
//!                  AnalysisResult
//! ```
//!
//! # Core Principle
//!
//! **This is not a diagnostic authority.** Every result carries a safety
//! warning and a disclaimer, and no dosage is computed from a weight the
//! caller did not supply.
//!
//! # Modules
//!
//! - [`schema`]: the 18 indicators, bounds, reference ranges, key normalization
//! - [`models`]: Panel, Weight, VitalSigns, AnesthesiaContext, AnalysisResult, request state
//! - [`rules`]: acid-base classification, dosing, transfusion, findings
//! - [`sanitize`]: code-fence stripping, lenient parsing, default filling
//! - [`assemble`]: analysis id and final result assembly
//! - [`error`]: failure taxonomy and user-visible error reports

pub mod assemble;
pub mod error;
pub mod models;
pub mod rules;
pub mod sanitize;
pub mod schema;

// Re-export commonly used types
pub use assemble::{analysis_id, assemble_from_model, assemble_from_rules};
pub use error::{BloodGasError, BloodGasResult, ErrorKind, ErrorReport, ValidationError};
pub use models::{
    AnalysisBody, AnalysisResult, AnesthesiaContext, CandidatePanel, Engine, Panel,
    RequestLifecycle, RequestState, Section, VitalSigns, Weight,
};
pub use rules::{ClinicalRules, RuleReport, TransfusionTarget};
pub use sanitize::{parse_model_json, sanitize_analysis, strip_code_fences};
pub use schema::{FieldNormalizer, PanelField, PanelSchema};
