//! Model gateway for blood-gas panels.
//!
//! This crate performs report-image recognition and narrative analysis
//! through a hosted generative model (Gemini by default), on top of the
//! deterministic engine in `bloodgas_core`.
//!
//! - [`RecognitionGateway`]: image → candidate panel with confidence and missing fields
//! - [`AnalysisOrchestrator`]: panel + context → `AnalysisResult`, rules-only or with the model
//! - [`ModelClient`]: the async seam; [`GeminiClient`] and [`MockModelClient`] implement it
//! - [`ServiceConfig`]: immutable configuration, loaded from the environment once

pub mod analysis;
pub mod client;
pub mod config;
pub mod extraction;
pub mod prompts;

pub use analysis::*;
pub use client::*;
pub use config::*;
pub use extraction::*;
pub use prompts::*;
