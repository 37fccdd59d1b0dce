//! Per-request state machine.
//!
//! `Received → Validated → {RuleComputed | ModelInvoked} → Sanitized → Assembled → Returned`,
//! with `Failed(kind)` reachable from any non-terminal state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BloodGasError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "kind")]
pub enum RequestState {
    Received,
    Validated,
    RuleComputed,
    ModelInvoked,
    Sanitized,
    Assembled,
    Returned,
    Failed(ErrorKind),
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Returned | RequestState::Failed(_))
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed(_)) => true,
            (Received, Validated) => true,
            (Validated, RuleComputed | ModelInvoked) => true,
            // Model path computes rules alongside the model call
            (RuleComputed, ModelInvoked) => true,
            (RuleComputed | ModelInvoked, Sanitized) => true,
            // Rules-only output is already well-formed
            (RuleComputed, Assembled) => true,
            (Sanitized, Assembled) => true,
            (Assembled, Returned) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Received => f.write_str("received"),
            RequestState::Validated => f.write_str("validated"),
            RequestState::RuleComputed => f.write_str("rule_computed"),
            RequestState::ModelInvoked => f.write_str("model_invoked"),
            RequestState::Sanitized => f.write_str("sanitized"),
            RequestState::Assembled => f.write_str("assembled"),
            RequestState::Returned => f.write_str("returned"),
            RequestState::Failed(kind) => write!(f, "failed({kind:?})"),
        }
    }
}

/// Tracks one request through its states, logging each transition.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    current: RequestState,
    history: Vec<RequestState>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            current: RequestState::Received,
            history: vec![RequestState::Received],
        }
    }

    pub fn current(&self) -> RequestState {
        self.current
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    pub fn advance(&mut self, next: RequestState) -> Result<(), BloodGasError> {
        if !self.current.can_transition_to(next) {
            return Err(BloodGasError::Internal(format!(
                "illegal request state transition {} -> {}",
                self.current, next
            )));
        }
        tracing::debug!(from = %self.current, to = %next, "request state transition");
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed(kind)` and hand the error back for propagation.
    pub fn fail(&mut self, error: BloodGasError) -> BloodGasError {
        let next = RequestState::Failed(error.kind());
        if self.current.can_transition_to(next) {
            tracing::debug!(from = %self.current, to = %next, "request state transition");
            self.current = next;
            self.history.push(next);
        }
        error
    }
}
