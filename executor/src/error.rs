//! Errors that abort a turn.
//!
//! Soft failures (unmatched routing, unknown action names, predicate errors)
//! are logged where they happen and never surface here.

use thiserror::Error;

use crate::core::stack::DialogueStack;

#[derive(Debug, Error)]
pub enum FlowError {
    /// The turn took more steps than the configured ceiling. The flow graph is
    /// malformed or cyclic.
    #[error("flow circuit breaker tripped after {steps} steps")]
    CircuitBreakerTripped { stack: DialogueStack, steps: usize },

    #[error("action not specified for step '{step_id}' in flow '{flow_id}'")]
    MissingAction { flow_id: String, step_id: String },

    #[error("flow '{0}' is on the dialogue stack but not in the flow catalog")]
    UnknownFlow(String),

    #[error("step '{step_id}' not found in flow '{flow_id}'")]
    UnknownStep { flow_id: String, step_id: String },

    #[error("cannot run {kind} step '{step_id}' in flow '{flow_id}'")]
    UnexpectedStep {
        flow_id: String,
        step_id: String,
        kind: &'static str,
    },

    #[error("failed to render template '{template}': {message}")]
    Template { template: String, message: String },

    #[error("invalid dialogue stack: {0}")]
    InvalidStack(String),
}

impl FlowError {
    /// True for errors caused by an invalid flow definition or stack.
    pub fn is_interpretation_error(&self) -> bool {
        !matches!(self, FlowError::CircuitBreakerTripped { .. })
    }
}
