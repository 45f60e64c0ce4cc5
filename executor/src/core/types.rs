//! Shared result types of the step interpreter and the turn loop.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::conversation::Event;

/// Prediction handed back to the caller at the end of a turn.
///
/// `action_name = None` with confidence `0.0` means there is nothing to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPrediction {
    pub action_name: Option<String>,
    pub confidence: f64,
    pub events: Vec<Event>,
    pub metadata: Option<Map<String, Value>>,
}

impl ActionPrediction {
    pub fn new(action_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            action_name: Some(action_name.into()),
            confidence,
            events: Vec::new(),
            metadata: None,
        }
    }

    /// The "nothing to do" prediction.
    pub fn empty() -> Self {
        Self {
            action_name: None,
            confidence: 0.0,
            events: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Outcome of interpreting one step.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStepResult {
    /// Keep interpreting within this turn.
    ContinueWithNextStep { events: Vec<Event> },
    /// Stop the turn and surface `prediction`.
    PauseAndPredictAction {
        prediction: ActionPrediction,
        events: Vec<Event>,
    },
}

impl FlowStepResult {
    pub fn proceed() -> Self {
        Self::ContinueWithNextStep { events: Vec::new() }
    }

    pub fn proceed_with(events: Vec<Event>) -> Self {
        Self::ContinueWithNextStep { events }
    }

    pub fn pause(prediction: ActionPrediction) -> Self {
        Self::PauseAndPredictAction {
            prediction,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[Event] {
        match self {
            Self::ContinueWithNextStep { events } | Self::PauseAndPredictAction { events, .. } => {
                events
            }
        }
    }
}
