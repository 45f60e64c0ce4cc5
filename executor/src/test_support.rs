//! Test-only builders for flows, domains and scripted collaborators.

use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::conditions::ConditionEvaluator;
use crate::core::conversation::ConversationState;
use crate::core::domain::{Domain, SlotDefinition};
use crate::flows::{Flow, FlowLink, FlowStep, FlowsList, SlotAssignment, StepKind};
use crate::io::generator::ResponseGenerator;

/// Action step predicting `name`.
pub fn action(id: &str, name: &str) -> FlowStep {
    FlowStep::new(
        id,
        StepKind::Action {
            action: Some(name.to_string()),
        },
    )
}

/// Branch step with explicit links.
pub fn branch(id: &str, next: Vec<FlowLink>) -> FlowStep {
    FlowStep::new(id, StepKind::Branch).with_next(next)
}

/// Link step transferring control to `target` flow.
pub fn link_step(id: &str, target: &str) -> FlowStep {
    FlowStep::new(
        id,
        StepKind::Link {
            link: target.to_string(),
        },
    )
}

/// Collect step for `slot` with default utterance and no rejections.
pub fn collect(id: &str, slot: &str, reset_after_flow_ends: bool) -> FlowStep {
    FlowStep::new(
        id,
        StepKind::Collect {
            collect: slot.to_string(),
            utter: None,
            rejections: Vec::new(),
            ask_before_filling: false,
            reset_after_flow_ends,
        },
    )
}

/// Set-slots step writing `pairs` in order.
pub fn set_slots(id: &str, pairs: &[(&str, Value)]) -> FlowStep {
    FlowStep::new(
        id,
        StepKind::SetSlots {
            slots: pairs
                .iter()
                .map(|(key, value)| SlotAssignment {
                    key: key.to_string(),
                    value: value.clone(),
                })
                .collect(),
        },
    )
}

pub fn static_link(target: &str) -> FlowLink {
    FlowLink::Static {
        target: target.to_string(),
    }
}

pub fn if_link(condition: &str, target: &str) -> FlowLink {
    FlowLink::If {
        condition: condition.to_string(),
        target: target.to_string(),
    }
}

pub fn else_link(target: &str) -> FlowLink {
    FlowLink::Else {
        target: target.to_string(),
    }
}

/// Catalog of unnamed flows, without the built-in patterns.
pub fn flows(definitions: Vec<(&str, Vec<FlowStep>)>) -> FlowsList {
    FlowsList::new(
        definitions
            .into_iter()
            .map(|(id, steps)| Flow::new(id, None, steps))
            .collect(),
    )
}

/// Domain declaring only `slots`.
pub fn domain_with_slots(slots: &[(&str, Value)]) -> Domain {
    domain(&[], slots)
}

/// Domain declaring `actions` and `slots`.
pub fn domain(actions: &[&str], slots: &[(&str, Value)]) -> Domain {
    Domain {
        actions: actions.iter().map(|name| name.to_string()).collect(),
        responses: Vec::new(),
        slots: slots
            .iter()
            .map(|(name, initial_value)| {
                (
                    name.to_string(),
                    SlotDefinition {
                        initial_value: initial_value.clone(),
                    },
                )
            })
            .collect(),
    }
}

/// Condition evaluator that renders text verbatim and answers predicates from
/// a fixed table, recording every call.
pub struct RecordingConditions {
    results: HashMap<String, bool>,
    default: bool,
    renders: RefCell<usize>,
    evaluated: RefCell<Vec<String>>,
}

impl RecordingConditions {
    /// Every predicate evaluates to `result`.
    pub fn always(result: bool) -> Self {
        Self {
            results: HashMap::new(),
            default: result,
            renders: RefCell::new(0),
            evaluated: RefCell::new(Vec::new()),
        }
    }

    /// Predicates named in `results` get the paired value; others are false.
    pub fn with_results(results: &[(&str, bool)]) -> Self {
        Self {
            results: results
                .iter()
                .map(|(expression, result)| (expression.to_string(), *result))
                .collect(),
            ..Self::always(false)
        }
    }

    pub fn evaluations(&self) -> usize {
        self.evaluated.borrow().len()
    }

    pub fn renders(&self) -> usize {
        *self.renders.borrow()
    }

    /// Evaluated expressions, in call order.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.borrow().clone()
    }
}

impl ConditionEvaluator for RecordingConditions {
    fn render(&self, text: &str, _vars: &Value) -> Result<String> {
        *self.renders.borrow_mut() += 1;
        Ok(text.to_string())
    }

    fn evaluate(&self, expression: &str, _document: &Value) -> Result<bool> {
        self.evaluated.borrow_mut().push(expression.to_string());
        Ok(self
            .results
            .get(expression)
            .copied()
            .unwrap_or(self.default))
    }
}

/// Generator returning a fixed text (or failing), recording prompts.
pub struct ScriptedGenerator {
    text: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Generator whose every call fails.
    pub fn failing() -> Self {
        Self {
            text: None,
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ResponseGenerator for ScriptedGenerator {
    fn generate(
        &self,
        prompt: &str,
        _llm_config: Option<&Value>,
        _state: &ConversationState,
    ) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.text
            .clone()
            .ok_or_else(|| anyhow!("scripted generator failure"))
    }
}
