//! Step interpreter: runs exactly one flow step.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::core::conditions::{ConditionEvaluator, render_template_variables};
use crate::core::conversation::{ConversationState, Event};
use crate::core::domain::ACTION_SEND_TEXT_NAME;
use crate::core::frames::{StackFrame, StackFrameType};
use crate::core::patterns::{
    reset_scoped_slots, trigger_pattern_ask_collect_information, trigger_pattern_completed,
    trigger_pattern_continue_interrupted,
};
use crate::core::stack::{DialogueStack, StackPosition};
use crate::core::types::{ActionPrediction, FlowStepResult};
use crate::error::FlowError;
use crate::flows::{Flow, FlowStep, FlowsList, SlotAssignment, StepKind};
use crate::io::generator::ResponseGenerator;

/// Read-only inputs shared by every step of a turn.
pub struct StepEnv<'a, C: ?Sized, G: ?Sized> {
    pub flows: &'a FlowsList,
    /// Names the interpreter may predict; anything else is skipped.
    pub available_actions: &'a BTreeSet<String>,
    pub conditions: &'a C,
    pub generator: &'a G,
}

/// Run `step` of `flow` and report whether the turn continues.
///
/// May push or pop frames on `stack`. Events are returned, not applied;
/// `state` is only read.
pub fn run_step<C, G>(
    step: &FlowStep,
    flow: &Flow,
    stack: &mut DialogueStack,
    state: &ConversationState,
    env: &StepEnv<'_, C, G>,
) -> Result<FlowStepResult, FlowError>
where
    C: ConditionEvaluator + ?Sized,
    G: ResponseGenerator + ?Sized,
{
    match &step.kind {
        StepKind::Collect {
            collect,
            utter,
            rejections,
            ask_before_filling,
            ..
        } => {
            debug!(slot = %collect, "running collect step");
            let utter = utter
                .clone()
                .unwrap_or_else(|| format!("utter_ask_{collect}"));
            trigger_pattern_ask_collect_information(collect, stack, rejections, &utter);
            let events = events_for_collect_step(collect, *ask_before_filling, state);
            Ok(FlowStepResult::proceed_with(events))
        }

        StepKind::Action { action } => {
            let template = action
                .as_deref()
                .filter(|action| !action.trim().is_empty())
                .ok_or_else(|| FlowError::MissingAction {
                    flow_id: flow.id.clone(),
                    step_id: step.id.clone(),
                })?;
            let context = stack.current_context();
            let action_name = render_template_variables(env.conditions, template, &context)
                .map_err(|err| FlowError::Template {
                    template: template.to_string(),
                    message: err.to_string(),
                })?;

            if env.available_actions.contains(&action_name) {
                debug!(action = %action_name, "predicting flow action");
                Ok(FlowStepResult::pause(ActionPrediction::new(action_name, 1.0)))
            } else {
                warn!(action = %action_name, "skipping unknown flow action");
                Ok(FlowStepResult::proceed())
            }
        }

        StepKind::Link { link } => {
            debug!(link = %link, "running link step");
            // Below the current frame: the linking flow completes first.
            stack.push_at(
                StackFrame::new(link.clone(), StackFrameType::Link),
                StackPosition::BelowTop,
            );
            Ok(FlowStepResult::proceed())
        }

        StepKind::SetSlots { slots } => {
            debug!(count = slots.len(), "running set slots step");
            Ok(FlowStepResult::proceed_with(events_from_set_slots(slots)))
        }

        StepKind::Branch => {
            debug!("running branch step");
            Ok(FlowStepResult::proceed())
        }

        StepKind::GenerateResponse { prompt, llm_config } => {
            debug!("running generate response step");
            let text = match env.generator.generate(prompt, llm_config.as_ref(), state) {
                Ok(text) => Value::String(text),
                Err(err) => {
                    error!(error = %err, "response generation failed");
                    Value::Null
                }
            };
            let mut message = Map::new();
            message.insert("text".to_string(), text);
            let mut metadata = Map::new();
            metadata.insert("message".to_string(), Value::Object(message));
            Ok(FlowStepResult::pause(
                ActionPrediction::new(ACTION_SEND_TEXT_NAME, 1.0).with_metadata(metadata),
            ))
        }

        StepKind::End => {
            debug!("flow ended");
            let ended = stack.pop().ok_or_else(|| {
                FlowError::InvalidStack(format!(
                    "flow '{}' reached its end with an empty stack",
                    flow.id
                ))
            })?;
            trigger_pattern_continue_interrupted(&ended, stack, env.flows);
            trigger_pattern_completed(&ended, stack, env.flows);
            Ok(FlowStepResult::proceed_with(reset_scoped_slots(flow, state)))
        }

        StepKind::Start | StepKind::Continue => Err(FlowError::UnexpectedStep {
            flow_id: flow.id.clone(),
            step_id: step.id.clone(),
            kind: step.kind.as_str(),
        }),
    }
}

fn events_from_set_slots(slots: &[SlotAssignment]) -> Vec<Event> {
    slots
        .iter()
        .map(|slot| Event::slot_set(slot.key.clone(), slot.value.clone()))
        .collect()
}

/// Reset an already-filled slot so it is asked again.
fn events_for_collect_step(
    collect: &str,
    ask_before_filling: bool,
    state: &ConversationState,
) -> Vec<Event> {
    match state.slot(collect) {
        Some(slot) if slot.has_been_set && ask_before_filling => {
            vec![Event::slot_set(collect, slot.initial_value.clone())]
        }
        _ => Vec::new(),
    }
}
