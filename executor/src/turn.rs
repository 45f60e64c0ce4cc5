//! Turn loop: advances the dialogue stack until an action is predicted.
//!
//! A turn rebuilds the stack from conversation state, interprets steps on a
//! private working copy of that state and hands back a single prediction
//! carrying every event produced along the way. Nothing is committed by the
//! loop itself; the caller applies the returned events.

use serde_json::Value;
use tracing::{debug, debug_span, error, instrument};

use crate::core::conditions::ConditionEvaluator;
use crate::core::conversation::ConversationState;
use crate::core::domain::{ACTION_LISTEN_NAME, Domain};
use crate::core::selector::select_next_step;
use crate::core::stack::DialogueStack;
use crate::core::types::{ActionPrediction, FlowStepResult};
use crate::error::FlowError;
use crate::flows::FlowsList;
use crate::io::generator::ResponseGenerator;
use crate::step::{StepEnv, run_step};

/// Default ceiling on steps interpreted in one turn.
pub const MAX_NUMBER_OF_STEPS: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnConfig {
    /// The circuit breaker trips once the step counter exceeds this value.
    pub max_steps: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_steps: MAX_NUMBER_OF_STEPS,
        }
    }
}

/// Run one turn for `state`.
///
/// Returns the empty prediction when no flow is active. If the stack changed
/// during the turn, the prediction's last event persists the new stack.
#[instrument(skip_all, fields(sender_id = %state.sender_id()))]
pub fn advance_flows<C, G>(
    state: &ConversationState,
    domain: &Domain,
    flows: &FlowsList,
    conditions: &C,
    generator: &G,
    config: &TurnConfig,
) -> Result<ActionPrediction, FlowError>
where
    C: ConditionEvaluator + ?Sized,
    G: ResponseGenerator + ?Sized,
{
    let mut stack = DialogueStack::from_state(state)?;
    if stack.is_empty() {
        debug!("no flow in progress");
        return Ok(ActionPrediction::empty());
    }

    let snapshot: Value = stack.to_value();
    let available_actions = domain.action_names_or_texts();
    let env = StepEnv {
        flows,
        available_actions: &available_actions,
        conditions,
        generator,
    };

    let mut prediction = select_next_action(&mut stack, state.clone(), &env, config)?;

    if stack.to_value() != snapshot {
        debug!(frames = stack.len(), "dialogue stack updated");
        prediction.events.push(stack.persist_as_event());
    }
    Ok(prediction)
}

/// Interpret steps until one pauses or the stack runs out of flows.
///
/// `state` is the turn's working copy: events are applied to it as they are
/// produced so later predicates see them.
pub fn select_next_action<C, G>(
    stack: &mut DialogueStack,
    mut state: ConversationState,
    env: &StepEnv<'_, C, G>,
    config: &TurnConfig,
) -> Result<ActionPrediction, FlowError>
where
    C: ConditionEvaluator + ?Sized,
    G: ResponseGenerator + ?Sized,
{
    let mut gathered = Vec::new();
    let mut steps = 0usize;

    let mut prediction = loop {
        steps += 1;
        if steps > config.max_steps {
            error!(steps, stack = %stack.to_value(), "flow circuit breaker tripped");
            return Err(FlowError::CircuitBreakerTripped {
                stack: stack.clone(),
                steps,
            });
        }

        let Some(top) = stack.top() else {
            debug!("stack is empty, waiting for user");
            break ActionPrediction::new(ACTION_LISTEN_NAME, 1.0);
        };
        if !top.frame_type.is_flow() {
            debug!(frame_type = top.frame_type.as_str(), "top frame is not a flow");
            break ActionPrediction::new(ACTION_LISTEN_NAME, 1.0);
        }

        let flow = stack
            .top_flow(env.flows)
            .ok_or_else(|| FlowError::UnknownFlow(top.flow_id.clone()))?;
        let current = flow
            .step_by_id(&top.step_id)
            .ok_or_else(|| FlowError::UnknownStep {
                flow_id: flow.id.clone(),
                step_id: top.step_id.clone(),
            })?;

        let span = debug_span!("flow_step", flow_id = %flow.id, step_id = %current.id);
        let _entered = span.enter();

        // Cursor stays put; the breaker ends a turn that cannot route.
        let Some(next) = select_next_step(&current, flow, stack, &state, env.conditions) else {
            continue;
        };

        stack.advance_top_flow(&next.id);
        let result = run_step(&next, flow, stack, &state, env)?;
        state.update_with_events(result.events().iter().cloned());
        gathered.extend(result.events().iter().cloned());

        match result {
            FlowStepResult::ContinueWithNextStep { .. } => {}
            FlowStepResult::PauseAndPredictAction { prediction, .. } => break prediction,
        }
    };

    debug!(
        action = ?prediction.action_name,
        steps,
        events = gathered.len(),
        "turn finished"
    );
    prediction.events = gathered;
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conditions::JinjaConditions;
    use crate::core::conversation::Event;
    use crate::core::frames::{StackFrame, StackFrameType};
    use crate::test_support::{
        ScriptedGenerator, action, branch, domain, else_link, flows, if_link, set_slots,
        static_link,
    };
    use serde_json::json;

    fn state_with_stack(stack: &DialogueStack) -> ConversationState {
        let mut state = ConversationState::new("user", &domain(&[], &[]));
        state.update_with_events([stack.persist_as_event()]);
        state
    }

    fn advance(
        state: &ConversationState,
        catalog: &FlowsList,
        config: &TurnConfig,
    ) -> Result<ActionPrediction, FlowError> {
        advance_flows(
            state,
            &domain(&["utter_a"], &[]),
            catalog,
            &JinjaConditions::new(),
            &ScriptedGenerator::new("hi"),
            config,
        )
    }

    #[test]
    fn empty_stack_predicts_nothing() {
        let state = ConversationState::new("user", &domain(&[], &[]));
        let prediction = advance(&state, &FlowsList::default(), &TurnConfig::default())
            .expect("advance");
        assert_eq!(prediction, ActionPrediction::empty());
    }

    #[test]
    fn unchanged_stack_is_not_persisted() {
        let stack = DialogueStack::new(vec![StackFrame::new("search", StackFrameType::Docsearch)]);
        let prediction = advance(
            &state_with_stack(&stack),
            &FlowsList::default(),
            &TurnConfig::default(),
        )
        .expect("advance");
        assert_eq!(prediction.action_name.as_deref(), Some(ACTION_LISTEN_NAME));
        assert!(prediction.events.is_empty());
    }

    #[test]
    fn pause_persists_moved_cursor() {
        let catalog = flows(vec![("f", vec![action("a", "utter_a")])]);
        let stack = DialogueStack::new(vec![StackFrame::regular("f")]);
        let prediction = advance(&state_with_stack(&stack), &catalog, &TurnConfig::default())
            .expect("advance");
        assert_eq!(prediction.action_name.as_deref(), Some("utter_a"));
        let moved = DialogueStack::new(vec![StackFrame::regular("f").with_step("a")]);
        assert_eq!(prediction.events, vec![moved.persist_as_event()]);
    }

    #[test]
    fn unknown_top_flow_is_an_interpretation_error() {
        let stack = DialogueStack::new(vec![StackFrame::regular("missing")]);
        let err = advance(
            &state_with_stack(&stack),
            &FlowsList::default(),
            &TurnConfig::default(),
        )
        .expect_err("unknown flow");
        assert!(matches!(err, FlowError::UnknownFlow(ref id) if id == "missing"));
    }

    #[test]
    fn unknown_cursor_step_is_an_interpretation_error() {
        let catalog = flows(vec![("f", vec![action("a", "utter_a")])]);
        let stack = DialogueStack::new(vec![StackFrame::regular("f").with_step("gone")]);
        let err = advance(&state_with_stack(&stack), &catalog, &TurnConfig::default())
            .expect_err("unknown step");
        assert!(matches!(err, FlowError::UnknownStep { .. }));
    }

    #[test]
    fn configured_ceiling_trips_breaker() {
        let catalog = flows(vec![(
            "loop",
            vec![branch("spin", vec![static_link("spin")])],
        )]);
        let stack = DialogueStack::new(vec![StackFrame::regular("loop")]);
        let err = advance(
            &state_with_stack(&stack),
            &catalog,
            &TurnConfig { max_steps: 3 },
        )
        .expect_err("breaker");
        match err {
            FlowError::CircuitBreakerTripped { steps, stack } => {
                assert_eq!(steps, 4);
                assert_eq!(stack.top().expect("top").step_id, "spin");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn working_state_sees_earlier_events() {
        let catalog = flows(vec![(
            "f",
            vec![
                set_slots("set", &[("go", json!(true))]),
                branch("check", vec![if_link("go", "yes"), else_link("no")]),
                action("no", "action_listen"),
                action("yes", "utter_a"),
            ],
        )]);
        let stack = DialogueStack::new(vec![StackFrame::regular("f")]);
        let prediction = advance(&state_with_stack(&stack), &catalog, &TurnConfig::default())
            .expect("advance");
        assert_eq!(prediction.action_name.as_deref(), Some("utter_a"));
        assert_eq!(
            prediction.events.first(),
            Some(&Event::slot_set("go", json!(true)))
        );
    }
}
