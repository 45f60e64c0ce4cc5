//! Transition selection: which step runs after the current one.

use std::borrow::Cow;

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::core::conditions::{ConditionEvaluator, is_condition_satisfied};
use crate::core::conversation::ConversationState;
use crate::core::stack::DialogueStack;
use crate::flows::{END_STEP, Flow, FlowLink, FlowStep, StepKind};

/// Pick the id of the step that follows `current`.
///
/// - A single static link is taken without evaluating anything.
/// - Otherwise `If` links are evaluated in declaration order; the first that
///   holds wins.
/// - Then the first `Else` link, if any.
/// - Links that all fail are a routing failure (`None`).
/// - Without links, `END` has no successor, a link step continues at `END`,
///   and any other step is a routing failure.
pub fn select_next_step_id<C: ConditionEvaluator + ?Sized>(
    current: &FlowStep,
    context: &Map<String, Value>,
    state: &ConversationState,
    conditions: &C,
) -> Option<String> {
    let links = &current.next;
    if let [FlowLink::Static { target }] = links.as_slice() {
        return Some(target.clone());
    }

    for link in links {
        let FlowLink::If { condition, target } = link else {
            continue;
        };
        if !condition.trim().is_empty()
            && is_condition_satisfied(conditions, condition, context, state)
        {
            return Some(target.clone());
        }
    }

    if let Some(target) = links.iter().find_map(|link| match link {
        FlowLink::Else { target } => Some(target),
        _ => None,
    }) {
        return Some(target.clone());
    }

    if !links.is_empty() {
        error!(
            step_id = %current.id,
            links = links.len(),
            "failed to select branch: no link condition matched"
        );
        return None;
    }

    if current.id == END_STEP {
        return None;
    }
    if matches!(current.kind, StepKind::Link { .. }) {
        return Some(END_STEP.to_string());
    }

    error!(step_id = %current.id, "failed to select next step: step has no links");
    None
}

/// Resolve the step that follows `current` in `flow`, using the top frame's
/// context for predicates.
pub fn select_next_step<'a, C: ConditionEvaluator + ?Sized>(
    current: &FlowStep,
    flow: &'a Flow,
    stack: &DialogueStack,
    state: &ConversationState,
    conditions: &C,
) -> Option<Cow<'a, FlowStep>> {
    let next_id = select_next_step_id(current, &stack.current_context(), state, conditions);
    let step = next_id.as_deref().and_then(|id| flow.step_by_id(id));
    debug!(
        next_id = ?step.as_ref().map(|step| step.id.as_str()),
        current_id = %current.id,
        flow_id = %flow.id,
        "selected next step"
    );
    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conditions::JinjaConditions;
    use crate::core::conversation::Event;
    use crate::test_support::{
        RecordingConditions, action, branch, domain_with_slots, else_link, if_link, link_step,
        static_link,
    };
    use serde_json::json;

    fn state() -> ConversationState {
        ConversationState::new("user", &domain_with_slots(&[]))
    }

    #[test]
    fn single_static_link_skips_predicate_evaluation() {
        let step = action("a", "utter_a").with_next(vec![static_link("b")]);
        let conditions = RecordingConditions::always(true);
        let next = select_next_step_id(&step, &Map::new(), &state(), &conditions);
        assert_eq!(next.as_deref(), Some("b"));
        assert_eq!(conditions.evaluations(), 0);
        assert_eq!(conditions.renders(), 0);
    }

    #[test]
    fn first_matching_condition_wins() {
        let step = branch(
            "b",
            vec![
                if_link("l1", "l1_target"),
                if_link("l2", "l2_target"),
                if_link("l3", "l3_target"),
            ],
        );
        let conditions =
            RecordingConditions::with_results(&[("l1", false), ("l2", true), ("l3", true)]);
        let next = select_next_step_id(&step, &Map::new(), &state(), &conditions);
        assert_eq!(next.as_deref(), Some("l2_target"));
        assert_eq!(conditions.evaluated(), vec!["l1".to_string(), "l2".to_string()]);
    }

    #[test]
    fn else_link_is_fallback() {
        let step = branch("b", vec![if_link("never", "x"), else_link("fallback")]);
        let conditions = RecordingConditions::always(false);
        let next = select_next_step_id(&step, &Map::new(), &state(), &conditions);
        assert_eq!(next.as_deref(), Some("fallback"));
    }

    #[test]
    fn else_link_is_not_taken_before_conditions() {
        let step = branch("b", vec![else_link("fallback"), if_link("yes", "x")]);
        let conditions = RecordingConditions::always(true);
        let next = select_next_step_id(&step, &Map::new(), &state(), &conditions);
        assert_eq!(next.as_deref(), Some("x"));
    }

    #[test]
    fn unmatched_links_are_routing_failure() {
        let step = branch("b", vec![if_link("no", "x"), if_link("nope", "y")]);
        let conditions = RecordingConditions::always(false);
        assert_eq!(
            select_next_step_id(&step, &Map::new(), &state(), &conditions),
            None
        );
    }

    #[test]
    fn end_step_has_no_successor() {
        let conditions = RecordingConditions::always(true);
        assert_eq!(
            select_next_step_id(&FlowStep::end(), &Map::new(), &state(), &conditions),
            None
        );
    }

    #[test]
    fn link_step_continues_at_end() {
        let conditions = RecordingConditions::always(true);
        let next =
            select_next_step_id(&link_step("l", "other"), &Map::new(), &state(), &conditions);
        assert_eq!(next.as_deref(), Some(END_STEP));
    }

    #[test]
    fn other_steps_without_links_are_routing_failure() {
        let conditions = RecordingConditions::always(true);
        let step = action("a", "utter_a");
        assert_eq!(
            select_next_step_id(&step, &Map::new(), &state(), &conditions),
            None
        );
    }

    #[test]
    fn conditions_see_slots_and_context() {
        let mut state = state();
        state.update_with_events(vec![Event::slot_set("amount", json!(500))]);
        let mut context = Map::new();
        context.insert("limit".to_string(), json!(100));
        let step = branch(
            "b",
            vec![
                FlowLink::If {
                    condition: "amount > context.limit".to_string(),
                    target: "over".to_string(),
                },
                else_link("under"),
            ],
        );
        let next = select_next_step_id(&step, &context, &state, &JinjaConditions::new());
        assert_eq!(next.as_deref(), Some("over"));
    }

    #[test]
    fn select_next_step_resolves_in_flow() {
        let flow = Flow::new(
            "f",
            None,
            vec![action("a", "utter_a"), action("b", "utter_b")],
        );
        let current = flow.step_by_id("a").expect("a");
        let next = select_next_step(
            &current,
            &flow,
            &DialogueStack::default(),
            &state(),
            &JinjaConditions::new(),
        )
        .expect("next");
        assert_eq!(next.id, "b");
    }
}
