//! Pattern frames injected by the executor itself.
//!
//! Patterns are ordinary flows (see [`default_pattern_flows`]) pushed with
//! [`StackFrameType::Pattern`]. They are triggered when a flow ends (resume an
//! interrupted flow, signal that everything is done) or when a collect step
//! needs a slot value. Pattern frames are consumed by running their own flow;
//! the executor only guarantees the push.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::conversation::{ConversationState, Event};
use crate::core::domain::ACTION_LISTEN_NAME;
use crate::core::frames::{StackFrame, StackFrameType};
use crate::core::stack::DialogueStack;
use crate::flows::{END_STEP, Flow, FlowLink, FlowStep, FlowsList, SlotRejection, StepKind};

pub const PATTERN_COLLECT_INFORMATION: &str = "pattern_collect_information";
pub const PATTERN_CONTINUE_INTERRUPTED: &str = "pattern_continue_interrupted";
pub const PATTERN_COMPLETED: &str = "pattern_completed";

/// Ends the collect pattern once the frame names the slot being collected.
const COLLECT_DONE_CONDITION: &str =
    "{{ context.collect }} is defined and {{ context.collect }} is not none";

/// Frame asking the user for `collect`.
pub fn collect_information_frame(
    collect: &str,
    utter: &str,
    rejections: &[SlotRejection],
) -> StackFrame {
    let rejections = rejections
        .iter()
        .map(|rejection| {
            let mut record = Map::new();
            record.insert("if".to_string(), Value::String(rejection.condition.clone()));
            record.insert("utter".to_string(), Value::String(rejection.utter.clone()));
            Value::Object(record)
        })
        .collect();

    let mut context = Map::new();
    context.insert("collect".to_string(), Value::String(collect.to_string()));
    context.insert("utter".to_string(), Value::String(utter.to_string()));
    context.insert("rejections".to_string(), Value::Array(rejections));
    StackFrame::new(PATTERN_COLLECT_INFORMATION, StackFrameType::Pattern).with_context(context)
}

/// Frame prompting the user back into `previous_flow_name`.
pub fn continue_interrupted_frame(previous_flow_name: &str) -> StackFrame {
    pattern_with_previous_flow(
        PATTERN_CONTINUE_INTERRUPTED,
        Value::String(previous_flow_name.to_string()),
    )
}

/// Frame signalling that the last user flow finished.
pub fn completed_frame(previous_flow_name: Option<&str>) -> StackFrame {
    let name = previous_flow_name
        .map(|name| Value::String(name.to_string()))
        .unwrap_or(Value::Null);
    pattern_with_previous_flow(PATTERN_COMPLETED, name)
}

fn pattern_with_previous_flow(flow_id: &str, previous_flow_name: Value) -> StackFrame {
    let mut context = Map::new();
    context.insert("previous_flow_name".to_string(), previous_flow_name);
    StackFrame::new(flow_id, StackFrameType::Pattern).with_context(context)
}

/// Push a continue-interrupted frame if `ended` interrupted a user flow that
/// is still unfinished.
///
/// `ended` has already been popped; `stack` is the remaining stack.
pub fn trigger_pattern_continue_interrupted(
    ended: &StackFrame,
    stack: &mut DialogueStack,
    flows: &FlowsList,
) {
    if !ended.is_user_flow() || ended.frame_type != StackFrameType::Interrupt {
        return;
    }
    let (previous_step, previous_flow) = stack.topmost_user_frame(flows);
    let (Some(previous_step), Some(previous_flow)) = (previous_step, previous_flow) else {
        return;
    };
    if previous_step.is_end_of_flow() {
        return;
    }
    debug!(
        previous_flow_id = %previous_flow.id,
        "pushing continue interrupted pattern"
    );
    stack.push(continue_interrupted_frame(previous_flow.readable_name()));
}

/// Push a completed frame if `ended` was the last user flow on the stack.
pub fn trigger_pattern_completed(ended: &StackFrame, stack: &mut DialogueStack, flows: &FlowsList) {
    if !stack.is_empty() || !ended.is_user_flow() {
        return;
    }
    let name = flows.flow_by_id(&ended.flow_id).map(Flow::readable_name);
    debug!(completed_flow_id = %ended.flow_id, "pushing completed pattern");
    stack.push(completed_frame(name));
}

/// Push a collect-information frame for `collect`.
pub fn trigger_pattern_ask_collect_information(
    collect: &str,
    stack: &mut DialogueStack,
    rejections: &[SlotRejection],
    utter: &str,
) {
    stack.push(collect_information_frame(collect, utter, rejections));
}

/// Reset the slots scoped to `flow` after it ended.
///
/// Collect steps reset their slot unless they opted out. Slots written by
/// set-slots steps reset too, except when a collect step for the same slot
/// opted out.
pub fn reset_scoped_slots(flow: &Flow, state: &ConversationState) -> Vec<Event> {
    let mut events = Vec::new();
    let mut keep: HashSet<&str> = HashSet::new();

    for step in flow.steps() {
        if let StepKind::Collect {
            collect,
            reset_after_flow_ends,
            ..
        } = &step.kind
        {
            if *reset_after_flow_ends {
                events.push(reset_slot(collect, state));
            } else {
                keep.insert(collect.as_str());
            }
        }
    }

    for step in flow.steps() {
        if let StepKind::SetSlots { slots } = &step.kind {
            for slot in slots {
                if !keep.contains(slot.key.as_str()) {
                    events.push(reset_slot(&slot.key, state));
                }
            }
        }
    }

    events
}

fn reset_slot(name: &str, state: &ConversationState) -> Event {
    Event::slot_set(name, state.initial_value(name))
}

/// Built-in pattern flows. User flows with the same id take precedence.
pub fn default_pattern_flows() -> FlowsList {
    let collect = Flow::new(
        PATTERN_COLLECT_INFORMATION,
        Some("pattern collect information".to_string()),
        vec![
            FlowStep::new("start", StepKind::Branch).with_next(vec![
                FlowLink::If {
                    condition: COLLECT_DONE_CONDITION.to_string(),
                    target: END_STEP.to_string(),
                },
                FlowLink::Else {
                    target: "ask_collect".to_string(),
                },
            ]),
            FlowStep::new(
                "ask_collect",
                StepKind::Action {
                    action: Some("{{ context.utter }}".to_string()),
                },
            ),
            FlowStep::new(
                "listen",
                StepKind::Action {
                    action: Some(ACTION_LISTEN_NAME.to_string()),
                },
            )
            .with_next(vec![FlowLink::Static {
                target: "start".to_string(),
            }]),
        ],
    );

    let continue_interrupted = Flow::new(
        PATTERN_CONTINUE_INTERRUPTED,
        Some("pattern continue interrupted".to_string()),
        vec![FlowStep::new(
            "utter_continue",
            StepKind::Action {
                action: Some("utter_flow_continue_interrupted".to_string()),
            },
        )],
    );

    let completed = Flow::new(
        PATTERN_COMPLETED,
        Some("pattern completed".to_string()),
        Vec::new(),
    );

    FlowsList::new(vec![collect, continue_interrupted, completed])
}

impl FlowsList {
    /// This catalog plus any built-in pattern flow it does not override.
    pub fn with_default_patterns(self) -> Self {
        self.merge(default_pattern_flows())
    }
}
