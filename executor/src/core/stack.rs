//! The dialogue stack: flows in progress, topmost active.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::conversation::{ConversationState, Event};
use crate::core::frames::StackFrame;
use crate::error::FlowError;
use crate::flows::{Flow, FlowStep, FlowsList};

/// Slot that persists the stack inside conversation state.
pub const DIALOGUE_STACK_SLOT: &str = "dialogue_stack";

/// Where [`DialogueStack::push_at`] inserts a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPosition {
    Top,
    /// Directly below the current top, so the top frame finishes first.
    BelowTop,
}

/// Ordered frames; the last element is the top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogueStack {
    frames: Vec<StackFrame>,
}

impl DialogueStack {
    pub fn new(frames: Vec<StackFrame>) -> Self {
        Self { frames }
    }

    /// Rebuild a stack from its persisted records.
    pub fn from_records(records: Vec<StackFrame>) -> Self {
        Self::new(records)
    }

    /// Flat, serializable form of the stack (bottom first).
    pub fn as_records(&self) -> Vec<StackFrame> {
        self.frames.clone()
    }

    /// Parse the persisted JSON form. `null` means an empty stack.
    pub fn from_value(value: &Value) -> Result<Self, FlowError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let records: Vec<StackFrame> = serde_json::from_value(value.clone())
            .map_err(|err| FlowError::InvalidStack(err.to_string()))?;
        Ok(Self::from_records(records))
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.frames.iter().map(StackFrame::to_record).collect())
    }

    /// Read the stack from its reserved slot.
    pub fn from_state(state: &ConversationState) -> Result<Self, FlowError> {
        match state.slot_value(DIALOGUE_STACK_SLOT) {
            Some(value) => Self::from_value(value),
            None => Ok(Self::default()),
        }
    }

    /// The single event that persists this stack.
    pub fn persist_as_event(&self) -> Event {
        Event::SlotSet {
            key: DIALOGUE_STACK_SLOT.to_string(),
            value: self.to_value(),
        }
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn push_at(&mut self, frame: StackFrame, position: StackPosition) {
        match position {
            StackPosition::Top => self.frames.push(frame),
            StackPosition::BelowTop => {
                let index = self.frames.len().saturating_sub(1);
                self.frames.insert(index, frame);
            }
        }
    }

    /// Replace the top frame (pop if present, then push).
    pub fn update(&mut self, frame: StackFrame) {
        if !self.is_empty() {
            self.pop();
        }
        self.push(frame);
    }

    /// Move the top frame's cursor to `step_id`.
    pub fn advance_top_flow(&mut self, step_id: &str) {
        if let Some(top) = self.frames.last_mut() {
            top.step_id = step_id.to_string();
        }
    }

    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn top_flow<'a>(&self, flows: &'a FlowsList) -> Option<&'a Flow> {
        flows.flow_by_id(&self.top()?.flow_id)
    }

    /// The nearest frame (scanning from the top) that belongs to a user flow.
    pub fn top_user_frame(&self) -> Option<&StackFrame> {
        self.frames.iter().rev().find(|frame| frame.is_user_flow())
    }

    /// Cursor step and flow of the nearest user-flow frame.
    pub fn topmost_user_frame<'a>(
        &self,
        flows: &'a FlowsList,
    ) -> (Option<Cow<'a, FlowStep>>, Option<&'a Flow>) {
        let Some(frame) = self.top_user_frame() else {
            return (None, None);
        };
        let flow = flows.flow_by_id(&frame.flow_id);
        let step = flow.and_then(|flow| flow.step_by_id(&frame.step_id));
        (step, flow)
    }

    /// Context of the top frame, empty when there is none.
    pub fn current_context(&self) -> Map<String, Value> {
        self.top()
            .and_then(|frame| frame.context.clone())
            .unwrap_or_default()
    }
}
