//! Conversation state: an append-only event log with a derived slot view.
//!
//! Slot values are never written directly. Every change is an [`Event`], and
//! the slot map is recomputed by replaying events over the domain's slot
//! definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::domain::Domain;
use crate::core::stack::DIALOGUE_STACK_SLOT;

/// Something that happened in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SlotSet { key: String, value: Value },
    ActionExecuted { action_name: String },
    UserUttered { text: String },
}

impl Event {
    pub fn slot_set(key: impl Into<String>, value: Value) -> Self {
        Event::SlotSet {
            key: key.into(),
            value,
        }
    }
}

/// Current value of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub initial_value: Value,
    pub value: Value,
    /// True once any `SlotSet` touched the slot, even a reset.
    pub has_been_set: bool,
}

impl Slot {
    fn new(initial_value: Value) -> Self {
        Self {
            value: initial_value.clone(),
            initial_value,
            has_been_set: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    sender_id: String,
    events: Vec<Event>,
    slots: BTreeMap<String, Slot>,
}

impl ConversationState {
    /// Fresh state with every domain slot at its initial value.
    pub fn new(sender_id: impl Into<String>, domain: &Domain) -> Self {
        let mut slots: BTreeMap<String, Slot> = domain
            .slots
            .iter()
            .map(|(name, def)| (name.clone(), Slot::new(def.initial_value.clone())))
            .collect();
        slots
            .entry(DIALOGUE_STACK_SLOT.to_string())
            .or_insert_with(|| Slot::new(Value::Null));
        Self {
            sender_id: sender_id.into(),
            events: Vec::new(),
            slots,
        }
    }

    /// Rebuild state by replaying `events`.
    pub fn from_events(sender_id: impl Into<String>, domain: &Domain, events: Vec<Event>) -> Self {
        let mut state = Self::new(sender_id, domain);
        state.update_with_events(events);
        state
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Append events and apply them to the slot view.
    pub fn update_with_events(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.apply(&event);
            self.events.push(event);
        }
    }

    fn apply(&mut self, event: &Event) {
        if let Event::SlotSet { key, value } = event {
            let slot = self
                .slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(Value::Null));
            slot.value = value.clone();
            slot.has_been_set = true;
        }
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn slot_value(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|slot| &slot.value)
    }

    /// Initial value of `name`, or null for unknown slots.
    pub fn initial_value(&self, name: &str) -> Value {
        self.slots
            .get(name)
            .map(|slot| slot.initial_value.clone())
            .unwrap_or(Value::Null)
    }

    /// All user-visible slot values (the stack slot is excluded).
    pub fn current_slot_values(&self) -> Map<String, Value> {
        self.slots
            .iter()
            .filter(|(name, _)| name.as_str() != DIALOGUE_STACK_SLOT)
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }
}
