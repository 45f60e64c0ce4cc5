//! Assistant domain: what the executor may predict and which slots exist.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wait for the next user message.
pub const ACTION_LISTEN_NAME: &str = "action_listen";
/// Send freeform text carried in prediction metadata.
pub const ACTION_SEND_TEXT_NAME: &str = "action_send_text";
/// Run the rejection rules of the slot being collected.
pub const ACTION_RUN_SLOT_REJECTIONS_NAME: &str = "action_run_slot_rejections";

/// Actions every assistant can predict.
pub const DEFAULT_ACTIONS: &[&str] = &[
    ACTION_LISTEN_NAME,
    ACTION_SEND_TEXT_NAME,
    ACTION_RUN_SLOT_REJECTIONS_NAME,
];

/// Responses used by the built-in pattern flows.
pub const DEFAULT_RESPONSES: &[&str] = &[
    "utter_flow_continue_interrupted",
    "utter_can_do_something_else",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotDefinition {
    pub initial_value: Value,
}

/// Domain definition (TOML).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Domain {
    pub actions: Vec<String>,
    pub responses: Vec<String>,
    pub slots: BTreeMap<String, SlotDefinition>,
}

impl Domain {
    /// Every action name or response the executor is allowed to predict.
    pub fn action_names_or_texts(&self) -> BTreeSet<String> {
        DEFAULT_ACTIONS
            .iter()
            .chain(DEFAULT_RESPONSES)
            .map(|name| name.to_string())
            .chain(self.actions.iter().cloned())
            .chain(self.responses.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_include_defaults_and_declared() {
        let domain = Domain {
            actions: vec!["action_transfer".to_string()],
            responses: vec!["utter_ask_amount".to_string()],
            slots: BTreeMap::new(),
        };
        let names = domain.action_names_or_texts();
        for expected in [
            ACTION_LISTEN_NAME,
            ACTION_SEND_TEXT_NAME,
            "utter_can_do_something_else",
            "action_transfer",
            "utter_ask_amount",
        ] {
            assert!(names.contains(expected), "missing {expected}");
        }
        assert!(!names.contains("action_unknown"));
    }

    #[test]
    fn parses_from_toml() {
        let domain: Domain = toml::from_str(
            r#"
actions = ["action_check_balance"]
responses = ["utter_ask_amount"]

[slots.amount]
initial_value = 0

[slots.recipient]
"#,
        )
        .expect("parse domain");
        assert_eq!(domain.slots["amount"].initial_value, serde_json::json!(0));
        assert_eq!(domain.slots["recipient"].initial_value, Value::Null);
    }
}
