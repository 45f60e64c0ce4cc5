//! Conversation state persistence (`state.json`).
//!
//! Only the sender id and the event log are stored; slot values are
//! recomputed from the domain on load.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::conversation::{ConversationState, Event};
use crate::core::domain::Domain;
use crate::io::config::write_atomic;

/// On-disk form of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    pub sender_id: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl StoredConversation {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            events: Vec::new(),
        }
    }

    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            sender_id: state.sender_id().to_string(),
            events: state.events().to_vec(),
        }
    }

    /// Replay the stored events over `domain`.
    pub fn into_state(self, domain: &Domain) -> ConversationState {
        ConversationState::from_events(self.sender_id, domain, self.events)
    }
}

/// Load a stored conversation.
///
/// If the file is missing, returns an empty conversation for `default_sender`.
pub fn load_conversation(path: &Path, default_sender: &str) -> Result<StoredConversation> {
    if !path.exists() {
        return Ok(StoredConversation::new(default_sender));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Load a conversation and rebuild its state over `domain`.
pub fn load_state(path: &Path, domain: &Domain, default_sender: &str) -> Result<ConversationState> {
    Ok(load_conversation(path, default_sender)?.into_state(domain))
}

/// Atomically write a conversation to disk (temp file + rename).
pub fn write_conversation(path: &Path, conversation: &StoredConversation) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(conversation).context("serialize state json")?;
    buf.push('\n');
    write_atomic(path, &buf, "json.tmp")
}
