//! Response generation for `generate_response` steps.
//!
//! The [`ResponseGenerator`] trait decouples step interpretation from the
//! text backend (an LLM in production). The bundled [`TemplateResponseGenerator`]
//! renders the step prompt against the current slots; tests use scripted
//! generators.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::conversation::ConversationState;

/// Abstraction over freeform text backends.
pub trait ResponseGenerator {
    /// Produce the text for a step with the given `prompt`.
    fn generate(
        &self,
        prompt: &str,
        llm_config: Option<&Value>,
        state: &ConversationState,
    ) -> Result<String>;
}

/// Generator that renders the prompt as a template with `slots` in scope.
pub struct TemplateResponseGenerator {
    env: Environment<'static>,
}

impl TemplateResponseGenerator {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }
}

impl Default for TemplateResponseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseGenerator for TemplateResponseGenerator {
    fn generate(
        &self,
        prompt: &str,
        _llm_config: Option<&Value>,
        state: &ConversationState,
    ) -> Result<String> {
        let mut vars = Map::new();
        vars.insert(
            "slots".to_string(),
            Value::Object(state.current_slot_values()),
        );
        vars.insert(
            "sender_id".to_string(),
            Value::String(state.sender_id().to_string()),
        );
        let rendered = self
            .env
            .render_str(prompt, Value::Object(vars))
            .context("render response prompt")?;
        debug!(bytes = rendered.len(), "generated response");
        Ok(rendered.trim().to_string())
    }
}
