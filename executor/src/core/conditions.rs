//! Template rendering and predicate evaluation for flow conditions.
//!
//! The [`ConditionEvaluator`] trait is the seam to the expression engine.
//! [`JinjaConditions`] implements it with minijinja: templates use the
//! regular `{{ ... }}` syntax and predicates are minijinja expressions such as
//! `amount > 100 and context.collect is defined`.

use anyhow::Result;
use minijinja::Environment;
use serde_json::{Map, Value};
use tracing::error;

use crate::core::conversation::ConversationState;

/// Pure template/predicate collaborator.
pub trait ConditionEvaluator {
    /// Render `text` as a template against `vars`.
    fn render(&self, text: &str, vars: &Value) -> Result<String>;

    /// Evaluate a rendered boolean expression against `document`.
    fn evaluate(&self, expression: &str, document: &Value) -> Result<bool>;
}

/// minijinja-backed evaluator with lenient undefined handling.
pub struct JinjaConditions {
    env: Environment<'static>,
}

impl JinjaConditions {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }
}

impl Default for JinjaConditions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator for JinjaConditions {
    fn render(&self, text: &str, vars: &Value) -> Result<String> {
        Ok(self.env.render_str(text, vars)?)
    }

    fn evaluate(&self, expression: &str, document: &Value) -> Result<bool> {
        let compiled = self.env.compile_expression(expression)?;
        Ok(compiled.eval(document)?.is_true())
    }
}

/// Template variables exposing a frame context as `context`.
pub fn context_vars(context: &Map<String, Value>) -> Value {
    let mut vars = Map::new();
    vars.insert("context".to_string(), Value::Object(context.clone()));
    Value::Object(vars)
}

/// Render `text` against `{context: ...}`.
pub fn render_template_variables<C: ConditionEvaluator + ?Sized>(
    conditions: &C,
    text: &str,
    context: &Map<String, Value>,
) -> Result<String> {
    conditions.render(text, &context_vars(context))
}

/// Evaluate a link predicate.
///
/// The predicate is rendered against the frame context first. The resulting
/// expression sees every current slot value plus the context under
/// `context`, which wins over a slot of the same name. Failures are logged and
/// count as `false`.
pub fn is_condition_satisfied<C: ConditionEvaluator + ?Sized>(
    conditions: &C,
    predicate: &str,
    context: &Map<String, Value>,
    state: &ConversationState,
) -> bool {
    let vars = context_vars(context);
    let mut document = state.current_slot_values();
    document.insert("context".to_string(), Value::Object(context.clone()));
    let document = Value::Object(document);

    let result = conditions
        .render(predicate, &vars)
        .and_then(|rendered| conditions.evaluate(&rendered, &document));
    match result {
        Ok(satisfied) => satisfied,
        Err(err) => {
            error!(
                predicate,
                document = %document,
                error = %err,
                "flow predicate failed to evaluate"
            );
            false
        }
    }
}
