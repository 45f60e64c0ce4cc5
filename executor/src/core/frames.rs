//! Dialogue stack frames.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::flows::START_STEP;

/// Why a frame sits on the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackFrameType {
    /// The flow interrupted the flow below it and may span multiple turns.
    Interrupt,
    /// A short interruption; the flow below resumes right after it.
    Remark,
    /// The flow below linked to this one.
    Link,
    /// The flow below was corrected by this one.
    Correction,
    /// Any other user flow.
    #[default]
    Regular,
    /// Marker telling the docsearch policy to act.
    Docsearch,
    /// Marker telling the intentless policy to act.
    Intentless,
    /// A system-injected pattern flow.
    Pattern,
}

impl StackFrameType {
    /// Frame types filled by user-defined flows.
    pub fn is_user_flow(self) -> bool {
        matches!(self, Self::Regular | Self::Link | Self::Interrupt)
    }

    /// Frame types the flow executor advances. Docsearch and intentless
    /// markers belong to other policies.
    pub fn is_flow(self) -> bool {
        !matches!(self, Self::Docsearch | Self::Intentless)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::Remark => "remark",
            Self::Link => "link",
            Self::Correction => "correction",
            Self::Regular => "regular",
            Self::Docsearch => "docsearch",
            Self::Intentless => "intentless",
            Self::Pattern => "pattern",
        }
    }
}

fn default_step_id() -> String {
    START_STEP.to_string()
}

/// A `null` frame type in a persisted record means `regular`.
fn frame_type_or_regular<'de, D>(deserializer: D) -> Result<StackFrameType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StackFrameType>::deserialize(deserializer)?.unwrap_or_default())
}

/// One activation of a flow: identity, cursor, kind, and local context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub flow_id: String,
    #[serde(default = "default_step_id")]
    pub step_id: String,
    #[serde(default, deserialize_with = "frame_type_or_regular")]
    pub frame_type: StackFrameType,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

impl StackFrame {
    /// A frame positioned at the start of `flow_id`.
    pub fn new(flow_id: impl Into<String>, frame_type: StackFrameType) -> Self {
        Self {
            flow_id: flow_id.into(),
            step_id: default_step_id(),
            frame_type,
            context: None,
        }
    }

    pub fn regular(flow_id: impl Into<String>) -> Self {
        Self::new(flow_id, StackFrameType::Regular)
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = step_id.into();
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_user_flow(&self) -> bool {
        self.frame_type.is_user_flow()
    }

    /// The persisted record of this frame.
    pub fn to_record(&self) -> Value {
        let mut record = Map::new();
        record.insert("flow_id".to_string(), Value::String(self.flow_id.clone()));
        record.insert("step_id".to_string(), Value::String(self.step_id.clone()));
        record.insert(
            "frame_type".to_string(),
            Value::String(self.frame_type.as_str().to_string()),
        );
        record.insert(
            "context".to_string(),
            self.context.clone().map(Value::Object).unwrap_or(Value::Null),
        );
        Value::Object(record)
    }
}
