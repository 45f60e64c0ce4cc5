//! In-memory flow graph model.
//!
//! Flows arrive as JSON definitions and are normalized on load: a synthetic
//! [`START_STEP`] is prepended, a synthetic [`END_STEP`] is appended, and steps
//! without outgoing links fall through to the next declared step. The runtime
//! never mutates a flow after it has been loaded.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Id of the synthetic first step of every flow.
pub const START_STEP: &str = "START";
/// Id of the synthetic terminal step of every flow.
pub const END_STEP: &str = "END";
/// Prefix of synthetic "continue at" steps (`NEXT:<target>`).
pub const CONTINUE_STEP_PREFIX: &str = "NEXT:";

/// One outgoing edge of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowLink {
    /// Unconditional transition.
    Static { target: String },
    /// Transition taken when `condition` evaluates to true.
    If { condition: String, target: String },
    /// Fallback, considered only after every `If` link failed.
    Else { target: String },
}

impl FlowLink {
    pub fn target(&self) -> &str {
        match self {
            FlowLink::Static { target }
            | FlowLink::If { target, .. }
            | FlowLink::Else { target } => target,
        }
    }
}

/// A rejection rule attached to a collect step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRejection {
    #[serde(rename = "if")]
    pub condition: String,
    pub utter: String,
}

/// One `key = value` pair of a set-slots step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub key: String,
    pub value: Value,
}

/// Step kinds. Dispatch over this enum is exhaustive in the step interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Synthetic entry point. Never declared in a flow file.
    #[serde(skip)]
    Start,
    /// Synthetic terminal step. Never declared in a flow file.
    #[serde(skip)]
    End,
    /// Synthetic `NEXT:<target>` step.
    #[serde(skip)]
    Continue,
    Action {
        #[serde(default)]
        action: Option<String>,
    },
    Collect {
        collect: String,
        #[serde(default)]
        utter: Option<String>,
        #[serde(default)]
        rejections: Vec<SlotRejection>,
        #[serde(default)]
        ask_before_filling: bool,
        #[serde(default = "default_true")]
        reset_after_flow_ends: bool,
    },
    SetSlots {
        slots: Vec<SlotAssignment>,
    },
    Branch,
    Link {
        link: String,
    },
    GenerateResponse {
        prompt: String,
        #[serde(default)]
        llm_config: Option<Value>,
    },
}

fn default_true() -> bool {
    true
}

impl StepKind {
    /// Short, stable name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Start => "start",
            StepKind::End => "end",
            StepKind::Continue => "continue",
            StepKind::Action { .. } => "action",
            StepKind::Collect { .. } => "collect",
            StepKind::SetSlots { .. } => "set_slots",
            StepKind::Branch => "branch",
            StepKind::Link { .. } => "link",
            StepKind::GenerateResponse { .. } => "generate_response",
        }
    }
}

/// A node of a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub next: Vec<FlowLink>,
}

impl FlowStep {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            next: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: Vec<FlowLink>) -> Self {
        self.next = next;
        self
    }

    /// The terminal step shared by every flow.
    pub fn end() -> Self {
        Self::new(END_STEP, StepKind::End)
    }

    fn start(first: &str) -> Self {
        Self::new(START_STEP, StepKind::Start).with_next(vec![FlowLink::Static {
            target: first.to_string(),
        }])
    }

    fn continue_to(target: &str) -> Self {
        Self::new(continue_step_id(target), StepKind::Continue).with_next(vec![FlowLink::Static {
            target: target.to_string(),
        }])
    }

    pub fn is_end_of_flow(&self) -> bool {
        self.id == END_STEP || self.id == continue_step_id(END_STEP)
    }
}

/// Id of the synthetic step that continues at `target`.
pub fn continue_step_id(target: &str) -> String {
    format!("{CONTINUE_STEP_PREFIX}{target}")
}

/// Returns true if `id` is reserved for synthetic steps.
pub fn is_reserved_step_id(id: &str) -> bool {
    id == START_STEP || id == END_STEP || id.starts_with(CONTINUE_STEP_PREFIX)
}

/// Flow as declared in a catalog file, before normalization.
#[derive(Debug, Clone, Deserialize)]
struct FlowDefinition {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    steps: Vec<FlowStep>,
}

/// A normalized, immutable flow graph.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "FlowDefinition")]
pub struct Flow {
    pub id: String,
    pub name: Option<String>,
    steps: Vec<FlowStep>,
}

impl From<FlowDefinition> for Flow {
    fn from(def: FlowDefinition) -> Self {
        Flow::new(def.id, def.name, def.steps)
    }
}

impl Flow {
    /// Build a flow from its declared steps, adding `START`/`END` and
    /// fall-through links.
    pub fn new(id: impl Into<String>, name: Option<String>, declared: Vec<FlowStep>) -> Self {
        let first = declared
            .first()
            .map(|step| step.id.clone())
            .unwrap_or_else(|| END_STEP.to_string());

        let mut steps = Vec::with_capacity(declared.len() + 2);
        steps.push(FlowStep::start(&first));

        let following: Vec<String> = declared
            .iter()
            .skip(1)
            .map(|step| step.id.clone())
            .chain(std::iter::once(END_STEP.to_string()))
            .collect();
        for (mut step, fallthrough) in declared.into_iter().zip(following) {
            let is_link = matches!(step.kind, StepKind::Link { .. });
            if step.next.is_empty() && !is_link {
                step.next = vec![FlowLink::Static {
                    target: fallthrough,
                }];
            }
            steps.push(step);
        }
        steps.push(FlowStep::end());

        Self {
            id: id.into(),
            name,
            steps,
        }
    }

    /// All steps including the synthetic `START` and `END`.
    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    /// Steps as declared by the flow author.
    pub fn declared_steps(&self) -> impl Iterator<Item = &FlowStep> {
        self.steps
            .iter()
            .filter(|step| !matches!(step.kind, StepKind::Start | StepKind::End))
    }

    /// Look up a step. `NEXT:<id>` ids resolve to a synthetic continue step.
    pub fn step_by_id(&self, id: &str) -> Option<Cow<'_, FlowStep>> {
        if let Some(target) = id.strip_prefix(CONTINUE_STEP_PREFIX) {
            return self
                .steps
                .iter()
                .any(|step| step.id == target)
                .then(|| Cow::Owned(FlowStep::continue_to(target)));
        }
        self.steps
            .iter()
            .find(|step| step.id == id)
            .map(Cow::Borrowed)
    }

    /// Human-readable name, falling back to the id.
    pub fn readable_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.id,
        }
    }
}

/// Id-keyed flow catalog, read-only for the duration of a turn.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FlowsList {
    flows: Vec<Flow>,
}

impl FlowsList {
    pub fn new(flows: Vec<Flow>) -> Self {
        Self { flows }
    }

    pub fn flow_by_id(&self, id: &str) -> Option<&Flow> {
        self.flows.iter().find(|flow| flow.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.flows.iter()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Merge `other` into this list. Flows already present keep precedence.
    pub fn merge(mut self, other: FlowsList) -> Self {
        for flow in other.flows {
            if self.flow_by_id(&flow.id).is_none() {
                self.flows.push(flow);
            }
        }
        self
    }
}
