//! Semantic catalog invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::flows::{END_STEP, Flow, FlowsList, StepKind, is_reserved_step_id};

/// Check semantic invariants of a flow catalog:
/// - No duplicate flow ids
/// - No duplicate step ids within a flow
/// - No declared step uses a reserved id (`START`, `END`, `NEXT:*`)
/// - Every link targets a declared step of the same flow or `END`
/// - Every link step names a flow of the catalog
pub fn validate_invariants(flows: &FlowsList) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for flow in flows.iter() {
        if !seen.insert(flow.id.as_str()) {
            errors.push(format!("duplicate flow id '{}'", flow.id));
        }
        validate_flow(flow, flows, &mut errors);
    }
    errors
}

fn validate_flow(flow: &Flow, flows: &FlowsList, errors: &mut Vec<String>) {
    let mut step_ids = HashSet::new();
    for step in flow.declared_steps() {
        if is_reserved_step_id(&step.id) {
            errors.push(format!("{}: step id '{}' is reserved", flow.id, step.id));
        }
        if !step_ids.insert(step.id.as_str()) {
            errors.push(format!("{}: duplicate step id '{}'", flow.id, step.id));
        }
    }

    for step in flow.declared_steps() {
        for link in &step.next {
            let target = link.target();
            if target != END_STEP && !step_ids.contains(target) {
                errors.push(format!(
                    "{}/{}: link target '{}' does not exist",
                    flow.id, step.id, target
                ));
            }
        }
        let StepKind::Link { link } = &step.kind else {
            continue;
        };
        if flows.flow_by_id(link).is_none() {
            errors.push(format!(
                "{}/{}: linked flow '{}' does not exist",
                flow.id, step.id, link
            ));
        }
    }
}
