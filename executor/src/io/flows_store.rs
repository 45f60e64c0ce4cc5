//! Flow catalog loading with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::invariants::validate_invariants;
use crate::flows::FlowsList;

/// Embedded flow catalog schema (Draft 2020-12).
pub const FLOWS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/flows/v1.schema.json"
));

/// Load and validate a flow catalog from disk (schema + invariants).
pub fn load_flows(path: &Path) -> Result<FlowsList> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read flows {}", path.display()))?;
    parse_flows(&contents).with_context(|| format!("load flows {}", path.display()))
}

/// Parse and validate a catalog from its JSON text.
pub fn parse_flows(contents: &str) -> Result<FlowsList> {
    let value: Value = serde_json::from_str(contents).context("parse flows json")?;
    validate_schema(&value)?;
    let flows: FlowsList =
        serde_json::from_value(value).context("deserialize flows as v1 catalog")?;
    let errors = validate_invariants(&flows);
    if !errors.is_empty() {
        return Err(anyhow!("flow invariants failed: {}", errors.join("; ")));
    }
    debug!(flows = flows.len(), "loaded flow catalog");
    Ok(flows)
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(FLOWS_SCHEMA).context("parse flows schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile flows schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "flows schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
