//! Flow executor CLI.
//!
//! Validates flow catalogs, starts flows on a stored conversation and runs
//! single turns, printing the predicted action as JSON.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use executor::core::conditions::JinjaConditions;
use executor::core::conversation::Event;
use executor::core::frames::{StackFrame, StackFrameType};
use executor::core::stack::DialogueStack;
use executor::error::FlowError;
use executor::exit_codes;
use executor::io::config::load_config;
use executor::io::domain_store::load_domain;
use executor::io::flows_store::load_flows;
use executor::io::generator::TemplateResponseGenerator;
use executor::io::state_store::{StoredConversation, load_state, write_conversation};
use executor::logging;
use executor::turn::advance_flows;

const DEFAULT_SENDER: &str = "default";

#[derive(Parser)]
#[command(
    name = "executor",
    version,
    about = "Stack-based executor for conversational flows"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a flow catalog against the schema and invariants.
    Validate {
        #[arg(long)]
        flows: PathBuf,
    },
    /// Push a flow onto the dialogue stack of a stored conversation.
    Start {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        flow_id: String,
        /// Catalog to check the flow id against.
        #[arg(long)]
        flows: Option<PathBuf>,
        /// Frame type of the new frame.
        #[arg(long, default_value = "regular", value_parser = parse_frame_type)]
        frame_type: StackFrameType,
        #[arg(long, default_value = "domain.toml")]
        domain: PathBuf,
    },
    /// Run one turn and print the predicted action.
    Advance {
        #[arg(long)]
        flows: PathBuf,
        #[arg(long, default_value = "domain.toml")]
        domain: PathBuf,
        #[arg(long)]
        state: PathBuf,
        /// Slot values to record before the turn (`key=value`, value as JSON
        /// or plain text).
        #[arg(long = "slot", value_parser = parse_slot)]
        slots: Vec<(String, Value)>,
        /// Append the turn's events and the executed action to the state file.
        #[arg(long)]
        commit: bool,
        #[arg(long, default_value = "executor.toml")]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FlowError>() {
        Some(FlowError::CircuitBreakerTripped { .. }) => exit_codes::CIRCUIT_BREAKER,
        Some(flow_err) if flow_err.is_interpretation_error() => exit_codes::INTERPRETATION,
        _ => exit_codes::INVALID,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { flows } => cmd_validate(&flows),
        Command::Start {
            state,
            flow_id,
            flows,
            frame_type,
            domain,
        } => cmd_start(&state, &flow_id, flows.as_deref(), frame_type, &domain),
        Command::Advance {
            flows,
            domain,
            state,
            slots,
            commit,
            config,
        } => cmd_advance(&flows, &domain, &state, slots, commit, &config),
    }
}

fn cmd_validate(flows_path: &Path) -> Result<()> {
    let flows = load_flows(flows_path)?;
    println!("{} flows valid", flows.len());
    Ok(())
}

fn cmd_start(
    state_path: &Path,
    flow_id: &str,
    flows_path: Option<&Path>,
    frame_type: StackFrameType,
    domain_path: &Path,
) -> Result<()> {
    if let Some(flows_path) = flows_path {
        let flows = load_flows(flows_path)?.with_default_patterns();
        if flows.flow_by_id(flow_id).is_none() {
            return Err(anyhow!("unknown flow '{flow_id}' in {}", flows_path.display()));
        }
    }
    let domain = load_domain(domain_path)?;
    let mut state = load_state(state_path, &domain, DEFAULT_SENDER)?;

    let mut stack = DialogueStack::from_state(&state)?;
    stack.push(StackFrame::new(flow_id, frame_type));
    state.update_with_events([stack.persist_as_event()]);

    write_conversation(state_path, &StoredConversation::from_state(&state))?;
    info!(flow_id, frame_type = frame_type.as_str(), "flow started");
    Ok(())
}

fn cmd_advance(
    flows_path: &Path,
    domain_path: &Path,
    state_path: &Path,
    slots: Vec<(String, Value)>,
    commit: bool,
    config_path: &Path,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut flows = load_flows(flows_path)?;
    if config.include_default_patterns {
        flows = flows.with_default_patterns();
    }
    let domain = load_domain(domain_path)?;
    let mut state = load_state(state_path, &domain, DEFAULT_SENDER)?;
    state.update_with_events(
        slots
            .into_iter()
            .map(|(key, value)| Event::slot_set(key, value)),
    );

    let prediction = advance_flows(
        &state,
        &domain,
        &flows,
        &JinjaConditions::new(),
        &TemplateResponseGenerator::new(),
        &config.turn_config(),
    )?;

    let payload = serde_json::to_string_pretty(&prediction).context("serialize prediction")?;
    println!("{payload}");

    if commit {
        state.update_with_events(prediction.events);
        if let Some(action_name) = prediction.action_name {
            state.update_with_events([Event::ActionExecuted { action_name }]);
        }
        write_conversation(state_path, &StoredConversation::from_state(&state))?;
        info!(events = state.events().len(), "turn committed");
    }
    Ok(())
}

fn parse_frame_type(raw: &str) -> Result<StackFrameType> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| anyhow!("unknown frame type '{raw}'"))
}

/// Parse `key=value`; the value is JSON when it parses as JSON, text otherwise.
fn parse_slot(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("slot name must not be empty"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
