//! CLI tests for the executor binary.
//!
//! Spawns the binary against files in a temp directory and verifies exit
//! codes, printed predictions and committed state.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use executor::core::conversation::Event;
use executor::core::domain::ACTION_LISTEN_NAME;
use executor::core::stack::DialogueStack;
use executor::exit_codes;
use executor::io::state_store::load_conversation;
use serde_json::{Value, json};

const FLOWS: &str = r#"{"flows": [
    {"id": "transfer", "name": "transfer money", "steps": [
        {"id": "greet", "type": "action", "action": "utter_greet"},
        {"id": "check", "type": "branch", "next": [
            {"kind": "if", "condition": "amount > 100", "target": "big"},
            {"kind": "else", "target": "END"}]},
        {"id": "big", "type": "action", "action": "utter_big"}]},
    {"id": "spin", "steps": [
        {"id": "loop", "type": "branch", "next": [{"kind": "static", "target": "loop"}]}]},
    {"id": "broken", "steps": [{"id": "nothing", "type": "action"}]}
]}"#;

const DOMAIN: &str = r#"
actions = ["utter_greet", "utter_big"]

[slots.amount]
initial_value = 0
"#;

fn executor(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_executor"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run executor")
}

fn workspace() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("flows.json"), FLOWS).expect("write flows");
    fs::write(temp.path().join("domain.toml"), DOMAIN).expect("write domain");
    temp
}

fn start(dir: &Path, flow_id: &str) {
    let output = executor(
        dir,
        &["start", "--state", "state.json", "--flow-id", flow_id],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
}

fn advance(dir: &Path, extra: &[&str]) -> Output {
    let mut args = vec!["advance", "--flows", "flows.json", "--state", "state.json"];
    args.extend_from_slice(extra);
    executor(dir, &args)
}

fn prediction(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("prediction json")
}

#[test]
fn validate_accepts_catalog_and_rejects_dangling_links() {
    let temp = workspace();
    let ok = executor(temp.path(), &["validate", "--flows", "flows.json"]);
    assert_eq!(ok.status.code(), Some(exit_codes::OK));

    fs::write(
        temp.path().join("bad.json"),
        r#"{"flows": [{"id": "f", "steps": [
            {"id": "a", "type": "branch", "next": [{"kind": "else", "target": "missing"}]}]}]}"#,
    )
    .expect("write bad flows");
    let bad = executor(temp.path(), &["validate", "--flows", "bad.json"]);
    assert_eq!(bad.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&bad.stderr).contains("link target 'missing'"));
}

#[test]
fn advance_without_flow_predicts_nothing() {
    let temp = workspace();
    let output = advance(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let value = prediction(&output);
    assert_eq!(value["action_name"], Value::Null);
    assert_eq!(value["confidence"], json!(0.0));
}

#[test]
fn committed_turns_walk_through_a_flow() {
    let temp = workspace();
    start(temp.path(), "transfer");

    let first = advance(temp.path(), &["--commit"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK), "{first:?}");
    assert_eq!(prediction(&first)["action_name"], json!("utter_greet"));

    let second = advance(temp.path(), &["--slot", "amount=500", "--commit"]);
    assert_eq!(second.status.code(), Some(exit_codes::OK), "{second:?}");
    assert_eq!(prediction(&second)["action_name"], json!("utter_big"));

    let stored = load_conversation(&temp.path().join("state.json"), "unused").expect("load");
    assert!(stored.events.contains(&Event::slot_set("amount", json!(500))));
    assert!(stored.events.contains(&Event::ActionExecuted {
        action_name: "utter_big".to_string()
    }));

    let last = advance(temp.path(), &["--commit"]);
    assert_eq!(prediction(&last)["action_name"], json!(ACTION_LISTEN_NAME));
    let stored = load_conversation(&temp.path().join("state.json"), "unused").expect("load");
    assert!(stored.events.contains(&DialogueStack::default().persist_as_event()));
}

#[test]
fn advance_without_commit_leaves_state_untouched() {
    let temp = workspace();
    start(temp.path(), "transfer");
    let before = fs::read_to_string(temp.path().join("state.json")).expect("read state");

    let output = advance(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let after = fs::read_to_string(temp.path().join("state.json")).expect("read state");
    assert_eq!(before, after);
}

#[test]
fn cyclic_flow_exits_with_circuit_breaker_code() {
    let temp = workspace();
    start(temp.path(), "spin");
    let output = advance(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::CIRCUIT_BREAKER));
    assert!(String::from_utf8_lossy(&output.stderr).contains("circuit breaker"));
}

#[test]
fn configured_ceiling_is_honored() {
    let temp = workspace();
    start(temp.path(), "transfer");
    let greet = advance(temp.path(), &["--commit"]);
    assert_eq!(greet.status.code(), Some(exit_codes::OK));

    // greet -> check fits in one step; check -> big would be the second.
    fs::write(temp.path().join("executor.toml"), "max_steps = 1\n").expect("write config");
    let output = advance(temp.path(), &["--slot", "amount=500"]);
    assert_eq!(output.status.code(), Some(exit_codes::CIRCUIT_BREAKER));
}

#[test]
fn missing_action_exits_with_interpretation_code() {
    let temp = workspace();
    start(temp.path(), "broken");
    let output = advance(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::INTERPRETATION));
}

#[test]
fn start_rejects_flow_missing_from_catalog() {
    let temp = workspace();
    let output = executor(
        temp.path(),
        &[
            "start",
            "--state",
            "state.json",
            "--flows",
            "flows.json",
            "--flow-id",
            "not_in_catalog",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown flow 'not_in_catalog'"));
    assert!(!temp.path().join("state.json").exists());

    let known = executor(
        temp.path(),
        &[
            "start",
            "--state",
            "state.json",
            "--flows",
            "flows.json",
            "--flow-id",
            "transfer",
        ],
    );
    assert_eq!(known.status.code(), Some(exit_codes::OK), "{known:?}");
    let stored = load_conversation(&temp.path().join("state.json"), "unused").expect("load");
    assert_eq!(stored.events.len(), 1);
}

#[test]
fn unknown_flow_on_stack_exits_with_interpretation_code() {
    let temp = workspace();
    start(temp.path(), "not_in_catalog");
    let output = advance(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::INTERPRETATION));
}
