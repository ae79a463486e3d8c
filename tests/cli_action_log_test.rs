//! Integration tests for action logging through the CLI:
//! - Commands are logged to action.log in the site's storage
//! - Logging can be disabled via config
//! - Tokens are redacted

mod common;

use common::TestEnv;
use std::fs;

/// Read the action log of the (only) site in the data directory.
fn read_action_log(env: &TestEnv) -> String {
    let Ok(entries) = fs::read_dir(env.data_path()) else {
        return String::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path().join("action.log"))
        .find(|p| p.exists())
        .map(|p| fs::read_to_string(p).unwrap_or_default())
        .unwrap_or_default()
}

fn log_lines(env: &TestEnv) -> Vec<serde_json::Value> {
    read_action_log(env)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_commands_are_logged() {
    let env = TestEnv::init();
    env.optlayer().args(["get", "sidebar"]).assert().success();

    let lines = log_lines(&env);
    assert!(lines.len() >= 2, "expected init and get, got {}", lines.len());
    let last = lines.last().unwrap();
    assert_eq!(last["command"], "get");
    assert_eq!(last["args"]["name"], "sidebar");
    assert_eq!(last["success"], true);
}

#[test]
fn test_failures_are_logged_with_error() {
    let env = TestEnv::init();
    env.optlayer()
        .args(["get", "no_such_option"])
        .assert()
        .failure();

    let lines = log_lines(&env);
    let last = lines.last().unwrap();
    assert_eq!(last["success"], false);
    assert!(
        last["error"]
            .as_str()
            .unwrap()
            .contains("Unknown option")
    );
}

#[test]
fn test_tokens_are_redacted() {
    let env = TestEnv::init();
    let token = env.token(None);
    env.optlayer()
        .args(["save", "--token", &token, "--set", "sidebar=left"])
        .assert()
        .success();

    let log = read_action_log(&env);
    assert!(!log.contains(&token), "token should not appear in the log");
    assert!(log.contains("[REDACTED]"));
}

#[test]
fn test_logging_can_be_disabled() {
    let env = TestEnv::init();
    env.optlayer()
        .args(["config", "set", "action-log", "false"])
        .assert()
        .success();
    let before = log_lines(&env).len();

    env.optlayer().args(["get", "sidebar"]).assert().success();
    env.optlayer().args(["schema", "show"]).assert().success();

    assert_eq!(log_lines(&env).len(), before);
}
