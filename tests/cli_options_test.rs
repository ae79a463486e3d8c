//! Integration tests for option resolution through the CLI:
//! - `get` walks the precedence chain
//! - `--query` request overrides win over stored values
//! - strict and lenient handling of unregistered names
//! - `explain` reports every layer

mod common;

use common::TestEnv;
use predicates::prelude::*;
use serde_json::json;

#[test]
fn test_get_returns_default() {
    let env = TestEnv::init();
    let result = env.json(&["get", "sidebar"]);
    assert_eq!(result["value"], "right");
    assert_eq!(result["source"], json!({ "layer": "default" }));
}

#[test]
fn test_get_numeric_default() {
    let env = TestEnv::init();
    let result = env.json(&["get", "excerpt_length", "--mode", "post"]);
    assert_eq!(result["value"], 20);
    assert_eq!(result["mode"], "post");
}

#[test]
fn test_query_override_wins() {
    let env = TestEnv::init();
    let result = env.json(&["get", "sidebar", "--query", "sidebar=left"]);
    assert_eq!(result["value"], "left");
    assert_eq!(
        result["source"],
        json!({ "layer": "request", "key": "sidebar" })
    );
}

#[test]
fn test_mode_qualified_query_beats_bare_query() {
    let env = TestEnv::init();
    let result = env.json(&[
        "get",
        "excerpt_length",
        "--mode",
        "post",
        "--query",
        "excerpt_length=10&excerpt_length_post=30",
    ]);
    assert_eq!(result["value"], 30);
    assert_eq!(
        result["source"],
        json!({ "layer": "request", "key": "excerpt_length_post" })
    );
}

#[test]
fn test_inherit_in_query_is_skipped() {
    let env = TestEnv::init();
    let result = env.json(&["get", "sidebar", "--query", "sidebar=inherit"]);
    assert_eq!(result["value"], "right");
    assert_eq!(result["source"], json!({ "layer": "default" }));
}

#[test]
fn test_unknown_option_strict_fails() {
    let env = TestEnv::init();
    env.optlayer()
        .args(["get", "no_such_option"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown option: no_such_option"));
}

#[test]
fn test_unknown_option_lenient_returns_null() {
    let env = TestEnv::init();
    let result = env.json(&["--lenient", "get", "no_such_option"]);
    assert!(result["value"].is_null());
    assert_eq!(result["source"], json!({ "layer": "fallback" }));
}

#[test]
fn test_unknown_option_with_fallback() {
    let env = TestEnv::init();
    let result = env.json(&["get", "no_such_option", "--fallback", "7"]);
    assert_eq!(result["value"], 7);
    assert_eq!(result["source"], json!({ "layer": "fallback" }));
}

#[test]
fn test_get_human_readable() {
    let env = TestEnv::init();
    env.optlayer()
        .args(["-H", "get", "sidebar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sidebar = right (default)"));
}

#[test]
fn test_missing_schema_is_reported() {
    let env = TestEnv::new();
    env.optlayer().arg("init").assert().success();
    env.optlayer()
        .args(["get", "sidebar"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Schema error"));
}

#[test]
fn test_explain_lists_every_layer() {
    let env = TestEnv::init();
    let result = env.json(&["explain", "sidebar", "--mode", "post", "--entity", "42"]);
    let layers = result["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 7);
    assert_eq!(layers[0]["slot"], "request-mode");
    assert_eq!(layers[0]["layer"], "request:sidebar_post");
    assert_eq!(layers[2]["layer"], "entity:42:sidebar");
    assert_eq!(layers[6]["slot"], "default");
    assert_eq!(result["winner"], 6);
    assert_eq!(result["value"], "right");
    assert_eq!(result["known"], true);
}

#[test]
fn test_explain_marks_winning_request_layer() {
    let env = TestEnv::init();
    let result = env.json(&[
        "explain",
        "excerpt_length",
        "--mode",
        "post",
        "--query",
        "excerpt_length_post=30",
    ]);
    assert_eq!(result["winner"], 0);
    assert_eq!(
        result["layers"][0]["outcome"],
        json!({ "status": "value", "value": 30 })
    );
    assert_eq!(result["value"], 30);
}

#[test]
fn test_explain_without_mode_skips_mode_layers() {
    let env = TestEnv::init();
    let result = env.json(&["explain", "sidebar"]);
    let layers = result["layers"].as_array().unwrap();
    assert_eq!(layers[0]["outcome"]["status"], "skipped");
    assert_eq!(layers[2]["outcome"]["status"], "skipped");
    assert_eq!(layers[5]["outcome"]["status"], "missing");
}

#[test]
fn test_explain_unknown_option() {
    let env = TestEnv::init();
    let result = env.json(&["explain", "no_such_option"]);
    assert_eq!(result["known"], false);
    assert!(result["winner"].is_null());
    assert!(result["value"].is_null());
}

#[test]
fn test_text_values_stay_verbatim() {
    let env = TestEnv::new();
    env.write_schema("option \"version_label\" {\n    kind \"text\"\n    default \"\"\n}\n");
    env.optlayer().arg("init").assert().success();

    let result = env.json(&["get", "version_label", "--query", "version_label=1.10"]);
    assert_eq!(result["value"], "1.10");

    let token = env.token(None);
    env.json(&["save", "--token", &token, "--set", "version_label=1e3"]);
    let result = env.json(&["get", "version_label"]);
    assert_eq!(result["value"], "1e3");
}
