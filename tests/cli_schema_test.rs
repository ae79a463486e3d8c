//! Integration tests for `optlayer schema`.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_schema_show_lists_options() {
    let env = TestEnv::init();
    let result = env.json(&["schema", "show"]);
    let options = result["options"].as_array().unwrap();
    assert_eq!(options.len(), 3);
    assert_eq!(options[0]["name"], "sidebar");
    assert_eq!(options[0]["resolved_default"], "right");
    assert_eq!(result["override_modes"], serde_json::json!(["post", "page"]));
    assert!(result["path"].as_str().unwrap().ends_with("schema.kdl"));
}

#[test]
fn test_schema_show_filters_section() {
    let env = TestEnv::init();
    let result = env.json(&["schema", "show", "--section", "Blog"]);
    let names: Vec<&str> = result["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["blog_style", "excerpt_length"]);
}

#[test]
fn test_schema_show_human() {
    let env = TestEnv::init();
    env.optlayer()
        .args(["-H", "schema", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 option(s)"))
        .stdout(predicate::str::contains("(override: post, page)"));
}

#[test]
fn test_schema_deps() {
    let env = TestEnv::init();
    let result = env.json(&["schema", "deps"]);
    let deps = result["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0]["option"], "excerpt_length");
    assert_eq!(deps[0]["conditions"][0]["option"], "blog_style");
}

#[test]
fn test_schema_flag_points_at_other_file() {
    let env = TestEnv::init();
    let other = env.site_path().join("minimal.kdl");
    std::fs::write(&other, "option \"greeting\" {\n    default \"hello\"\n}\n").unwrap();

    let result = env.json(&["--schema", "minimal.kdl", "get", "greeting"]);
    assert_eq!(result["value"], "hello");
}

#[test]
fn test_invalid_schema_is_reported() {
    let env = TestEnv::init();
    env.write_schema("option {\n");
    env.optlayer()
        .args(["schema", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Schema error"));
}
