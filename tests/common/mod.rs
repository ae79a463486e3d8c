//! Common test utilities for optlayer integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's `~/.local/share/optlayer/` or `~/.config/optlayer/` directories.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// Schema used by most CLI tests.
pub const BLOG_SCHEMA: &str = r#"
override-modes "post" "page"
capability "post" "post"
parent "courses_single" "courses"

option "sidebar" {
    title "Sidebar"
    section "Layout"
    kind "select"
    choice "right" "Right"
    choice "left" "Left"
    choice "none" "No sidebar"
    default "right"
    override "post" "page"
}

option "blog_style" {
    title "Blog style"
    section "Blog"
    kind "select"
    choice "excerpt" "Excerpt"
    choice "classic" "Classic"
    default "excerpt"
}

option "excerpt_length" {
    title "Excerpt length"
    section "Blog"
    kind "range" min=1 max=100 step=1
    default 20
    override "post"
    depends "blog_style" "excerpt"
}
"#;

/// A test environment with isolated site, data and config directories.
///
/// The `optlayer()` method returns a `Command` that sets the directory
/// environment variables per invocation, making tests parallel-safe.
pub struct TestEnv {
    pub site_dir: TempDir,
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            site_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment, write the blog schema and run `init`.
    pub fn init() -> Self {
        let env = Self::new();
        env.write_schema(BLOG_SCHEMA);
        env.optlayer().arg("init").assert().success();
        env
    }

    /// Get a Command for the optlayer binary scoped to this environment.
    pub fn optlayer(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_optlayer"));
        cmd.current_dir(self.site_dir.path());
        cmd.env("OPTLAYER_DATA_DIR", self.data_dir.path());
        cmd.env("OPTLAYER_CONFIG_DIR", self.config_dir.path());
        cmd.env_remove("OPTLAYER_NONCE_SECRET");
        cmd.env_remove("OPTLAYER_SITE");
        cmd.env_remove("OPTLAYER_LOG");
        cmd
    }

    /// Write `schema.kdl` into the site directory.
    pub fn write_schema(&self, content: &str) {
        std::fs::write(self.site_dir.path().join("schema.kdl"), content).unwrap();
    }

    /// Run a command expected to succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.optlayer().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "optlayer {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Issue a token for a site-wide save, or for one entity.
    pub fn token(&self, entity: Option<u64>) -> String {
        let entity_arg = entity.map(|e| e.to_string());
        let mut args = vec!["nonce"];
        if let Some(e) = &entity_arg {
            args.push("--entity");
            args.push(e);
        }
        self.json(&args)["token"].as_str().unwrap().to_string()
    }

    pub fn site_path(&self) -> &std::path::Path {
        self.site_dir.path()
    }

    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
