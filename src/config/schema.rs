//! KDL schema definitions for config.kdl and state.kdl.
//!
//! This module provides:
//! - Rust structs representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation functions
//! - Key-based access for `optlayer config get/set`

use crate::storage::BackendType;
use chrono::{DateTime, Utc};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keys accepted by `optlayer config get/set`.
pub const CONFIG_KEYS: [&str; 5] = ["output-format", "strict", "schema", "backend", "action-log"];

/// User preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// output-format "human"  // or "json"
/// strict #true           // unknown options are errors
/// schema "/srv/site/schema.kdl"
/// backend "file"         // or "memory"
/// action-log #false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptlayerConfig {
    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// Whether resolving an unregistered option is an error
    pub strict: Option<bool>,

    /// Path to the option schema file
    pub schema: Option<String>,

    /// Option storage backend ("file" or "memory")
    pub backend: Option<String>,

    /// Whether commands are appended to action.log
    pub action_log: Option<bool>,
}

impl OptlayerConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref backend) = self.backend {
            if BackendType::parse(backend).is_none() {
                return Err(format!("backend must be 'file' or 'memory', got '{}'", backend));
            }
        }
        if let Some(ref schema) = self.schema {
            if schema.trim().is_empty() {
                return Err("schema path must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(s) = first_string(doc, "output-format") {
            config.output_format = OutputFormat::parse(&s);
        }
        config.strict = first_bool(doc, "strict");
        config.schema = first_string(doc, "schema");
        if let Some(s) = first_string(doc, "backend") {
            if BackendType::parse(&s).is_some() {
                config.backend = Some(s.to_lowercase());
            }
        }
        config.action_log = first_bool(doc, "action-log");

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref format) = self.output_format {
            push_node(&mut doc, "output-format", KdlValue::String(format.as_str().to_string()));
        }
        if let Some(strict) = self.strict {
            push_node(&mut doc, "strict", KdlValue::Bool(strict));
        }
        if let Some(ref schema) = self.schema {
            push_node(&mut doc, "schema", KdlValue::String(schema.clone()));
        }
        if let Some(ref backend) = self.backend {
            push_node(&mut doc, "backend", KdlValue::String(backend.clone()));
        }
        if let Some(action_log) = self.action_log {
            push_node(&mut doc, "action-log", KdlValue::Bool(action_log));
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &OptlayerConfig) {
        if other.output_format.is_some() {
            self.output_format = other.output_format.clone();
        }
        if other.strict.is_some() {
            self.strict = other.strict;
        }
        if other.schema.is_some() {
            self.schema = other.schema.clone();
        }
        if other.backend.is_some() {
            self.backend = other.backend.clone();
        }
        if other.action_log.is_some() {
            self.action_log = other.action_log;
        }
    }

    /// Get a value by its KDL key.
    pub fn get_key(&self, key: &str) -> Result<Option<String>, String> {
        Ok(match key {
            "output-format" => self.output_format.as_ref().map(|f| f.as_str().to_string()),
            "strict" => self.strict.map(|b| b.to_string()),
            "schema" => self.schema.clone(),
            "backend" => self.backend.clone(),
            "action-log" => self.action_log.map(|b| b.to_string()),
            other => return Err(unknown_key(other)),
        })
    }

    /// Set a value by its KDL key, parsing it for the key's type.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "output-format" => {
                self.output_format = Some(
                    OutputFormat::parse(value)
                        .ok_or_else(|| format!("output-format must be json or human, got '{}'", value))?,
                );
            }
            "strict" => self.strict = Some(parse_bool(key, value)?),
            "schema" => self.schema = Some(value.to_string()),
            "backend" => self.backend = Some(value.to_lowercase()),
            "action-log" => self.action_log = Some(parse_bool(key, value)?),
            other => return Err(unknown_key(other)),
        }
        self.validate()
    }
}

fn unknown_key(key: &str) -> String {
    format!("unknown config key '{}' (expected one of: {})", key, CONFIG_KEYS.join(", "))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("{} must be true or false, got '{}'", key, value)),
    }
}

/// Runtime state stored in state.kdl.
///
/// Holds the secret used to derive authenticity tokens.
/// **MUST be created with 0600 permissions (owner read/write only)**.
///
/// # KDL Schema
///
/// ```kdl
/// nonce-secret "5f0c..."
/// secret-created-at "2026-10-18T09:00:00Z"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptlayerState {
    /// Secret for authenticity tokens (sensitive!)
    pub nonce_secret: Option<String>,

    /// When the secret was generated
    pub secret_created_at: Option<DateTime<Utc>>,
}

impl OptlayerState {
    /// Create an empty state with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse state from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut state = Self::new();

        state.nonce_secret = first_string(doc, "nonce-secret");
        if let Some(s) = first_string(doc, "secret-created-at") {
            if let Ok(dt) = s.parse::<DateTime<Utc>>() {
                state.secret_created_at = Some(dt);
            }
        }

        state
    }

    /// Convert state to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref secret) = self.nonce_secret {
            push_node(&mut doc, "nonce-secret", KdlValue::String(secret.clone()));
        }
        if let Some(ref created_at) = self.secret_created_at {
            push_node(&mut doc, "secret-created-at", KdlValue::String(created_at.to_rfc3339()));
        }

        doc
    }
}

/// Required permissions for state.kdl (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const STATE_FILE_MODE: u32 = 0o600;

/// Required permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;

fn first_string(doc: &KdlDocument, name: &str) -> Option<String> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_string())
        .map(|s| s.to_string())
}

fn first_bool(doc: &KdlDocument, name: &str) -> Option<bool> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_bool())
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== OutputFormat Tests ====================

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("HUMAN"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::parse("invalid"), None);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(format!("{}", OutputFormat::Json), "json");
        assert_eq!(format!("{}", OutputFormat::Human), "human");
    }

    // ==================== OptlayerConfig Tests ====================

    #[test]
    fn test_config_from_kdl_full() {
        let kdl = r#"
            output-format "human"
            strict #false
            schema "/srv/site/schema.kdl"
            backend "Memory"
            action-log #true
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let config = OptlayerConfig::from_kdl(&doc);

        assert_eq!(config.output_format, Some(OutputFormat::Human));
        assert_eq!(config.strict, Some(false));
        assert_eq!(config.schema.as_deref(), Some("/srv/site/schema.kdl"));
        assert_eq!(config.backend.as_deref(), Some("memory"));
        assert_eq!(config.action_log, Some(true));
    }

    #[test]
    fn test_config_from_kdl_ignores_bad_backend() {
        let doc: KdlDocument = r#"backend "sqlite""#.parse().unwrap();
        assert_eq!(OptlayerConfig::from_kdl(&doc).backend, None);
    }

    #[test]
    fn test_config_to_kdl_roundtrip() {
        let config = OptlayerConfig {
            output_format: Some(OutputFormat::Json),
            strict: Some(true),
            schema: Some("schema.kdl".to_string()),
            backend: Some("file".to_string()),
            action_log: Some(false),
        };
        let parsed = OptlayerConfig::from_kdl(&config.to_kdl());
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_merge() {
        let mut base = OptlayerConfig {
            output_format: Some(OutputFormat::Json),
            strict: Some(true),
            ..Default::default()
        };
        base.merge(&OptlayerConfig {
            strict: Some(false),
            schema: Some("other.kdl".to_string()),
            ..Default::default()
        });
        assert_eq!(base.output_format, Some(OutputFormat::Json));
        assert_eq!(base.strict, Some(false));
        assert_eq!(base.schema.as_deref(), Some("other.kdl"));
    }

    #[test]
    fn test_config_get_set_keys() {
        let mut config = OptlayerConfig::new();
        config.set_key("strict", "no").unwrap();
        config.set_key("output-format", "human").unwrap();
        assert_eq!(config.get_key("strict").unwrap().as_deref(), Some("false"));
        assert_eq!(config.get_key("output-format").unwrap().as_deref(), Some("human"));
        assert_eq!(config.get_key("schema").unwrap(), None);

        assert!(config.set_key("backend", "sqlite").is_err());
        assert!(config.set_key("strict", "maybe").is_err());
        assert!(config.get_key("editor").unwrap_err().contains("unknown config key"));
    }

    // ==================== OptlayerState Tests ====================

    #[test]
    fn test_state_from_kdl_full() {
        let kdl = r#"
            nonce-secret "abc123"
            secret-created-at "2026-10-18T09:00:00Z"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let state = OptlayerState::from_kdl(&doc);
        assert_eq!(state.nonce_secret.as_deref(), Some("abc123"));
        assert!(state.secret_created_at.is_some());
    }

    #[test]
    fn test_state_to_kdl_roundtrip() {
        let state = OptlayerState {
            nonce_secret: Some("abc".to_string()),
            secret_created_at: Some(Utc::now()),
        };
        let parsed = OptlayerState::from_kdl(&state.to_kdl());
        assert_eq!(state.nonce_secret, parsed.nonce_secret);
        assert!(parsed.secret_created_at.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_constants() {
        assert_eq!(STATE_FILE_MODE, 0o600);
        assert_eq!(CONFIG_FILE_MODE, 0o644);
    }
}
