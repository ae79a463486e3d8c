//! Core data types for optlayer.
//!
//! This module defines the building blocks shared by the schema, the
//! resolver and the storage layer:
//! - [`Value`] and the `inherit` sentinel
//! - [`Mode`] - a rendering-context tag such as `post` or `courses_single`
//! - [`OptionKey`] - the composite `{ name, mode }` key
//! - [`EntityId`] - a content entity carrying its own overrides

pub mod option;

pub use option::{
    Choice, Condition, DefaultValue, Dependency, OptionDefinition, OptionKind, Predicate,
};

use serde::{Deserialize, Serialize};

/// Option values are plain JSON values.
pub type Value = serde_json::Value;

/// Sentinel meaning "no value at this layer, continue resolution".
pub const INHERIT: &str = "inherit";

/// The `inherit` sentinel as a [`Value`].
pub fn inherit() -> Value {
    Value::String(INHERIT.to_string())
}

/// Check whether a value is the `inherit` sentinel.
pub fn is_inherit(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == INHERIT)
}

/// Check whether a value counts as empty for dependency predicates.
///
/// `null`, `""`, `"0"`, `false`, `0` and empty collections are empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Render a value the way it is compared against predicate literals.
///
/// Strings are taken verbatim, booleans become `1`/`0`, everything else is
/// its JSON text.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a raw textual value (CLI argument, query parameter) into a [`Value`].
///
/// JSON literals (numbers, booleans, arrays, objects, quoted strings) are
/// decoded; anything else is kept as a plain string.
pub fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    let looks_like_json = trimmed.starts_with('[')
        || trimmed.starts_with('{')
        || trimmed.starts_with('"')
        || trimmed == "true"
        || trimmed == "false"
        || trimmed == "null"
        || trimmed.parse::<f64>().is_ok();
    if looks_like_json {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

/// A rendering-context tag (e.g. `post`, `page`, `courses_single`).
///
/// Modes are never empty; an empty tag means "no mode" and is represented
/// as `Option<Mode>::None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(String);

impl Mode {
    /// Create a mode from a tag, returning `None` for an empty tag.
    pub fn new(tag: impl Into<String>) -> Option<Self> {
        let tag = tag.into();
        let tag = tag.trim();
        if tag.is_empty() {
            None
        } else {
            Some(Self(tag.to_string()))
        }
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key identifying one stored variant of an option.
///
/// The flat storage form (`name` or `name_mode`) is produced only by
/// [`OptionKey::storage_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionKey {
    /// Option name
    pub name: String,
    /// Mode qualifier, if any
    pub mode: Option<Mode>,
}

impl OptionKey {
    /// Key for the bare option name.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
        }
    }

    /// Key for the option qualified by a mode.
    pub fn scoped(name: impl Into<String>, mode: Mode) -> Self {
        Self {
            name: name.into(),
            mode: Some(mode),
        }
    }

    /// Flat key used by stores and request parameters.
    pub fn storage_key(&self) -> String {
        match &self.mode {
            Some(mode) => format!("{}_{}", self.name, mode),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for OptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// Identifier of a content entity (one page, one post).
///
/// `0` is not a valid entity; it means "no entity scope".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Create an entity id, returning `None` for `0`.
    pub fn new(id: u64) -> Option<Self> {
        if id == 0 { None } else { Some(Self(id)) }
    }

    /// Get the raw numeric id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inherit_sentinel() {
        assert!(is_inherit(&inherit()));
        assert!(is_inherit(&json!("inherit")));
        assert!(!is_inherit(&json!("Inherit")));
        assert!(!is_inherit(&json!(0)));
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!("0")));
        assert!(is_empty_value(&json!(false)));
        assert!(is_empty_value(&json!(0)));
        assert!(is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!("left")));
        assert!(!is_empty_value(&json!(1)));
        assert!(!is_empty_value(&json!(true)));
    }

    #[test]
    fn test_value_as_text() {
        assert_eq!(value_as_text(&json!("left")), "left");
        assert_eq!(value_as_text(&json!(true)), "1");
        assert_eq!(value_as_text(&json!(false)), "0");
        assert_eq!(value_as_text(&json!(35)), "35");
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("35"), json!(35));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("left"), json!("left"));
        assert_eq!(parse_value("[1,2]"), json!([1, 2]));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("{broken"), json!("{broken"));
    }

    #[test]
    fn test_mode_rejects_empty() {
        assert!(Mode::new("").is_none());
        assert!(Mode::new("  ").is_none());
        assert_eq!(Mode::new("post").unwrap().as_str(), "post");
    }

    #[test]
    fn test_option_key_storage_key() {
        assert_eq!(OptionKey::bare("sidebar").storage_key(), "sidebar");
        let key = OptionKey::scoped("sidebar", Mode::new("post").unwrap());
        assert_eq!(key.storage_key(), "sidebar_post");
        assert_eq!(key.to_string(), "sidebar_post");
    }

    #[test]
    fn test_entity_id_zero_is_no_scope() {
        assert!(EntityId::new(0).is_none());
        assert_eq!(EntityId::new(42).unwrap().get(), 42);
    }
}
