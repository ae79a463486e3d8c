//! Option definitions: kinds, defaults and dependencies.

use super::{INHERIT, Mode, Value, inherit, is_empty_value, is_inherit, value_as_text};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One selectable entry of a single- or multi-choice option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Stored value
    pub value: String,
    /// Display label
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// The fixed set of option kinds, each with its own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptionKind {
    /// On/off switch
    Checkbox,
    /// Single-line text
    Text,
    /// Rich text block
    TextArea,
    /// Single choice from a list
    Select { choices: Vec<Choice> },
    /// Any number of choices from a list
    MultiSelect { choices: Vec<Choice> },
    /// Number within a range
    Range { min: f64, max: f64, step: f64 },
    /// Color in `#rrggbb` / `#rgb` notation
    Color,
    /// Structured list of items
    List,
    /// Entity-only field, never stored globally
    Hidden,
}

impl OptionKind {
    /// Parse a kind keyword (as used in schema files) without payload.
    ///
    /// Choice kinds start with no choices and range defaults to 0..=100 step 1;
    /// callers fill the payload in afterwards.
    pub fn from_keyword(keyword: &str) -> Result<Self> {
        match keyword.to_lowercase().as_str() {
            "checkbox" | "switch" => Ok(Self::Checkbox),
            "text" => Ok(Self::Text),
            "textarea" | "rich-text" => Ok(Self::TextArea),
            "select" | "radio" => Ok(Self::Select {
                choices: Vec::new(),
            }),
            "multiselect" | "checklist" => Ok(Self::MultiSelect {
                choices: Vec::new(),
            }),
            "range" | "slider" => Ok(Self::Range {
                min: 0.0,
                max: 100.0,
                step: 1.0,
            }),
            "color" => Ok(Self::Color),
            "list" => Ok(Self::List),
            "hidden" => Ok(Self::Hidden),
            other => Err(Error::Schema(format!("unknown option kind '{}'", other))),
        }
    }

    /// Keyword naming this kind.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Checkbox => "checkbox",
            Self::Text => "text",
            Self::TextArea => "textarea",
            Self::Select { .. } => "select",
            Self::MultiSelect { .. } => "multiselect",
            Self::Range { .. } => "range",
            Self::Color => "color",
            Self::List => "list",
            Self::Hidden => "hidden",
        }
    }

    /// Turn raw submitted text (query parameter, form field) into a value
    /// of this kind.
    ///
    /// Text-like kinds keep the text verbatim. Text that does not fit a
    /// numeric, boolean or list kind stays a string for `validate` to
    /// report.
    pub fn coerce(&self, raw: &str) -> Value {
        if raw == INHERIT {
            return inherit();
        }
        let trimmed = raw.trim();
        match self {
            Self::Checkbox => match trimmed.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Value::Bool(true),
                "" | "0" | "false" | "off" | "no" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
            Self::Range { .. } => {
                if let Ok(n) = trimmed.parse::<i64>() {
                    Value::from(n)
                } else if let Some(n) = trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                {
                    Value::Number(n)
                } else {
                    Value::String(raw.to_string())
                }
            }
            Self::MultiSelect { .. } | Self::List => {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(list @ Value::Array(_)) => list,
                    _ if matches!(self, Self::MultiSelect { .. }) => Value::Array(
                        trimmed
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(|s| Value::String(s.to_string()))
                            .collect(),
                    ),
                    _ => Value::String(raw.to_string()),
                }
            }
            Self::Text | Self::TextArea | Self::Select { .. } | Self::Color | Self::Hidden => {
                Value::String(raw.to_string())
            }
        }
    }

    /// Check that a submitted value fits this kind.
    ///
    /// `inherit` is always accepted; whether it may be stored is the
    /// caller's decision.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        if is_inherit(value) {
            return Ok(());
        }
        match self {
            Self::Checkbox => match value {
                Value::Bool(_) => Ok(()),
                Value::Number(n) if n.as_i64() == Some(0) || n.as_i64() == Some(1) => Ok(()),
                _ => Err(format!("expected a boolean, got {}", value)),
            },
            Self::Text | Self::TextArea => match value {
                Value::String(_) | Value::Number(_) => Ok(()),
                _ => Err(format!("expected text, got {}", value)),
            },
            Self::Select { choices } => {
                let text = value_as_text(value);
                if choices.is_empty() || choices.iter().any(|c| c.value == text) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not one of the allowed choices", text))
                }
            }
            Self::MultiSelect { choices } => {
                let Value::Array(items) = value else {
                    return Err(format!("expected a list of choices, got {}", value));
                };
                for item in items {
                    let text = value_as_text(item);
                    if !choices.is_empty() && !choices.iter().any(|c| c.value == text) {
                        return Err(format!("'{}' is not one of the allowed choices", text));
                    }
                }
                Ok(())
            }
            Self::Range { min, max, .. } => {
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match number {
                    Some(n) if n >= *min && n <= *max => Ok(()),
                    Some(n) => Err(format!("{} is outside {}..={}", n, min, max)),
                    None => Err(format!("expected a number, got {}", value)),
                }
            }
            Self::Color => match value {
                Value::String(s) if s.is_empty() || is_hex_color(s) => Ok(()),
                _ => Err(format!("expected a #rgb or #rrggbb color, got {}", value)),
            },
            Self::List => match value {
                Value::Array(_) => Ok(()),
                _ => Err(format!("expected a list, got {}", value)),
            },
            Self::Hidden => Ok(()),
        }
    }
}

fn is_hex_color(s: &str) -> bool {
    let Some(hex) = s.strip_prefix('#') else {
        return false;
    };
    (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Where an option's default comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultValue {
    /// A literal value
    Static(Value),
    /// Computed by a provider registered on the schema under this name
    Computed(String),
}

/// Test applied to the resolved value of the option a dependency points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "test", content = "values", rename_all = "snake_case")]
pub enum Predicate {
    /// Value equals one of these
    OneOf(Vec<String>),
    /// Value equals none of these
    NoneOf(Vec<String>),
    /// Value is empty
    Empty,
    /// Value is not empty
    NotEmpty,
}

impl Predicate {
    /// Build a predicate from schema literals.
    ///
    /// `is_empty` / `not_empty` select the emptiness tests, `^value` entries
    /// negate, plain entries match.
    pub fn from_literals(literals: &[String]) -> Result<Self> {
        if literals.is_empty() {
            return Err(Error::Schema("dependency needs at least one value".to_string()));
        }
        if literals.len() == 1 {
            match literals[0].as_str() {
                "is_empty" => return Ok(Self::Empty),
                "not_empty" => return Ok(Self::NotEmpty),
                _ => {}
            }
        }
        let negated = literals.iter().filter(|l| l.starts_with('^')).count();
        if negated == literals.len() {
            Ok(Self::NoneOf(
                literals.iter().map(|l| l[1..].to_string()).collect(),
            ))
        } else if negated == 0 {
            Ok(Self::OneOf(literals.to_vec()))
        } else {
            Err(Error::Schema(format!(
                "dependency mixes negated and plain values: {:?}",
                literals
            )))
        }
    }

    /// Evaluate against a resolved value.
    ///
    /// Multi-valued (array) values match when any element matches.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Empty => is_empty_value(value),
            Self::NotEmpty => !is_empty_value(value),
            Self::OneOf(values) => any_element_in(value, values),
            Self::NoneOf(values) => !any_element_in(value, values),
        }
    }
}

fn any_element_in(value: &Value, values: &[String]) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .any(|item| values.contains(&value_as_text(item))),
        other => values.contains(&value_as_text(other)),
    }
}

/// A single condition: the referenced option's value must satisfy the predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Name of the option whose value gates visibility
    pub option: String,
    /// Test on that option's resolved value
    pub predicate: Predicate,
}

/// Visibility gate for an option; every condition must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub conditions: Vec<Condition>,
}

impl Dependency {
    /// Names of the options this dependency reads.
    pub fn referenced_options(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.option.as_str())
    }
}

/// A configurable value registered in the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDefinition {
    /// Unique option name
    pub name: String,
    /// Display title
    pub title: String,
    /// Longer help text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Presentation group
    pub section: String,
    /// Default value or computed-default reference
    pub default: DefaultValue,
    /// Kind with typed payload
    #[serde(flatten)]
    pub kind: OptionKind,
    /// Entity modes in which this option may be overridden per entity
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub override_modes: Vec<Mode>,
    /// Visibility gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<Dependency>,
    /// External storage group mirrored on global save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_store: Option<String>,
    /// Entity-only field
    #[serde(default)]
    pub hidden: bool,
}

impl OptionDefinition {
    /// Create a definition with a static default and no overrides.
    pub fn new(name: impl Into<String>, kind: OptionKind, default: Value) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            description: None,
            section: "General".to_string(),
            default: DefaultValue::Static(default),
            kind,
            override_modes: Vec::new(),
            dependency: None,
            external_store: None,
            hidden: false,
        }
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the presentation section.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    /// Use a computed default provider.
    pub fn with_computed_default(mut self, provider: impl Into<String>) -> Self {
        self.default = DefaultValue::Computed(provider.into());
        self
    }

    /// Allow per-entity overrides in the given modes.
    pub fn overridable_in<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.override_modes = modes.into_iter().filter_map(Mode::new).collect();
        self
    }

    /// Add a visibility condition.
    pub fn depends_on(mut self, option: impl Into<String>, predicate: Predicate) -> Self {
        self.dependency
            .get_or_insert_with(Dependency::default)
            .conditions
            .push(Condition {
                option: option.into(),
                predicate,
            });
        self
    }

    /// Mirror this option into an external store on global save.
    pub fn in_external_store(mut self, store: impl Into<String>) -> Self {
        self.external_store = Some(store.into());
        self
    }

    /// Mark as an entity-only field.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Whether entity overrides are allowed in `mode`.
    pub fn is_overridable_in(&self, mode: &Mode) -> bool {
        self.override_modes.iter().any(|m| m == mode)
    }

    /// Whether global saves persist this option.
    pub fn is_stored_globally(&self) -> bool {
        !self.hidden && self.kind != OptionKind::Hidden
    }
}
