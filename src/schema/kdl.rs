//! KDL parsing for schema files.
//!
//! # KDL Schema
//!
//! ```kdl
//! override-modes "page" "post"
//! capability "post" "post"
//! parent "courses_single" "courses"
//! fallback-store "addons"
//!
//! option "blog_style" {
//!     title "Blog style"
//!     section "Blog"
//!     kind "select"
//!     choice "excerpt" "Excerpt"
//!     choice "classic" "Classic"
//!     default "excerpt"
//!     override "page"
//! }
//!
//! option "excerpt_length" {
//!     kind "range" min=1 max=100 step=1
//!     default 20
//!     depends "blog_style" "excerpt"
//! }
//!
//! option "copyright" {
//!     kind "textarea"
//!     default-fn "copyright_notice"
//!     external "addons"
//! }
//! ```
//!
//! Computed defaults named by `default-fn` must be registered on the
//! builder; [`with_builtin_providers`] registers the ones shipped with the
//! crate.

use crate::models::{Choice, OptionDefinition, OptionKind, Predicate, Value};
use crate::schema::{Schema, SchemaBuilder};
use crate::{Error, Result};
use chrono::Datelike;
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::Path;

/// Register the built-in computed-default providers.
///
/// - `current_year` - the current calendar year
/// - `copyright_notice` - `Copyright © <year>`
pub fn with_builtin_providers(builder: SchemaBuilder) -> SchemaBuilder {
    builder
        .provider("current_year", |_| {
            Value::from(i64::from(chrono::Utc::now().year()))
        })
        .provider("copyright_notice", |_| {
            Value::String(format!("Copyright © {}", chrono::Utc::now().year()))
        })
}

/// Parse a schema document into a builder.
pub fn parse_schema(doc: &KdlDocument, mut builder: SchemaBuilder) -> Result<SchemaBuilder> {
    for node in doc.nodes() {
        match node.name().value() {
            "option" => {
                builder = builder.option(parse_option_node(node)?);
            }
            "override-modes" => {
                builder = builder.override_modes(string_args(node));
            }
            "parent" => {
                let args = string_args(node);
                let [mode, parent] = args.as_slice() else {
                    return Err(Error::Schema(
                        "parent takes exactly two arguments: mode and parent".to_string(),
                    ));
                };
                builder = builder.parent(mode.clone(), parent.clone());
            }
            "capability" => {
                let args = string_args(node);
                let [mode, capability] = args.as_slice() else {
                    return Err(Error::Schema(
                        "capability takes exactly two arguments: mode and capability type"
                            .to_string(),
                    ));
                };
                builder = builder.capability(mode.clone(), capability.clone());
            }
            "fallback-store" => {
                for store in string_args(node) {
                    builder = builder.fallback_store(store);
                }
            }
            _ => {
                // Ignore unknown nodes for forward compatibility
            }
        }
    }
    Ok(builder)
}

/// Parse a single `option "name" { ... }` node.
fn parse_option_node(node: &KdlNode) -> Result<OptionDefinition> {
    let name = get_string_arg(node)
        .ok_or_else(|| Error::Schema("option node must have a name argument".to_string()))?;

    let mut def = OptionDefinition::new(name.clone(), OptionKind::Text, Value::String(String::new()));
    let mut choices: Vec<Choice> = Vec::new();
    let mut dependencies: Vec<(String, Predicate)> = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "title" => {
                    if let Some(title) = get_string_arg(child) {
                        def.title = title;
                    }
                }
                "description" => {
                    def.description = get_string_arg(child);
                }
                "section" => {
                    if let Some(section) = get_string_arg(child) {
                        def.section = section;
                    }
                }
                "kind" => {
                    let keyword = get_string_arg(child).ok_or_else(|| {
                        Error::Schema(format!("option '{}': kind needs a keyword", name))
                    })?;
                    def.kind = OptionKind::from_keyword(&keyword)?;
                    if let OptionKind::Range { min, max, step } = &mut def.kind {
                        if let Some(v) = get_number_prop(child, "min") {
                            *min = v;
                        }
                        if let Some(v) = get_number_prop(child, "max") {
                            *max = v;
                        }
                        if let Some(v) = get_number_prop(child, "step") {
                            *step = v;
                        }
                    }
                }
                "choice" => {
                    let args = string_args(child);
                    match args.as_slice() {
                        [value] => choices.push(Choice::new(value.clone(), value.clone())),
                        [value, label, ..] => choices.push(Choice::new(value.clone(), label.clone())),
                        [] => {
                            return Err(Error::Schema(format!(
                                "option '{}': choice needs a value",
                                name
                            )));
                        }
                    }
                }
                "default" => {
                    let values: Vec<Value> = args(child).map(kdl_to_value).collect();
                    def.default = crate::models::DefaultValue::Static(match values.len() {
                        0 => Value::Null,
                        1 => values.into_iter().next().unwrap_or(Value::Null),
                        _ => Value::Array(values),
                    });
                }
                "default-fn" => {
                    let provider = get_string_arg(child).ok_or_else(|| {
                        Error::Schema(format!("option '{}': default-fn needs a name", name))
                    })?;
                    def = def.with_computed_default(provider);
                }
                "override" => {
                    def = def.overridable_in(string_args(child));
                }
                "depends" => {
                    let mut args = string_args(child).into_iter();
                    let option = args.next().ok_or_else(|| {
                        Error::Schema(format!("option '{}': depends needs an option name", name))
                    })?;
                    let literals: Vec<String> = args.collect();
                    dependencies.push((option, Predicate::from_literals(&literals)?));
                }
                "external" => {
                    if let Some(store) = get_string_arg(child) {
                        def = def.in_external_store(store);
                    }
                }
                "hidden" => {
                    if get_bool_arg(child).unwrap_or(true) {
                        def = def.hidden();
                    }
                }
                _ => {
                    // Ignore unknown fields for forward compatibility
                }
            }
        }
    }

    match &mut def.kind {
        OptionKind::Select { choices: slot } | OptionKind::MultiSelect { choices: slot } => {
            *slot = choices;
        }
        _ if !choices.is_empty() => {
            return Err(Error::Schema(format!(
                "option '{}': choices are only allowed on select kinds",
                name
            )));
        }
        _ => {}
    }

    for (option, predicate) in dependencies {
        def = def.depends_on(option, predicate);
    }

    Ok(def)
}

/// Positional arguments of a node (entries without a property name).
fn args(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

/// Positional arguments rendered as strings.
fn string_args(node: &KdlNode) -> Vec<String> {
    args(node)
        .map(|v| match v.as_string() {
            Some(s) => s.to_string(),
            None => crate::models::value_as_text(&kdl_to_value(v)),
        })
        .collect()
}

/// Get a string argument from a node's first positional entry.
fn get_string_arg(node: &KdlNode) -> Option<String> {
    args(node).next().and_then(|v| v.as_string()).map(|s| s.to_string())
}

/// Get a boolean argument from a node's first positional entry.
fn get_bool_arg(node: &KdlNode) -> Option<bool> {
    args(node).next().and_then(|v| v.as_bool())
}

/// Get a numeric property (`key=value`) from a node.
fn get_number_prop(node: &KdlNode, key: &str) -> Option<f64> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .and_then(|e| {
            let v = e.value();
            v.as_float().or_else(|| v.as_integer().map(|i| i as f64))
        })
}

/// Convert a KDL value into a JSON value.
fn kdl_to_value(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(i as f64))
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else {
        Value::Null
    }
}

/// Parse schema text, registering the built-in providers.
pub fn parse_schema_str(content: &str) -> Result<Schema> {
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Schema(format!("Failed to parse schema KDL: {}", e)))?;
    parse_schema(&doc, with_builtin_providers(Schema::builder()))?.build()
}

/// Load a schema from a KDL file path.
pub fn load_schema_from_file(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Schema(format!("Failed to read {}: {}", path.display(), e)))?;
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Schema(format!("Failed to parse KDL in {}: {}", path.display(), e)))?;
    parse_schema(&doc, with_builtin_providers(Schema::builder()))?.build()
}
