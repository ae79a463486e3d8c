//! Option commands: resolve, explain, save, reset and form listing.

use super::{Output, Session, json_of, parse_entity, parse_mode};
use crate::action_log::get_current_user;
use crate::auth::{Authorization, Principal, Role};
use crate::config::ConfigOverrides;
use crate::models::{EntityId, INHERIT, Mode, Value, is_inherit, parse_value, value_as_text};
use crate::schema::Schema;
use crate::resolver::{Explanation, OptionSource, Outcome, SaveReport, Scope};
use crate::storage::Namespace;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

// === Get ===

#[derive(Serialize)]
pub struct GetResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
    pub value: Value,
    pub source: OptionSource,
}

impl Output for GetResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!("{} = {} ({})", self.name, value_as_text(&self.value), self.source)
    }
}

/// Resolve one option.
pub fn get(
    site: &Path,
    overrides: &ConfigOverrides,
    name: &str,
    mode: Option<&str>,
    entity: Option<u64>,
    query: Option<&str>,
    fallback: Option<&str>,
) -> Result<GetResult> {
    let session = Session::open(site, overrides)?;
    let mode = parse_mode(mode);
    let entity = parse_entity(entity);
    let ctx = session.context(mode.clone(), entity, query)?;

    let resolved = match fallback {
        Some(fallback) => {
            let fallback = match ctx.schema().get(name) {
                Some(definition) => definition.kind.coerce(fallback),
                None => parse_value(fallback),
            };
            ctx.resolve_or(name, mode.as_ref(), entity, fallback)?
        }
        None => ctx.resolve(name, mode.as_ref(), entity)?,
    };
    Ok(GetResult {
        name: name.to_string(),
        mode,
        entity,
        value: resolved.value,
        source: resolved.source,
    })
}

// === Explain ===

pub struct ExplainResult(pub Explanation);

impl Output for ExplainResult {
    fn to_json(&self) -> String {
        json_of(&self.0)
    }

    fn to_human(&self) -> String {
        let e = &self.0;
        let mut lines = vec![format!(
            "{} = {} ({}){}",
            e.name,
            value_as_text(&e.value),
            e.source,
            if e.known { "" } else { " [unregistered]" }
        )];
        for (i, trace) in e.layers.iter().enumerate() {
            let marker = if e.winner == Some(i) { "*" } else { " " };
            let outcome = match &trace.outcome {
                Outcome::Value(v) => value_as_text(v),
                Outcome::Inherit => "inherit".to_string(),
                Outcome::Missing => "-".to_string(),
                Outcome::Skipped => "(skipped)".to_string(),
            };
            lines.push(format!(
                " {} {:<28} {}",
                marker,
                trace.layer.as_deref().unwrap_or(""),
                outcome
            ));
        }
        lines.join("\n")
    }
}

pub fn explain(
    site: &Path,
    overrides: &ConfigOverrides,
    name: &str,
    mode: Option<&str>,
    entity: Option<u64>,
    query: Option<&str>,
) -> Result<ExplainResult> {
    let session = Session::open(site, overrides)?;
    let mode = parse_mode(mode);
    let entity = parse_entity(entity);
    let ctx = session.context(mode.clone(), entity, query)?;
    Ok(ExplainResult(ctx.explain(name, mode.as_ref(), entity)?))
}

// === Save / Reset ===

pub struct SaveResult(pub SaveReport);

impl Output for SaveResult {
    fn to_json(&self) -> String {
        json_of(&self.0)
    }

    fn to_human(&self) -> String {
        let r = &self.0;
        let mut lines = vec![format!("Saved {}", r.scope)];
        if !r.stored.is_empty() {
            lines.push(format!("  stored:  {}", r.stored.join(", ")));
        }
        if !r.removed.is_empty() {
            lines.push(format!("  removed: {}", r.removed.join(", ")));
        }
        if !r.dropped.is_empty() {
            lines.push(format!("  dropped: {}", r.dropped.join(", ")));
        }
        if !r.external_stores.is_empty() {
            lines.push(format!("  external: {}", r.external_stores.join(", ")));
        }
        lines.join("\n")
    }
}

fn authorization(token: &str, role: &str, user: Option<&str>) -> Result<Authorization> {
    let role = Role::parse(role).ok_or_else(|| {
        Error::InvalidInput(format!(
            "unknown role '{}' (expected administrator, editor, author or subscriber)",
            role
        ))
    })?;
    let name = user.map(str::to_string).unwrap_or_else(get_current_user);
    Ok(Authorization::new(token, Principal::new(name, role)))
}

/// Collect `--set name=value` and `--inherit name` as raw submitted text.
pub(crate) fn parse_edits(
    set: &[String],
    inherit_names: &[String],
) -> Result<BTreeMap<String, String>> {
    let mut edits = BTreeMap::new();
    for assignment in set {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            Error::InvalidInput(format!("expected name=value, got '{}'", assignment))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(format!(
                "missing option name in '{}'",
                assignment
            )));
        }
        edits.insert(name.to_string(), raw.to_string());
    }
    for name in inherit_names {
        edits.insert(name.clone(), INHERIT.to_string());
    }
    Ok(edits)
}

/// Type submitted text by each option's kind.
fn typed_edits(schema: &Schema, edits: BTreeMap<String, String>) -> BTreeMap<String, Value> {
    edits
        .into_iter()
        .map(|(name, raw)| {
            let value = schema.coerce(&name, &raw);
            (name, value)
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub fn save(
    site: &Path,
    overrides: &ConfigOverrides,
    entity: Option<u64>,
    mode: Option<&str>,
    token: &str,
    role: &str,
    user: Option<&str>,
    set: &[String],
    inherit_names: &[String],
) -> Result<SaveResult> {
    let session = Session::open(site, overrides)?;
    let auth = authorization(token, role, user)?;
    let edits = parse_edits(set, inherit_names)?;

    let scope = match parse_entity(entity) {
        Some(entity) => {
            let mode = parse_mode(mode).ok_or_else(|| {
                Error::InvalidInput("entity saves need a --mode".to_string())
            })?;
            Scope::Entity { entity, mode }
        }
        None => Scope::Global,
    };

    let mut ctx = session.context(None, None, None)?;
    let edits = typed_edits(ctx.schema(), edits);
    Ok(SaveResult(ctx.save(&edits, &scope, &auth)?))
}

pub fn reset(
    site: &Path,
    overrides: &ConfigOverrides,
    token: &str,
    role: &str,
    user: Option<&str>,
) -> Result<SaveResult> {
    let session = Session::open(site, overrides)?;
    let auth = authorization(token, role, user)?;
    let mut ctx = session.context(None, None, None)?;
    Ok(SaveResult(ctx.reset(&auth)?))
}

// === Form ===

#[derive(Serialize)]
pub struct FormField {
    pub name: String,
    pub title: String,
    pub section: String,
    pub kind: &'static str,
    /// Value shown in the field
    pub value: Value,
    /// Entity forms: the field holds `inherit`
    pub inherited: bool,
    /// Value currently in effect
    pub effective: Value,
    pub visible: bool,
}

#[derive(Serialize)]
pub struct FormResult {
    pub scope: String,
    pub fields: Vec<FormField>,
}

impl Output for FormResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Form: {}", self.scope)];
        let mut section = "";
        for field in &self.fields {
            if field.section != section {
                section = &field.section;
                lines.push(format!("[{}]", section));
            }
            let shown = if field.inherited {
                format!("inherit -> {}", value_as_text(&field.effective))
            } else {
                value_as_text(&field.value)
            };
            let hidden = if field.visible { "" } else { " (hidden)" };
            lines.push(format!("  {} ({}): {}{}", field.name, field.kind, shown, hidden));
        }
        lines.join("\n")
    }
}

/// List the fields of the site-wide form or of one entity's override form.
///
/// Visibility is evaluated against the values in effect for the same
/// request, so query overrides can flip it.
pub fn form(
    site: &Path,
    overrides: &ConfigOverrides,
    entity: Option<u64>,
    mode: Option<&str>,
    query: Option<&str>,
) -> Result<FormResult> {
    let session = Session::open(site, overrides)?;
    let mode = parse_mode(mode);
    let entity = parse_entity(entity);
    let ctx = session.context(mode.clone(), entity, query)?;
    let schema = ctx.schema();
    let mut fields = Vec::new();

    match (entity, &mode) {
        (Some(entity), Some(mode)) => {
            if !schema.allows_override(mode) {
                return Err(Error::InvalidInput(format!(
                    "entities of mode '{}' do not accept overrides",
                    mode
                )));
            }
            for def in schema.overridable_in(mode) {
                let value = ctx.entity_value(&def.name, entity)?;
                let effective = ctx.resolve_or(&def.name, Some(mode), Some(entity), Value::Null)?;
                fields.push(FormField {
                    name: def.name.clone(),
                    title: def.title.clone(),
                    section: def.section.clone(),
                    kind: def.kind.keyword(),
                    inherited: is_inherit(&value),
                    value,
                    effective: effective.value,
                    visible: ctx.is_visible(&def.name)?,
                });
            }
            Ok(FormResult {
                scope: Scope::Entity {
                    entity,
                    mode: mode.clone(),
                }
                .to_string(),
                fields,
            })
        }
        _ => {
            for def in schema.definitions().iter().filter(|d| d.is_stored_globally()) {
                let stored = ctx.backend().get(&Namespace::Global, &def.name)?;
                let value = stored.unwrap_or_else(|| schema.default_for(def));
                let effective = ctx.resolve_or(&def.name, mode.as_ref(), None, Value::Null)?;
                fields.push(FormField {
                    name: def.name.clone(),
                    title: def.title.clone(),
                    section: def.section.clone(),
                    kind: def.kind.keyword(),
                    inherited: is_inherit(&value),
                    value,
                    effective: effective.value,
                    visible: ctx.is_visible(&def.name)?,
                });
            }
            Ok(FormResult {
                scope: Scope::Global.to_string(),
                fields,
            })
        }
    }
}
