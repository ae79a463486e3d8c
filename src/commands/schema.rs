//! Schema inspection commands.

use super::{Output, Session, json_of};
use crate::config::ConfigOverrides;
use crate::models::{Condition, Mode, OptionDefinition, Predicate, value_as_text};
use crate::schema::Schema;
use crate::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
pub struct OptionSummary {
    #[serde(flatten)]
    pub definition: OptionDefinition,
    /// Default with computed providers evaluated
    pub resolved_default: serde_json::Value,
}

#[derive(Serialize)]
pub struct SchemaShowResult {
    pub path: String,
    pub override_modes: Vec<Mode>,
    pub fallback_stores: Vec<String>,
    pub options: Vec<OptionSummary>,
}

impl Output for SchemaShowResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} option(s) in {}", self.options.len(), self.path)];
        for o in &self.options {
            let def = &o.definition;
            let mut line = format!(
                "  {} [{}] {} = {}",
                def.name,
                def.kind.keyword(),
                def.title,
                value_as_text(&o.resolved_default)
            );
            if !def.override_modes.is_empty() {
                let modes: Vec<&str> = def.override_modes.iter().map(Mode::as_str).collect();
                line.push_str(&format!(" (override: {})", modes.join(", ")));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

fn summarize(schema: &Schema, section: Option<&str>) -> Vec<OptionSummary> {
    schema
        .definitions()
        .iter()
        .filter(|d| section.is_none_or(|s| d.section == s))
        .map(|d| OptionSummary {
            definition: d.clone(),
            resolved_default: schema.default_for(d),
        })
        .collect()
}

/// List the option definitions of the site's schema.
pub fn schema_show(
    site: &Path,
    overrides: &ConfigOverrides,
    section: Option<&str>,
) -> Result<SchemaShowResult> {
    let session = Session::open(site, overrides)?;
    let schema = session.load_schema()?;
    Ok(SchemaShowResult {
        path: session.schema_path().display().to_string(),
        override_modes: schema.override_modes().to_vec(),
        fallback_stores: schema.fallback_stores().to_vec(),
        options: summarize(&schema, section),
    })
}

#[derive(Serialize)]
pub struct DependencyEntry {
    pub option: String,
    pub conditions: Vec<Condition>,
}

#[derive(Serialize)]
pub struct SchemaDepsResult {
    pub dependencies: Vec<DependencyEntry>,
}

fn describe_predicate(predicate: &Predicate) -> String {
    match predicate {
        Predicate::OneOf(values) => format!("in [{}]", values.join(", ")),
        Predicate::NoneOf(values) => format!("not in [{}]", values.join(", ")),
        Predicate::Empty => "is empty".to_string(),
        Predicate::NotEmpty => "is not empty".to_string(),
    }
}

impl Output for SchemaDepsResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        if self.dependencies.is_empty() {
            return "No dependencies.".to_string();
        }
        let mut lines = Vec::new();
        for dep in &self.dependencies {
            let conditions: Vec<String> = dep
                .conditions
                .iter()
                .map(|c| format!("{} {}", c.option, describe_predicate(&c.predicate)))
                .collect();
            lines.push(format!("{} when {}", dep.option, conditions.join(" and ")));
        }
        lines.join("\n")
    }
}

/// List every option that carries a visibility dependency.
pub fn schema_deps(site: &Path, overrides: &ConfigOverrides) -> Result<SchemaDepsResult> {
    let session = Session::open(site, overrides)?;
    let schema = session.load_schema()?;
    let dependencies = schema
        .dependencies()
        .into_iter()
        .map(|(name, dep)| DependencyEntry {
            option: name.to_string(),
            conditions: dep.conditions.clone(),
        })
        .collect();
    Ok(SchemaDepsResult { dependencies })
}
