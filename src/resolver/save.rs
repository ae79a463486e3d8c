//! Save path: authorization gate, per-scope write semantics, one batch.

use super::RequestContext;
use crate::auth::{Action, Authorization, Capability, NonceAge};
use crate::models::{EntityId, Mode, Value, is_inherit, value_as_text};
use crate::storage::{Namespace, WriteBatch};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Which values a save writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Site-wide values
    Global,
    /// One entity's override map, edited in `mode`
    Entity { entity: EntityId, mode: Mode },
}

impl Scope {
    fn action(&self) -> Action {
        match self {
            Scope::Global => Action::SaveGlobal,
            Scope::Entity { entity, .. } => Action::SaveEntity(*entity),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Entity { entity, mode } => write!(f, "entity:{} ({})", entity, mode),
        }
    }
}

/// What a save or reset did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveReport {
    pub scope: String,
    /// Keys written
    pub stored: Vec<String>,
    /// Keys deleted (value equal to default, or never stored globally)
    pub removed: Vec<String>,
    /// Submitted keys that were not persisted
    pub dropped: Vec<String>,
    /// External stores merged into
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_stores: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_age: Option<NonceAge>,
}

/// Loose equality used to detect "saved value equals the default".
///
/// Scalars compare by their textual form, so `"20"` equals `20` and `true`
/// equals `1`.
fn same_value(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => value_as_text(a) == value_as_text(b),
    }
}

impl RequestContext {
    fn authorize(&self, scope: &Scope, auth: &Authorization) -> Result<NonceAge> {
        let required = match scope {
            Scope::Global => Capability::ManageOptions,
            Scope::Entity { mode, .. } => {
                Capability::Edit(self.schema.capability_type_for(mode).to_string())
            }
        };
        auth.check(self.nonces.as_ref(), &scope.action(), &required)
            .inspect_err(|e| {
                tracing::warn!(scope = %scope, user = %auth.principal.name, error = %e, "save rejected");
            })
    }

    /// Persist `edits` for `scope`.
    ///
    /// Authorization runs first; nothing is written when it fails. The
    /// whole scope is committed as one batch, after which cached reads for
    /// the scope are dropped.
    pub fn save(
        &mut self,
        edits: &BTreeMap<String, Value>,
        scope: &Scope,
        auth: &Authorization,
    ) -> Result<SaveReport> {
        let age = self.authorize(scope, auth)?;
        let (batch, mut report) = match scope {
            Scope::Global => self.plan_global(edits)?,
            Scope::Entity { entity, mode } => self.plan_entity(edits, *entity, mode)?,
        };
        report.scope = scope.to_string();
        report.token_age = Some(age);

        self.backend.apply(batch)?;
        match scope {
            Scope::Global => {
                self.global.borrow_mut().take();
                self.externals.borrow_mut().clear();
            }
            Scope::Entity { entity, .. } => {
                self.entities.borrow_mut().remove(entity);
            }
        }
        tracing::info!(
            scope = %scope,
            user = %auth.principal.name,
            stored = report.stored.len(),
            removed = report.removed.len(),
            "options saved"
        );
        Ok(report)
    }

    fn plan_global(&self, edits: &BTreeMap<String, Value>) -> Result<(WriteBatch, SaveReport)> {
        for (name, value) in edits {
            let definition = self
                .schema
                .get(name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown option '{}'", name)))?;
            definition
                .kind
                .validate(value)
                .map_err(|e| Error::InvalidInput(format!("{}: {}", name, e)))?;
        }

        let mut batch = WriteBatch::new();
        let mut report = SaveReport::default();
        let mut external: BTreeMap<&str, BTreeMap<String, Value>> = BTreeMap::new();

        for definition in self.schema.definitions() {
            let Some(value) = edits.get(&definition.name) else {
                continue;
            };
            if !definition.is_stored_globally()
                || same_value(value, &self.schema.default_for(definition))
            {
                batch.remove(Namespace::Global, definition.name.clone());
                report.removed.push(definition.name.clone());
            } else {
                batch.put(Namespace::Global, definition.name.clone(), value.clone());
                report.stored.push(definition.name.clone());
            }
            if let Some(store) = &definition.external_store {
                external
                    .entry(store.as_str())
                    .or_default()
                    .insert(definition.name.clone(), value.clone());
            }
        }

        for (store, values) in external {
            batch.merge(Namespace::External(store.to_string()), values);
            report.external_stores.push(store.to_string());
        }
        Ok((batch, report))
    }

    fn plan_entity(
        &self,
        edits: &BTreeMap<String, Value>,
        entity: EntityId,
        mode: &Mode,
    ) -> Result<(WriteBatch, SaveReport)> {
        if !self.schema.allows_override(mode) {
            return Err(Error::InvalidInput(format!(
                "entities of mode '{}' do not accept overrides",
                mode
            )));
        }

        let mut report = SaveReport::default();
        let mut values = BTreeMap::new();
        for (name, value) in edits {
            let definition = self
                .schema
                .get(name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown option '{}'", name)))?;
            if !definition.is_overridable_in(mode) || is_inherit(value) {
                report.dropped.push(name.clone());
                continue;
            }
            definition
                .kind
                .validate(value)
                .map_err(|e| Error::InvalidInput(format!("{}: {}", name, e)))?;
            values.insert(name.clone(), value.clone());
            report.stored.push(name.clone());
        }

        // Full replacement: overrides not in this submission are cleared.
        let mut batch = WriteBatch::new();
        batch.replace(Namespace::Entity(entity), values);
        Ok((batch, report))
    }

    /// Remove every stored global value of a registered option.
    pub fn reset(&mut self, auth: &Authorization) -> Result<SaveReport> {
        let age = self.authorize(&Scope::Global, auth)?;
        let stored = self.backend.load(&Namespace::Global)?;

        let mut batch = WriteBatch::new();
        let mut report = SaveReport {
            scope: Scope::Global.to_string(),
            token_age: Some(age),
            ..Default::default()
        };
        for definition in self.schema.definitions() {
            if stored.contains_key(&definition.name) {
                batch.remove(Namespace::Global, definition.name.clone());
                report.removed.push(definition.name.clone());
            }
        }

        self.backend.apply(batch)?;
        self.global.borrow_mut().take();
        tracing::info!(user = %auth.principal.name, removed = report.removed.len(), "options reset");
        Ok(report)
    }
}
