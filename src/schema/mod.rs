//! Option schema: the registry of option definitions.
//!
//! A [`Schema`] is built once per process through [`SchemaBuilder`] (or loaded
//! from a KDL file, see [`kdl`]) and is read-only afterwards. It owns:
//! - the option definitions, in declaration order
//! - computed-default providers
//! - the mode hierarchy used for parent-mode fallback
//! - which modes accept per-entity overrides, and the capability type
//!   required to edit entities of each mode
//! - fallback stores consulted for names the schema does not register

pub mod kdl;

use crate::models::{DefaultValue, Dependency, Mode, OptionDefinition, OptionKey, Value};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Function computing an option's default from its name.
pub type DefaultProvider = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Modes that accept entity overrides when a schema declares none.
pub const DEFAULT_OVERRIDE_MODES: [&str; 2] = ["page", "post"];

/// Capability type required to edit an entity when its mode declares none.
pub const DEFAULT_CAPABILITY_TYPE: &str = "page";

/// Immutable registry of option definitions.
pub struct Schema {
    definitions: Vec<OptionDefinition>,
    index: HashMap<String, usize>,
    providers: HashMap<String, DefaultProvider>,
    mode_parents: HashMap<Mode, Mode>,
    override_modes: Vec<Mode>,
    capability_types: HashMap<Mode, String>,
    fallback_stores: Vec<String>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("definitions", &self.definitions.len())
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("mode_parents", &self.mode_parents)
            .field("override_modes", &self.override_modes)
            .field("fallback_stores", &self.fallback_stores)
            .finish()
    }
}

impl Schema {
    /// Start building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Option<&OptionDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    /// Raw submitted text as a value of the named option's kind; text for
    /// unregistered names.
    pub fn coerce(&self, name: &str, raw: &str) -> Value {
        match self.get(name) {
            Some(definition) => definition.kind.coerce(raw),
            None => Value::String(raw.to_string()),
        }
    }

    /// Whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All definitions in declaration order.
    pub fn definitions(&self) -> &[OptionDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Whether `name` can be resolved in `mode`: either the bare name or
    /// its mode-qualified variant is registered.
    pub fn is_known(&self, name: &str, mode: Option<&Mode>) -> bool {
        if self.contains(name) {
            return true;
        }
        mode.is_some_and(|m| self.contains(&OptionKey::scoped(name, m.clone()).storage_key()))
    }

    /// Computed default of a definition.
    pub fn default_for(&self, definition: &OptionDefinition) -> Value {
        match &definition.default {
            DefaultValue::Static(value) => value.clone(),
            // Providers are checked at build time, so a miss cannot happen here.
            DefaultValue::Computed(provider) => self
                .providers
                .get(provider)
                .map(|f| f(&definition.name))
                .unwrap_or(Value::Null),
        }
    }

    /// Computed default of a registered option.
    pub fn default_of(&self, name: &str) -> Result<Value> {
        self.get(name)
            .map(|def| self.default_for(def))
            .ok_or_else(|| Error::UnknownOption(name.to_string()))
    }

    /// Parent of a mode, used as the fallback after the mode itself.
    ///
    /// Explicit schema entries win; otherwise `post` falls back to `blog`
    /// and `xxx_single` falls back to `xxx`.
    pub fn parent_mode(&self, mode: &Mode) -> Option<Mode> {
        let parent = if let Some(parent) = self.mode_parents.get(mode) {
            Some(parent.clone())
        } else if mode.as_str() == "post" {
            Mode::new("blog")
        } else {
            mode.as_str()
                .strip_suffix("_single")
                .and_then(Mode::new)
        };
        parent.filter(|p| p != mode)
    }

    /// Whether entities of `mode` accept overrides at all.
    pub fn allows_override(&self, mode: &Mode) -> bool {
        self.override_modes.contains(mode)
    }

    /// Modes that accept entity overrides.
    pub fn override_modes(&self) -> &[Mode] {
        &self.override_modes
    }

    /// Definitions overridable for entities of `mode`, in declaration order.
    pub fn overridable_in<'a>(
        &'a self,
        mode: &'a Mode,
    ) -> impl Iterator<Item = &'a OptionDefinition> + 'a {
        self.definitions
            .iter()
            .filter(move |def| def.is_overridable_in(mode))
    }

    /// Capability type needed to edit entities of `mode`.
    pub fn capability_type_for(&self, mode: &Mode) -> &str {
        self.capability_types
            .get(mode)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CAPABILITY_TYPE)
    }

    /// External stores consulted, in order, for unregistered names.
    pub fn fallback_stores(&self) -> &[String] {
        &self.fallback_stores
    }

    /// Every option that carries a dependency, in declaration order.
    pub fn dependencies(&self) -> Vec<(&str, &Dependency)> {
        self.definitions
            .iter()
            .filter_map(|def| def.dependency.as_ref().map(|dep| (def.name.as_str(), dep)))
            .collect()
    }
}

/// Builder for [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    definitions: Vec<OptionDefinition>,
    providers: HashMap<String, DefaultProvider>,
    mode_parents: Vec<(String, String)>,
    override_modes: Option<Vec<String>>,
    capability_types: Vec<(String, String)>,
    fallback_stores: Vec<String>,
}

impl SchemaBuilder {
    /// Register an option definition.
    pub fn option(mut self, definition: OptionDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Register a computed-default provider.
    pub fn provider<F>(mut self, name: impl Into<String>, provider: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.providers.insert(name.into(), Arc::new(provider));
        self
    }

    /// Declare an explicit parent for a mode.
    pub fn parent(mut self, mode: impl Into<String>, parent: impl Into<String>) -> Self {
        self.mode_parents.push((mode.into(), parent.into()));
        self
    }

    /// Replace the modes that accept entity overrides.
    pub fn override_modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.override_modes = Some(modes.into_iter().map(Into::into).collect());
        self
    }

    /// Capability type required to edit entities of `mode`.
    pub fn capability(mut self, mode: impl Into<String>, capability: impl Into<String>) -> Self {
        self.capability_types.push((mode.into(), capability.into()));
        self
    }

    /// Consult an external store for names the schema does not register.
    pub fn fallback_store(mut self, store: impl Into<String>) -> Self {
        self.fallback_stores.push(store.into());
        self
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> Result<Schema> {
        let mut index = HashMap::with_capacity(self.definitions.len());
        for (i, def) in self.definitions.iter().enumerate() {
            if def.name.trim().is_empty() {
                return Err(Error::Schema("option name must not be empty".to_string()));
            }
            if index.insert(def.name.clone(), i).is_some() {
                return Err(Error::Schema(format!("duplicate option '{}'", def.name)));
            }
        }

        let names: HashSet<&str> = self.definitions.iter().map(|d| d.name.as_str()).collect();
        for def in &self.definitions {
            match &def.default {
                DefaultValue::Computed(provider) if !self.providers.contains_key(provider) => {
                    return Err(Error::Schema(format!(
                        "option '{}' uses unknown default provider '{}'",
                        def.name, provider
                    )));
                }
                DefaultValue::Static(value) => {
                    def.kind.validate(value).map_err(|e| {
                        Error::Schema(format!("option '{}' has an invalid default: {}", def.name, e))
                    })?;
                }
                _ => {}
            }
            if let Some(dep) = &def.dependency {
                for referenced in dep.referenced_options() {
                    if !names.contains(referenced) {
                        return Err(Error::Schema(format!(
                            "option '{}' depends on unknown option '{}'",
                            def.name, referenced
                        )));
                    }
                }
            }
        }

        let mut mode_parents = HashMap::new();
        for (mode, parent) in self.mode_parents {
            let (Some(mode), Some(parent)) = (Mode::new(mode), Mode::new(parent)) else {
                return Err(Error::Schema("mode parents need two non-empty modes".to_string()));
            };
            mode_parents.insert(mode, parent);
        }

        let override_modes = match self.override_modes {
            Some(modes) => modes.into_iter().filter_map(Mode::new).collect(),
            None => DEFAULT_OVERRIDE_MODES
                .iter()
                .filter_map(|m| Mode::new(*m))
                .collect(),
        };

        let capability_types = self
            .capability_types
            .into_iter()
            .filter_map(|(mode, cap)| Mode::new(mode).map(|m| (m, cap)))
            .collect();

        Ok(Schema {
            definitions: self.definitions,
            index,
            providers: self.providers,
            mode_parents,
            override_modes,
            capability_types,
            fallback_stores: self.fallback_stores,
        })
    }
}
