//! Layered option resolution.
//!
//! A [`RequestContext`] is built once per request. It owns the schema, the
//! storage backend, the request's mode and entity, the transient request
//! overrides, and lazily filled caches of everything read from storage.
//!
//! Resolution walks an explicit precedence chain (see [`precedence_chain`]);
//! the first layer yielding a present value that is not `inherit` wins.

mod save;

pub use save::{SaveReport, Scope};

use crate::auth::NonceIssuer;
use crate::config::Resolved;
use crate::models::{EntityId, Mode, OptionKey, Value, inherit, is_inherit};
use crate::schema::Schema;
use crate::storage::{Namespace, StorageBackend};
use crate::{Error, Result};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Where a resolved option value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "layer", content = "key", rename_all = "lowercase")]
pub enum OptionSource {
    /// Request override under this flat key
    Request(String),
    /// Override stored on this entity
    Entity(EntityId),
    /// Global store under this flat key
    Global(String),
    /// Named external store
    External(String),
    /// The option's computed default
    Default,
    /// Nothing matched; caller fallback
    Fallback,
}

impl std::fmt::Display for OptionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionSource::Request(key) => write!(f, "request:{}", key),
            OptionSource::Entity(id) => write!(f, "entity:{}", id),
            OptionSource::Global(key) => write!(f, "global:{}", key),
            OptionSource::External(store) => write!(f, "external:{}", store),
            OptionSource::Default => write!(f, "default"),
            OptionSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A resolved option value.
pub type ResolvedValue = Resolved<Value, OptionSource>;

/// Transient per-request overrides (query string parameters).
///
/// Values are kept as the raw text submitted and only typed against the
/// definition they override when read. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOverrides {
    values: HashMap<String, String>,
}

impl RequestOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a URL query string (`a=1&b_post=left`), with or without `?`.
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let values = pairs
            .into_iter()
            .filter(|(k, _)| !k.as_ref().is_empty())
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, key: impl Into<String>, raw: impl Into<String>) {
        self.values.insert(key.into(), raw.into());
    }

    /// Raw text submitted for `key`.
    pub fn get(&self, key: &OptionKey) -> Option<&str> {
        self.values.get(&key.storage_key()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// The seven positions of the precedence chain, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    RequestMode,
    RequestBare,
    Entity,
    GlobalMode,
    GlobalParentMode,
    GlobalBare,
    Default,
}

impl Slot {
    pub const ALL: [Slot; 7] = [
        Slot::RequestMode,
        Slot::RequestBare,
        Slot::Entity,
        Slot::GlobalMode,
        Slot::GlobalParentMode,
        Slot::GlobalBare,
        Slot::Default,
    ];
}

/// One concrete place a value can come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Request(OptionKey),
    Entity { entity: EntityId, name: String },
    Global(OptionKey),
    Default(String),
}

impl Layer {
    fn for_slot(
        slot: Slot,
        schema: &Schema,
        name: &str,
        mode: Option<&Mode>,
        entity: Option<EntityId>,
    ) -> Option<Layer> {
        match slot {
            Slot::RequestMode => mode.map(|m| Layer::Request(OptionKey::scoped(name, m.clone()))),
            Slot::RequestBare => Some(Layer::Request(OptionKey::bare(name))),
            Slot::Entity => entity.map(|entity| Layer::Entity {
                entity,
                name: name.to_string(),
            }),
            Slot::GlobalMode => mode.map(|m| Layer::Global(OptionKey::scoped(name, m.clone()))),
            Slot::GlobalParentMode => mode
                .and_then(|m| schema.parent_mode(m))
                .map(|parent| Layer::Global(OptionKey::scoped(name, parent))),
            Slot::GlobalBare => Some(Layer::Global(OptionKey::bare(name))),
            Slot::Default => schema
                .contains(name)
                .then(|| Layer::Default(name.to_string())),
        }
    }

    /// Flat key this layer reads, for display.
    pub fn describe(&self) -> String {
        match self {
            Layer::Request(key) => format!("request:{}", key),
            Layer::Entity { entity, name } => format!("entity:{}:{}", entity, name),
            Layer::Global(key) => format!("global:{}", key),
            Layer::Default(name) => format!("default:{}", name),
        }
    }
}

/// Build the precedence chain for `name`, highest precedence first.
///
/// Layers that do not apply (no mode, no entity, no parent mode, no bare
/// definition) are left out.
pub fn precedence_chain(
    schema: &Schema,
    name: &str,
    mode: Option<&Mode>,
    entity: Option<EntityId>,
) -> Vec<Layer> {
    Slot::ALL
        .iter()
        .filter_map(|slot| Layer::for_slot(*slot, schema, name, mode, entity))
        .collect()
}

/// What a single layer yielded during [`RequestContext::explain`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Outcome {
    Value(Value),
    Inherit,
    Missing,
    /// The layer does not apply to this request
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerTrace {
    pub slot: Slot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    pub outcome: Outcome,
}

/// Full trace of a resolution.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub name: String,
    pub mode: Option<Mode>,
    pub entity: Option<EntityId>,
    pub known: bool,
    pub layers: Vec<LayerTrace>,
    /// Index into `layers` of the winning layer
    pub winner: Option<usize>,
    pub value: Value,
    pub source: OptionSource,
}

/// Per-request resolution context.
pub struct RequestContext {
    schema: Arc<Schema>,
    backend: Box<dyn StorageBackend>,
    mode: Option<Mode>,
    entity: Option<EntityId>,
    overrides: RequestOverrides,
    strict: bool,
    nonces: Option<NonceIssuer>,
    global: RefCell<Option<BTreeMap<String, Value>>>,
    entities: RefCell<HashMap<EntityId, BTreeMap<String, Value>>>,
    externals: RefCell<HashMap<String, BTreeMap<String, Value>>>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("backend", &self.backend.backend_type())
            .field("mode", &self.mode)
            .field("entity", &self.entity)
            .field("overrides", &self.overrides.len())
            .field("strict", &self.strict)
            .finish()
    }
}

impl RequestContext {
    /// Create a strict context with no mode, entity or overrides.
    pub fn new(schema: Arc<Schema>, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            schema,
            backend,
            mode: None,
            entity: None,
            overrides: RequestOverrides::default(),
            strict: true,
            nonces: None,
            global: RefCell::new(None),
            entities: RefCell::new(HashMap::new()),
            externals: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_mode(mut self, mode: Option<Mode>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_entity(mut self, entity: Option<EntityId>) -> Self {
        self.entity = entity;
        self
    }

    pub fn with_overrides(mut self, overrides: RequestOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Strict contexts reject unregistered option names.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_nonces(mut self, issuer: NonceIssuer) -> Self {
        self.nonces = Some(issuer);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn mode(&self) -> Option<&Mode> {
        self.mode.as_ref()
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    pub fn nonces(&self) -> Option<&NonceIssuer> {
        self.nonces.as_ref()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Drop every cached read; the next lookup hits storage again.
    pub fn reload(&self) {
        self.global.borrow_mut().take();
        self.entities.borrow_mut().clear();
        self.externals.borrow_mut().clear();
        tracing::debug!("request caches cleared");
    }

    // ==================== Cached storage reads ====================

    fn global_value(&self, key: &str) -> Result<Option<Value>> {
        let mut slot = self.global.borrow_mut();
        if slot.is_none() {
            let loaded = self.backend.load(&Namespace::Global)?;
            tracing::debug!(keys = loaded.len(), "loaded global snapshot");
            *slot = Some(loaded);
        }
        Ok(slot.get_or_insert_with(BTreeMap::new).get(key).cloned())
    }

    fn entity_override(&self, entity: EntityId, name: &str) -> Result<Option<Value>> {
        let mut cache = self.entities.borrow_mut();
        if !cache.contains_key(&entity) {
            let loaded = self.backend.load(&Namespace::Entity(entity))?;
            tracing::debug!(%entity, keys = loaded.len(), "loaded entity overrides");
            cache.insert(entity, loaded);
        }
        Ok(cache.entry(entity).or_default().get(name).cloned())
    }

    fn external_value(&self, store: &str, key: &str) -> Result<Option<Value>> {
        let mut cache = self.externals.borrow_mut();
        if !cache.contains_key(store) {
            let loaded = self.backend.load(&Namespace::External(store.to_string()))?;
            cache.insert(store.to_string(), loaded);
        }
        Ok(cache
            .entry(store.to_string())
            .or_default()
            .get(key)
            .cloned())
    }

    // ==================== Resolution ====================

    /// Raw value a layer holds, with the source it would be reported as.
    fn evaluate(&self, layer: &Layer) -> Result<Option<(Value, OptionSource)>> {
        Ok(match layer {
            Layer::Request(key) => self.overrides.get(key).map(|raw| {
                (
                    self.request_value(key, raw),
                    OptionSource::Request(key.storage_key()),
                )
            }),
            Layer::Entity { entity, name } => self
                .entity_override(*entity, name)?
                .map(|v| (v, OptionSource::Entity(*entity))),
            Layer::Global(key) => {
                let flat = key.storage_key();
                match self.global_value(&flat)? {
                    Some(v) => Some((v, OptionSource::Global(flat))),
                    // A registered mode variant falls back to its own default.
                    None if key.mode.is_some() => self
                        .schema
                        .get(&flat)
                        .map(|def| (self.schema.default_for(def), OptionSource::Global(flat))),
                    None => None,
                }
            }
            Layer::Default(name) => self
                .schema
                .get(name)
                .map(|def| (self.schema.default_for(def), OptionSource::Default)),
        })
    }

    /// Type a raw request value by the mode variant's definition, else the
    /// bare option's.
    fn request_value(&self, key: &OptionKey, raw: &str) -> Value {
        let flat = key.storage_key();
        if self.schema.contains(&flat) {
            self.schema.coerce(&flat, raw)
        } else {
            self.schema.coerce(&key.name, raw)
        }
    }

    fn walk_chain(
        &self,
        name: &str,
        mode: Option<&Mode>,
        entity: Option<EntityId>,
    ) -> Result<Option<ResolvedValue>> {
        for layer in precedence_chain(&self.schema, name, mode, entity) {
            if let Some((value, source)) = self.evaluate(&layer)? {
                if !is_inherit(&value) {
                    tracing::debug!(option = name, layer = %layer.describe(), "resolved");
                    return Ok(Some(Resolved::new(value, source)));
                }
            }
        }
        Ok(None)
    }

    fn from_fallback_stores(&self, name: &str) -> Result<Option<ResolvedValue>> {
        for store in self.schema.fallback_stores() {
            if let Some(value) = self.external_value(store, name)? {
                if !is_inherit(&value) {
                    return Ok(Some(Resolved::new(
                        value,
                        OptionSource::External(store.clone()),
                    )));
                }
            }
        }
        Ok(None)
    }

    fn lookup(
        &self,
        name: &str,
        mode: Option<&Mode>,
        entity: Option<EntityId>,
    ) -> Result<Option<ResolvedValue>> {
        if self.schema.is_known(name, mode) {
            if let Some(resolved) = self.walk_chain(name, mode, entity)? {
                return Ok(Some(resolved));
            }
        }
        self.from_fallback_stores(name)
    }

    /// Resolve `name` for `mode` and `entity`.
    ///
    /// Strict contexts fail with `UnknownOption` for names that are neither
    /// registered nor present in a fallback store; lenient contexts return
    /// `null` with [`OptionSource::Fallback`].
    pub fn resolve(
        &self,
        name: &str,
        mode: Option<&Mode>,
        entity: Option<EntityId>,
    ) -> Result<ResolvedValue> {
        match self.lookup(name, mode, entity)? {
            Some(resolved) => Ok(resolved),
            None if self.strict && !self.schema.is_known(name, mode) => {
                Err(Error::UnknownOption(name.to_string()))
            }
            None => Ok(Resolved::new(Value::Null, OptionSource::Fallback)),
        }
    }

    /// Resolve leniently, returning `fallback` when nothing matches.
    pub fn resolve_or(
        &self,
        name: &str,
        mode: Option<&Mode>,
        entity: Option<EntityId>,
        fallback: Value,
    ) -> Result<ResolvedValue> {
        Ok(self
            .lookup(name, mode, entity)?
            .unwrap_or_else(|| Resolved::new(fallback, OptionSource::Fallback)))
    }

    /// Resolve `name` in this request's own mode and entity.
    pub fn get(&self, name: &str) -> Result<Value> {
        let mode = self.mode.clone();
        Ok(self.resolve(name, mode.as_ref(), self.entity)?.value)
    }

    /// Raw entity override for `name`, or `inherit` when none is stored.
    pub fn entity_value(&self, name: &str, entity: EntityId) -> Result<Value> {
        Ok(self.entity_override(entity, name)?.unwrap_or_else(inherit))
    }

    /// Trace every layer of the chain for `name`.
    pub fn explain(
        &self,
        name: &str,
        mode: Option<&Mode>,
        entity: Option<EntityId>,
    ) -> Result<Explanation> {
        let known = self.schema.is_known(name, mode);
        let mut layers = Vec::with_capacity(Slot::ALL.len());
        let mut winner = None;

        for slot in Slot::ALL {
            let Some(layer) = Layer::for_slot(slot, &self.schema, name, mode, entity) else {
                layers.push(LayerTrace {
                    slot,
                    layer: None,
                    outcome: Outcome::Skipped,
                });
                continue;
            };
            let outcome = if !known {
                Outcome::Skipped
            } else {
                match self.evaluate(&layer)? {
                    Some((value, _)) if is_inherit(&value) => Outcome::Inherit,
                    Some((value, _)) => {
                        if winner.is_none() {
                            winner = Some(layers.len());
                        }
                        Outcome::Value(value)
                    }
                    None => Outcome::Missing,
                }
            };
            layers.push(LayerTrace {
                slot,
                layer: Some(layer.describe()),
                outcome,
            });
        }

        let resolved = self.resolve_or(name, mode, entity, Value::Null)?;
        Ok(Explanation {
            name: name.to_string(),
            mode: mode.cloned(),
            entity,
            known,
            layers,
            winner,
            value: resolved.value,
            source: resolved.source,
        })
    }

    /// Whether `name` should be shown, given its dependency.
    ///
    /// Referenced options are resolved in this request's mode and entity.
    pub fn is_visible(&self, name: &str) -> Result<bool> {
        let definition = self
            .schema
            .get(name)
            .ok_or_else(|| Error::UnknownOption(name.to_string()))?;
        let Some(dependency) = &definition.dependency else {
            return Ok(true);
        };
        let mode = self.mode.clone();
        for condition in &dependency.conditions {
            let value = self
                .resolve_or(&condition.option, mode.as_ref(), self.entity, Value::Null)?
                .value;
            if !condition.predicate.matches(&value) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{OptionDefinition, OptionKind, Predicate};
    use crate::storage::MemoryBackend;
    use serde_json::json;

    pub(crate) fn mode(tag: &str) -> Mode {
        Mode::new(tag).unwrap()
    }

    pub(crate) fn id(n: u64) -> EntityId {
        EntityId::new(n).unwrap()
    }

    pub(crate) fn blog_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .option(
                    OptionDefinition::new("excerpt_length", OptionKind::Text, json!(20))
                        .overridable_in(["post"]),
                )
                .option(
                    OptionDefinition::new("sidebar", OptionKind::Text, json!("right"))
                        .overridable_in(["post", "page"]),
                )
                .option(OptionDefinition::new("sidebar_post", OptionKind::Text, json!("inherit")))
                .option(OptionDefinition::new(
                    "blog_style",
                    OptionKind::Text,
                    json!("excerpt"),
                ))
                .option(
                    OptionDefinition::new("show_author", OptionKind::Checkbox, json!(true))
                        .depends_on("blog_style", Predicate::OneOf(vec!["classic".into()])),
                )
                .parent("child", "parent")
                .fallback_store("addons")
                .build()
                .unwrap(),
        )
    }

    fn ctx(backend: MemoryBackend) -> RequestContext {
        RequestContext::new(blog_schema(), Box::new(backend))
    }

    #[test]
    fn test_precedence_chain_full() {
        let schema = blog_schema();
        let chain = precedence_chain(&schema, "sidebar", Some(&mode("post")), Some(id(42)));
        let described: Vec<String> = chain.iter().map(Layer::describe).collect();
        assert_eq!(
            described,
            vec![
                "request:sidebar_post",
                "request:sidebar",
                "entity:42:sidebar",
                "global:sidebar_post",
                "global:sidebar_blog",
                "global:sidebar",
                "default:sidebar",
            ]
        );
    }

    #[test]
    fn test_precedence_chain_without_mode_or_entity() {
        let schema = blog_schema();
        let chain = precedence_chain(&schema, "sidebar", None, None);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], Layer::Request(OptionKey::bare("sidebar")));
    }

    #[test]
    fn test_defaults_when_nothing_stored() {
        let ctx = ctx(MemoryBackend::new());
        let resolved = ctx.resolve("excerpt_length", None, None).unwrap();
        assert_eq!(resolved.value, json!(20));
        assert_eq!(resolved.source, OptionSource::Default);
    }

    #[test]
    fn test_global_value_beats_default() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Global, [("excerpt_length", json!(35))]);
        let resolved = ctx(backend).resolve("excerpt_length", None, None).unwrap();
        assert_eq!(resolved.value, json!(35));
        assert_eq!(resolved.source, OptionSource::Global("excerpt_length".to_string()));
    }

    #[test]
    fn test_request_override_wins_over_everything() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Global, [("sidebar", json!("left"))])
            .with_values(Namespace::Entity(id(42)), [("sidebar", json!("none"))]);
        let ctx = ctx(backend)
            .with_overrides(RequestOverrides::from_query("?sidebar=top&unrelated=1"));

        let resolved = ctx.resolve("sidebar", Some(&mode("post")), Some(id(42))).unwrap();
        assert_eq!(resolved.value, json!("top"));
        assert_eq!(resolved.source, OptionSource::Request("sidebar".to_string()));
    }

    #[test]
    fn test_mode_request_override_beats_bare() {
        let ctx = ctx(MemoryBackend::new())
            .with_overrides(RequestOverrides::from_query("sidebar=top&sidebar_post=bottom"));
        let resolved = ctx.resolve("sidebar", Some(&mode("post")), None).unwrap();
        assert_eq!(resolved.value, json!("bottom"));
    }

    #[test]
    fn test_request_inherit_is_transparent() {
        let backend =
            MemoryBackend::new().with_values(Namespace::Global, [("sidebar", json!("left"))]);
        let ctx = ctx(backend).with_overrides(RequestOverrides::from_query("sidebar=inherit"));
        assert_eq!(ctx.resolve("sidebar", None, None).unwrap().value, json!("left"));
    }

    #[test]
    fn test_entity_inherit_falls_through_to_mode_value() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Entity(id(42)), [("sidebar", json!("inherit"))])
            .with_values(Namespace::Global, [("sidebar_post", json!("left"))]);
        let resolved = ctx(backend)
            .resolve("sidebar", Some(&mode("post")), Some(id(42)))
            .unwrap();
        assert_eq!(resolved.value, json!("left"));
        assert_eq!(resolved.source, OptionSource::Global("sidebar_post".to_string()));
    }

    #[test]
    fn test_entity_inherit_with_global_value() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Entity(id(7)), [("sidebar", json!("inherit"))])
            .with_values(Namespace::Global, [("sidebar", json!("X"))]);
        let value = ctx(backend).resolve("sidebar", None, Some(id(7))).unwrap().value;
        assert_eq!(value, json!("X"));
    }

    #[test]
    fn test_entity_override_beats_global() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Entity(id(42)), [("sidebar", json!("none"))])
            .with_values(Namespace::Global, [("sidebar_post", json!("left"))]);
        let resolved = ctx(backend)
            .resolve("sidebar", Some(&mode("post")), Some(id(42)))
            .unwrap();
        assert_eq!(resolved.value, json!("none"));
        assert_eq!(resolved.source, OptionSource::Entity(id(42)));
    }

    #[test]
    fn test_registered_mode_variant_default_inherit_is_skipped() {
        // sidebar_post is registered with default "inherit" and not stored.
        let backend =
            MemoryBackend::new().with_values(Namespace::Global, [("sidebar", json!("left"))]);
        let value = ctx(backend)
            .resolve("sidebar", Some(&mode("post")), None)
            .unwrap()
            .value;
        assert_eq!(value, json!("left"));
    }

    #[test]
    fn test_parent_mode_fallback() {
        let backend =
            MemoryBackend::new().with_values(Namespace::Global, [("sidebar_parent", json!("wide"))]);
        let resolved = ctx(backend)
            .resolve("sidebar", Some(&mode("child")), None)
            .unwrap();
        assert_eq!(resolved.value, json!("wide"));
        assert_eq!(resolved.source, OptionSource::Global("sidebar_parent".to_string()));
    }

    #[test]
    fn test_post_falls_back_to_blog() {
        let backend =
            MemoryBackend::new().with_values(Namespace::Global, [("excerpt_length_blog", json!(60))]);
        let value = ctx(backend)
            .resolve("excerpt_length", Some(&mode("post")), None)
            .unwrap()
            .value;
        assert_eq!(value, json!(60));
    }

    #[test]
    fn test_unknown_option_strict_and_lenient() {
        let strict = ctx(MemoryBackend::new());
        assert!(matches!(
            strict.resolve("nope", None, None),
            Err(Error::UnknownOption(name)) if name == "nope"
        ));

        let lenient = ctx(MemoryBackend::new()).strict(false);
        let resolved = lenient.resolve("nope", None, None).unwrap();
        assert_eq!(resolved.value, Value::Null);
        assert_eq!(resolved.source, OptionSource::Fallback);

        let with_fallback = strict.resolve_or("nope", None, None, json!("dflt")).unwrap();
        assert_eq!(with_fallback.value, json!("dflt"));
    }

    #[test]
    fn test_unknown_option_found_in_fallback_store() {
        let backend = MemoryBackend::new().with_values(
            Namespace::External("addons".to_string()),
            [("api_key", json!("k-123"))],
        );
        let resolved = ctx(backend).resolve("api_key", None, None).unwrap();
        assert_eq!(resolved.value, json!("k-123"));
        assert_eq!(resolved.source, OptionSource::External("addons".to_string()));
    }

    #[test]
    fn test_unknown_name_ignores_request_overrides() {
        let ctx = ctx(MemoryBackend::new()).with_overrides(RequestOverrides::from_query("nope=1"));
        assert!(ctx.resolve("nope", None, None).is_err());
    }

    #[test]
    fn test_storage_errors_propagate() {
        let mut backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            ctx(backend).resolve("sidebar", None, None),
            Err(Error::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_global_snapshot_cached_until_reload() {
        let backend =
            MemoryBackend::new().with_values(Namespace::Global, [("sidebar", json!("left"))]);
        let ctx = ctx(backend);
        assert_eq!(ctx.get("sidebar").unwrap(), json!("left"));
        // Cached: a second read gives the same answer without reloading.
        assert_eq!(ctx.get("sidebar").unwrap(), json!("left"));
        ctx.reload();
        assert_eq!(ctx.get("sidebar").unwrap(), json!("left"));
    }

    #[test]
    fn test_get_uses_context_mode_and_entity() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Entity(id(3)), [("sidebar", json!("none"))]);
        let ctx = ctx(backend)
            .with_mode(Mode::new("page"))
            .with_entity(EntityId::new(3));
        assert_eq!(ctx.get("sidebar").unwrap(), json!("none"));
    }

    #[test]
    fn test_entity_value_defaults_to_inherit() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Entity(id(5)), [("sidebar", json!("left"))]);
        let ctx = ctx(backend);
        assert_eq!(ctx.entity_value("sidebar", id(5)).unwrap(), json!("left"));
        assert_eq!(ctx.entity_value("excerpt_length", id(5)).unwrap(), inherit());
    }

    #[test]
    fn test_explain_marks_winner_and_skipped_layers() {
        let backend = MemoryBackend::new()
            .with_values(Namespace::Entity(id(42)), [("sidebar", json!("inherit"))])
            .with_values(Namespace::Global, [("sidebar_post", json!("left"))]);
        let explanation = ctx(backend)
            .explain("sidebar", Some(&mode("post")), Some(id(42)))
            .unwrap();

        assert!(explanation.known);
        assert_eq!(explanation.layers.len(), 7);
        assert_eq!(explanation.layers[0].outcome, Outcome::Missing);
        assert_eq!(explanation.layers[2].outcome, Outcome::Inherit);
        assert_eq!(explanation.layers[3].outcome, Outcome::Value(json!("left")));
        assert_eq!(explanation.winner, Some(3));
        assert_eq!(explanation.value, json!("left"));
    }

    #[test]
    fn test_explain_without_mode_skips_mode_layers() {
        let explanation = ctx(MemoryBackend::new())
            .explain("sidebar", None, None)
            .unwrap();
        assert_eq!(explanation.layers[0].outcome, Outcome::Skipped);
        assert_eq!(explanation.layers[2].outcome, Outcome::Skipped);
        assert_eq!(explanation.winner, Some(6));
        assert_eq!(explanation.source, OptionSource::Default);
    }

    #[test]
    fn test_visibility_follows_dependency() {
        let hidden = ctx(MemoryBackend::new());
        assert!(!hidden.is_visible("show_author").unwrap());
        assert!(hidden.is_visible("sidebar").unwrap());

        let shown = ctx(MemoryBackend::new())
            .with_overrides(RequestOverrides::from_query("blog_style=classic"));
        assert!(shown.is_visible("show_author").unwrap());

        assert!(matches!(
            hidden.is_visible("nope"),
            Err(Error::UnknownOption(_))
        ));
    }

    #[test]
    fn test_request_overrides_decode_values() {
        let overrides = RequestOverrides::from_query("a=35&b=hello%20world&c=true&=x");
        assert_eq!(overrides.len(), 3);
        assert_eq!(overrides.get(&OptionKey::bare("a")), Some("35"));
        assert_eq!(overrides.get(&OptionKey::bare("b")), Some("hello world"));
        assert_eq!(overrides.get(&OptionKey::bare("c")), Some("true"));
    }

    #[test]
    fn test_request_values_typed_by_definition() {
        let schema = Arc::new(
            Schema::builder()
                .option(OptionDefinition::new("title", OptionKind::Text, json!("")))
                .option(OptionDefinition::new(
                    "columns",
                    OptionKind::Range {
                        min: 1.0,
                        max: 6.0,
                        step: 1.0,
                    },
                    json!(3),
                ))
                .option(OptionDefinition::new("show_author", OptionKind::Checkbox, json!(true)))
                .build()
                .unwrap(),
        );
        let ctx = RequestContext::new(schema, Box::new(MemoryBackend::new())).with_overrides(
            RequestOverrides::from_query("title=1.10&columns=4&show_author=0"),
        );

        assert_eq!(ctx.resolve("title", None, None).unwrap().value, json!("1.10"));
        assert_eq!(ctx.resolve("columns", None, None).unwrap().value, json!(4));
        assert_eq!(ctx.resolve("show_author", None, None).unwrap().value, json!(false));
    }
}
