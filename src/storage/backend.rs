//! Storage backend trait and write batches.
//!
//! Option values live in three kinds of namespaces:
//! - `Global` - site-wide saved values
//! - `Entity(id)` - per-entity override maps
//! - `External(name)` - named stores owned by other components
//!
//! Backends implement key/value reads with a distinguished "missing" result
//! (`Ok(None)`) and commit whole [`WriteBatch`]es all-or-nothing.

use crate::Result;
use crate::models::{EntityId, Value};
use std::collections::BTreeMap;

/// A storage namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Site-wide saved values
    Global,
    /// Override map of one entity
    Entity(EntityId),
    /// Named external store
    External(String),
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Global => write!(f, "global"),
            Namespace::Entity(id) => write!(f, "entity:{}", id),
            Namespace::External(name) => write!(f, "external:{}", name),
        }
    }
}

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Store one key
    Put {
        namespace: Namespace,
        key: String,
        value: Value,
    },
    /// Delete one key (no-op if missing)
    Remove { namespace: Namespace, key: String },
    /// Replace the whole namespace with this map
    Replace {
        namespace: Namespace,
        values: BTreeMap<String, Value>,
    },
    /// Merge keys into the namespace, last write wins per key
    Merge {
        namespace: Namespace,
        values: BTreeMap<String, Value>,
    },
}

impl WriteOp {
    /// Namespace this operation touches.
    pub fn namespace(&self) -> &Namespace {
        match self {
            WriteOp::Put { namespace, .. }
            | WriteOp::Remove { namespace, .. }
            | WriteOp::Replace { namespace, .. }
            | WriteOp::Merge { namespace, .. } => namespace,
        }
    }

    /// Apply this operation to an in-memory copy of its namespace.
    pub fn apply_to(&self, map: &mut BTreeMap<String, Value>) {
        match self {
            WriteOp::Put { key, value, .. } => {
                map.insert(key.clone(), value.clone());
            }
            WriteOp::Remove { key, .. } => {
                map.remove(key);
            }
            WriteOp::Replace { values, .. } => {
                *map = values.clone();
            }
            WriteOp::Merge { values, .. } => {
                for (k, v) in values {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
    }
}

/// Ordered set of writes committed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, namespace: Namespace, key: impl Into<String>, value: Value) {
        self.ops.push(WriteOp::Put {
            namespace,
            key: key.into(),
            value,
        });
    }

    pub fn remove(&mut self, namespace: Namespace, key: impl Into<String>) {
        self.ops.push(WriteOp::Remove {
            namespace,
            key: key.into(),
        });
    }

    pub fn replace(&mut self, namespace: Namespace, values: BTreeMap<String, Value>) {
        self.ops.push(WriteOp::Replace { namespace, values });
    }

    pub fn merge(&mut self, namespace: Namespace, values: BTreeMap<String, Value>) {
        self.ops.push(WriteOp::Merge { namespace, values });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct namespaces touched, in first-touch order.
    pub fn namespaces(&self) -> Vec<&Namespace> {
        let mut seen: Vec<&Namespace> = Vec::new();
        for op in &self.ops {
            if !seen.contains(&op.namespace()) {
                seen.push(op.namespace());
            }
        }
        seen
    }
}

/// Trait for storage backends that handle option persistence.
pub trait StorageBackend: Send + Sync {
    /// Read one key; `Ok(None)` means the key is not stored.
    fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Value>> {
        Ok(self.load(namespace)?.remove(key))
    }

    /// Read a whole namespace (empty if never written).
    fn load(&self, namespace: &Namespace) -> Result<BTreeMap<String, Value>>;

    /// Commit every operation of the batch, or none of them.
    fn apply(&mut self, batch: WriteBatch) -> Result<()>;

    /// Get the storage location description (for display purposes).
    fn location(&self) -> String;

    /// Get the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Available storage backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// JSON files under the site data directory (default)
    File,
    /// Process memory, discarded on exit
    Memory,
}

impl BackendType {
    /// Parse a backend type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file" | "default" => Some(Self::File),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
