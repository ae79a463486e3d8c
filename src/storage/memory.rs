//! In-memory storage backend.

use crate::models::Value;
use crate::storage::backend::{Namespace, StorageBackend, WriteBatch};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Backend keeping every namespace in process memory.
///
/// Can be switched offline to exercise `StorageUnavailable` paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    namespaces: HashMap<Namespace, BTreeMap<String, Value>>,
    offline: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a namespace with values (test and embedding helper).
    pub fn with_values<I, K>(mut self, namespace: Namespace, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map = self.namespaces.entry(namespace).or_default();
        for (k, v) in values {
            map.insert(k.into(), v);
        }
        self
    }

    /// Make every read and write fail with `StorageUnavailable`.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            Err(Error::StorageUnavailable(
                "memory backend is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Value>> {
        self.check_online()?;
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|map| map.get(key))
            .cloned())
    }

    fn load(&self, namespace: &Namespace) -> Result<BTreeMap<String, Value>> {
        self.check_online()?;
        Ok(self.namespaces.get(namespace).cloned().unwrap_or_default())
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        self.check_online()?;
        // Stage on copies so a batch is never half-applied.
        let mut staged: HashMap<Namespace, BTreeMap<String, Value>> = HashMap::new();
        for op in batch.ops() {
            let map = staged.entry(op.namespace().clone()).or_insert_with(|| {
                self.namespaces
                    .get(op.namespace())
                    .cloned()
                    .unwrap_or_default()
            });
            op.apply_to(map);
        }
        self.namespaces.extend(staged);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityId;
    use serde_json::json;

    #[test]
    fn test_missing_key_is_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get(&Namespace::Global, "nope").unwrap(), None);
        assert!(backend.load(&Namespace::Global).unwrap().is_empty());
    }

    #[test]
    fn test_seeded_values() {
        let backend =
            MemoryBackend::new().with_values(Namespace::Global, [("excerpt_length", json!(35))]);
        assert_eq!(
            backend.get(&Namespace::Global, "excerpt_length").unwrap(),
            Some(json!(35))
        );
    }

    #[test]
    fn test_apply_batch_across_namespaces() {
        let entity = Namespace::Entity(EntityId::new(42).unwrap());
        let mut backend = MemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.put(Namespace::Global, "a", json!(1));
        batch.put(entity.clone(), "b", json!(2));
        backend.apply(batch).unwrap();

        assert_eq!(backend.get(&Namespace::Global, "a").unwrap(), Some(json!(1)));
        assert_eq!(backend.get(&entity, "b").unwrap(), Some(json!(2)));
        assert_eq!(backend.get(&Namespace::Global, "b").unwrap(), None);
    }

    #[test]
    fn test_offline_backend_fails_reads_and_writes() {
        let mut backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.get(&Namespace::Global, "a"),
            Err(Error::StorageUnavailable(_))
        ));
        let mut batch = WriteBatch::new();
        batch.put(Namespace::Global, "a", json!(1));
        assert!(matches!(
            backend.apply(batch),
            Err(Error::StorageUnavailable(_))
        ));

        backend.set_offline(false);
        assert_eq!(backend.get(&Namespace::Global, "a").unwrap(), None);
    }
}
