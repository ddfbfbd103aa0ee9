use super::pubsub::PubSub;
use super::{Backend, Capabilities, KeyOrder, Operation};
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// In-process map backend. Ordering is emulated by materializing and
/// sorting keys; `sync` is a no-op.
#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<String, Value>>,
    pubsub: PubSub,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read: true,
            write: true,
            publish: true,
            ordering: true,
            ..Default::default()
        }
    }

    fn add(&self, key: &str, data: Value) -> StoreResult<()> {
        self.data.write().insert(key.to_string(), data.clone());
        self.pubsub.publish(key, Operation::Add(data));
        Ok(())
    }

    fn update(&self, key: &str, data: Value) -> StoreResult<()> {
        self.data.write().insert(key.to_string(), data.clone());
        self.pubsub.publish(key, Operation::Update(data));
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        if self.data.write().remove(key).is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.pubsub.publish(key, Operation::Remove);
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn keys(&self, prefix: &str, order: KeyOrder) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        match order {
            KeyOrder::None | KeyOrder::Ascending => keys.sort(),
            KeyOrder::Descending => {
                keys.sort();
                keys.reverse();
            }
        }
        Ok(keys)
    }

    fn clear(&self) -> StoreResult<()> {
        self.data.write().clear();
        Ok(())
    }

    fn on_publish(&self, callback: super::PublishCallback) {
        self.pubsub.on_publish(callback);
    }

    fn subscribe(&self, key: &str, callback: super::PublishCallback) {
        self.pubsub.subscribe(key, callback);
    }

    fn unsubscribe(&self, key: &str) {
        self.pubsub.unsubscribe(key);
    }

    /// Re-applies a replayed operation without re-publishing it, so
    /// `MultiBackend` fan-out cannot recurse between peers.
    fn process(&self, key: &str, operation: Operation) -> StoreResult<()> {
        match operation {
            Operation::Add(data) | Operation::Update(data) => {
                self.data.write().insert(key.to_string(), data);
                Ok(())
            }
            Operation::Remove => {
                self.data.write().remove(key);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_get_remove_round_trip() {
        let backend = MemoryBackend::new();
        backend.add("a.1", json!({"value": "x"})).unwrap();
        assert!(backend.has("a.1").unwrap());
        assert_eq!(backend.get("a.1").unwrap(), Some(json!({"value": "x"})));
        backend.remove("a.1").unwrap();
        assert!(!backend.has("a.1").unwrap());
    }

    #[test]
    fn keys_respects_prefix_and_order() {
        let backend = MemoryBackend::new();
        backend.add("a.2", json!(2)).unwrap();
        backend.add("a.1", json!(1)).unwrap();
        backend.add("b.1", json!(1)).unwrap();
        assert_eq!(
            backend.keys("a.", KeyOrder::Ascending).unwrap(),
            vec!["a.1".to_string(), "a.2".to_string()]
        );
        assert_eq!(
            backend.keys("a.", KeyOrder::Descending).unwrap(),
            vec!["a.2".to_string(), "a.1".to_string()]
        );
    }

    #[test]
    fn publish_notifies_subscribers() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let backend = MemoryBackend::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        backend.subscribe(
            "a.1",
            Box::new(move |_op, _key| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        backend.add("a.1", json!(1)).unwrap();
        backend.update("a.1", json!(2)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
