use super::pubsub::PubSub;
use super::{Backend, Capabilities, KeyOrder, Operation};
use crate::codec::{Codec, JsonCodec};
use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// A single on-disk key-value file (backed by `sled`). Writes may
/// transiently fail under contention; they are retried with a small
/// linear backoff up to `max_retries` before the error surfaces. Wire
/// encoding goes through a pluggable [`Codec`], `JsonCodec` by default.
pub struct DbmBackend {
    tree: sled::Db,
    max_retries: u32,
    pubsub: PubSub,
    codec: Box<dyn Codec>,
}

impl DbmBackend {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_retries(path, 5)
    }

    pub fn open_with_retries(path: impl AsRef<Path>, max_retries: u32) -> StoreResult<Self> {
        Self::open_with_codec(path, max_retries, Box::new(JsonCodec))
    }

    /// Opens the tree with an explicit wire [`Codec`] instead of the
    /// default `JsonCodec` — e.g. `BincodeCodec` for a more compact
    /// on-disk representation.
    pub fn open_with_codec(
        path: impl AsRef<Path>,
        max_retries: u32,
        codec: Box<dyn Codec>,
    ) -> StoreResult<Self> {
        let tree = sled::open(path).map_err(|e| StoreError::BackendIo(e.to_string()))?;
        Ok(Self {
            tree,
            max_retries,
            pubsub: PubSub::default(),
            codec,
        })
    }

    #[cfg(feature = "bincode-codec")]
    pub fn open_with_bincode(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_codec(path, 5, Box::new(crate::codec::BincodeCodec))
    }

    fn with_retry<T>(&self, mut op: impl FnMut() -> sled::Result<T>) -> StoreResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "DbmBackend: write contention, retrying ({attempt}/{}): {e}",
                        self.max_retries
                    );
                    thread::sleep(Duration::from_millis(5 * attempt as u64));
                }
                Err(e) => return Err(StoreError::BackendIo(e.to_string())),
            }
        }
    }

    fn encode(&self, value: &Value) -> StoreResult<Vec<u8>> {
        self.codec.encode(value)
    }

    fn decode(&self, bytes: &[u8]) -> StoreResult<Value> {
        self.codec.decode(bytes)
    }
}

impl Backend for DbmBackend {
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
        self.update(key, data)
    }

    fn update(&self, key: &str, data: Value) -> StoreResult<()> {
        let bytes = self.encode(&data)?;
        self.with_retry(|| self.tree.insert(key, bytes.clone()))?;
        self.pubsub.publish(key, Operation::Update(data));
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let removed = self.with_retry(|| self.tree.remove(key))?;
        if removed.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.pubsub.publish(key, Operation::Remove);
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        self.tree
            .contains_key(key)
            .map_err(|e| StoreError::BackendIo(e.to_string()))
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        match self
            .tree
            .get(key)
            .map_err(|e| StoreError::BackendIo(e.to_string()))?
        {
            Some(bytes) => Ok(Some(self.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn keys(&self, prefix: &str, order: KeyOrder) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .tree
            .scan_prefix(prefix)
            .keys()
            .filter_map(|k| k.ok())
            .map(|k| String::from_utf8_lossy(&k).into_owned())
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
        self.tree
            .clear()
            .map_err(|e| StoreError::BackendIo(e.to_string()))
    }

    fn sync(&self) -> StoreResult<()> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| StoreError::BackendIo(e.to_string()))
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
                let bytes = self.encode(&data)?;
                self.with_retry(|| self.tree.insert(key, bytes.clone()))?;
                Ok(())
            }
            Operation::Remove => {
                let _ = self.with_retry(|| self.tree.remove(key));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn add_get_remove_round_trip() {
        let dir = tempdir().unwrap();
        let backend = DbmBackend::open(dir.path().join("db")).unwrap();
        backend.add("a.1", json!({"value": "x"})).unwrap();
        assert!(backend.has("a.1").unwrap());
        assert_eq!(backend.get("a.1").unwrap(), Some(json!({"value": "x"})));
        backend.remove("a.1").unwrap();
        assert!(!backend.has("a.1").unwrap());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let backend = DbmBackend::open(&path).unwrap();
            backend.add("a.1", json!(1)).unwrap();
            backend.sync().unwrap();
        }
        let backend = DbmBackend::open(&path).unwrap();
        assert_eq!(backend.get("a.1").unwrap(), Some(json!(1)));
    }

    #[test]
    fn a_non_default_codec_round_trips_through_the_tree() {
        use crate::codec::BincodeCodec;

        let dir = tempdir().unwrap();
        let backend =
            DbmBackend::open_with_codec(dir.path().join("db"), 5, Box::new(BincodeCodec)).unwrap();
        backend.add("a.1", json!({"value": "x"})).unwrap();
        assert_eq!(backend.get("a.1").unwrap(), Some(json!({"value": "x"})));
    }
}
