//! The pluggable key-value `Backend` interface, its capability
//! flags, key ordering, and pub/sub of changes.

mod directory;
mod dbm;
mod memory;
mod multi;

pub use dbm::DbmBackend;
pub use directory::DirectoryBackend;
pub use memory::MemoryBackend;
pub use multi::MultiBackend;

use crate::error::StoreResult;
use serde_json::Value;
use std::path::PathBuf;

/// Key ordering a backend can (or cannot) serve natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    None,
    Ascending,
    Descending,
}

/// An operation applied to a key, used by pub/sub and by `process` to
/// replay a journaled change onto a peer backend.
#[derive(Debug, Clone)]
pub enum Operation {
    Add(Value),
    Update(Value),
    Remove,
}

/// Capability flags a backend advertises about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub stream: bool,
    pub file: bool,
    pub publish: bool,
    pub raw: bool,
    pub ordering: bool,
}

/// A callback invoked with `(operation, key, data)` whenever a change is
/// published on a backend.
pub type PublishCallback = Box<dyn Fn(&Operation, &str) + Send + Sync>;

/// Uniform key-value interface. Keys and values are primitives
/// convertible to the backend's chosen wire codec.
pub trait Backend: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Inserts `data` under `key`. Fails if the key already exists only
    /// if the backend chooses to enforce that (not all do).
    fn add(&self, key: &str, data: Value) -> StoreResult<()>;

    /// Stores or replaces `data` under `key`.
    fn update(&self, key: &str, data: Value) -> StoreResult<()>;

    /// Deletes `key`. Fails if the key is missing.
    fn remove(&self, key: &str) -> StoreResult<()>;

    fn has(&self, key: &str) -> StoreResult<bool>;

    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Keys with the given prefix, in the requested order (backends
    /// without `HAS_ORDERING` must emulate by materializing and sorting).
    fn keys(&self, prefix: &str, order: KeyOrder) -> StoreResult<Vec<String>>;

    fn list(&self, prefix: &str) -> StoreResult<Vec<Value>> {
        self.keys(prefix, KeyOrder::None)?
            .into_iter()
            .map(|k| {
                self.get(&k)
                    .map(|v| v.unwrap_or(Value::Null))
            })
            .collect()
    }

    fn count(&self, prefix: &str) -> StoreResult<usize> {
        Ok(self.keys(prefix, KeyOrder::None)?.len())
    }

    fn clear(&self) -> StoreResult<()>;

    /// Requests a durable flush. May be a no-op for write-through backends.
    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }

    fn stream(&self, _key: &str, _chunk_size: usize) -> StoreResult<Vec<Vec<u8>>> {
        Err(crate::error::StoreError::BackendIo(
            "backend does not support streaming".into(),
        ))
    }

    fn path(&self, _key: &str) -> StoreResult<PathBuf> {
        Err(crate::error::StoreError::BackendIo(
            "backend does not expose a filesystem path".into(),
        ))
    }

    fn has_raw_data(&self, _key: &str, _ext: &str) -> StoreResult<bool> {
        Ok(false)
    }

    fn save_raw_data(&self, _key: &str, _ext: &str, _data: &[u8]) -> StoreResult<()> {
        Err(crate::error::StoreError::BackendIo(
            "backend does not support raw data".into(),
        ))
    }

    fn stream_raw_data(&self, _key: &str, _ext: &str) -> StoreResult<Vec<u8>> {
        Err(crate::error::StoreError::BackendIo(
            "backend does not support raw data".into(),
        ))
    }

    fn raw_data_path(&self, _key: &str, _ext: &str) -> StoreResult<PathBuf> {
        Err(crate::error::StoreError::BackendIo(
            "backend does not support raw data".into(),
        ))
    }

    /// Registers a sink that receives every published `(operation, key)`.
    /// Reference backends route this through `PubSub`; `MultiBackend`
    /// uses it to mirror writes between members.
    fn on_publish(&self, _callback: PublishCallback) {}

    fn subscribe(&self, _key: &str, _callback: PublishCallback) {}

    fn unsubscribe(&self, _key: &str) {}

    /// Re-applies a journaled operation. Used by `MultiBackend` to mirror
    /// a write that was published by a peer; implementors must not
    /// re-publish a replayed operation (that would recurse forever).
    fn process(&self, key: &str, operation: Operation) -> StoreResult<()> {
        match operation {
            Operation::Add(data) => self.add(key, data),
            Operation::Update(data) => self.update(key, data),
            Operation::Remove => self.remove(key),
        }
    }
}

/// Shared pub/sub plumbing used by the reference backends: a list of
/// `onPublish` sinks plus a per-key subscriber table.
pub(crate) mod pubsub {
    use super::{Operation, PublishCallback};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct PubSub {
        sinks: Mutex<Vec<PublishCallback>>,
        subscribers: Mutex<HashMap<String, Vec<PublishCallback>>>,
    }

    impl PubSub {
        pub fn on_publish(&self, callback: PublishCallback) {
            self.sinks.lock().push(callback);
        }

        pub fn subscribe(&self, key: &str, callback: PublishCallback) {
            self.subscribers
                .lock()
                .entry(key.to_string())
                .or_default()
                .push(callback);
        }

        pub fn unsubscribe(&self, key: &str) {
            self.subscribers.lock().remove(key);
        }

        pub fn notify(&self, key: &str, operation: &Operation) {
            if let Some(callbacks) = self.subscribers.lock().get(key) {
                for cb in callbacks {
                    cb(operation, key);
                }
            }
        }

        /// Publishes to every `onPublish` sink. Callback panics are caught
        /// and logged rather than propagated, so one faulty subscriber
        /// cannot break a write.
        pub fn publish(&self, key: &str, operation: Operation) {
            self.notify(key, &operation);
            for sink in self.sinks.lock().iter() {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    sink(&operation, key)
                }));
                if result.is_err() {
                    log::warn!("Backend.publish: subscriber callback panicked for key {key:?}");
                }
            }
        }
    }
}
