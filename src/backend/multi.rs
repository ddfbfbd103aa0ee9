use super::{Backend, Capabilities, KeyOrder};
use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// Fan-out composite over an ordered list of backends. Writes apply to
/// every member sequentially (no rollback on partial failure); reads
/// are served by the first member advertising the matching capability.
/// Each member's publish is re-dispatched to its peers via `process` so,
/// e.g., a memory cache stays coherent with an on-disk log.
pub struct MultiBackend {
    backends: Vec<Arc<dyn Backend>>,
}

impl MultiBackend {
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Arc<Self> {
        let multi = Arc::new(Self { backends });
        multi.wire_publish_fanout();
        multi
    }

    fn wire_publish_fanout(self: &Arc<Self>) {
        for (i, member) in self.backends.iter().enumerate() {
            let weak: Weak<MultiBackend> = Arc::downgrade(self);
            member.on_publish(Box::new(move |operation, key| {
                let Some(multi) = weak.upgrade() else {
                    return;
                };
                for (j, peer) in multi.backends.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    if let Err(e) = peer.process(key, operation.clone()) {
                        log::warn!("MultiBackend: peer failed to process replayed op: {e}");
                    }
                }
            }));
        }
    }

    fn read_backend(&self) -> StoreResult<&Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.capabilities().read)
            .ok_or_else(|| StoreError::BackendIo("no member backend advertises HAS_READ".into()))
    }

    fn file_backend(&self) -> StoreResult<&Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.capabilities().file)
            .ok_or_else(|| StoreError::BackendIo("no member backend advertises HAS_FILE".into()))
    }

    fn stream_backend(&self) -> StoreResult<&Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.capabilities().stream)
            .ok_or_else(|| StoreError::BackendIo("no member backend advertises HAS_STREAM".into()))
    }
}

impl Backend for MultiBackend {
    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::default();
        for b in &self.backends {
            let c = b.capabilities();
            caps.read |= c.read;
            caps.write |= c.write;
            caps.stream |= c.stream;
            caps.file |= c.file;
            caps.publish |= c.publish;
            caps.raw |= c.raw;
            caps.ordering |= c.ordering;
        }
        caps
    }

    fn add(&self, key: &str, data: Value) -> StoreResult<()> {
        for b in &self.backends {
            b.add(key, data.clone())?;
        }
        Ok(())
    }

    fn update(&self, key: &str, data: Value) -> StoreResult<()> {
        for b in &self.backends {
            b.update(key, data.clone())?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        for b in &self.backends {
            b.remove(key)?;
        }
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        self.read_backend()?.has(key)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.read_backend()?.get(key)
    }

    fn keys(&self, prefix: &str, order: KeyOrder) -> StoreResult<Vec<String>> {
        self.read_backend()?.keys(prefix, order)
    }

    fn count(&self, prefix: &str) -> StoreResult<usize> {
        self.read_backend()?.count(prefix)
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<Value>> {
        self.read_backend()?.list(prefix)
    }

    fn clear(&self) -> StoreResult<()> {
        for b in &self.backends {
            b.clear()?;
        }
        Ok(())
    }

    fn sync(&self) -> StoreResult<()> {
        for b in &self.backends {
            b.sync()?;
        }
        Ok(())
    }

    fn path(&self, key: &str) -> StoreResult<PathBuf> {
        self.file_backend()?.path(key)
    }

    fn stream(&self, key: &str, chunk_size: usize) -> StoreResult<Vec<Vec<u8>>> {
        self.stream_backend()?.stream(key, chunk_size)
    }
}
