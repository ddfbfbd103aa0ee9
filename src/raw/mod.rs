//! Raw blob storage: a sibling of [`crate::object_storage::ObjectStorage`]
//! for large opaque payloads — attachments, exports, anything that
//! shouldn't round-trip through the JSON codec. Reuses the same
//! [`crate::backend::Backend`] trait's raw-data extension methods rather
//! than inventing a second storage interface.

use crate::backend::Backend;
use crate::error::{StoreError, StoreResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Stores byte blobs keyed by `(key, extension)`, backed by any
/// [`Backend`] that advertises `Capabilities::raw`.
pub struct RawStorage {
    backend: Arc<dyn Backend>,
}

impl RawStorage {
    pub fn new(backend: Arc<dyn Backend>) -> StoreResult<Self> {
        if !backend.capabilities().raw {
            return Err(StoreError::MissingStorageBinding {
                class: "RawStorage".to_string(),
            });
        }
        Ok(Self { backend })
    }

    pub fn has(&self, key: &str, ext: &str) -> StoreResult<bool> {
        self.backend.has_raw_data(key, ext)
    }

    pub fn save(&self, key: &str, ext: &str, data: &[u8]) -> StoreResult<()> {
        self.backend.save_raw_data(key, ext, data)
    }

    pub fn load(&self, key: &str, ext: &str) -> StoreResult<Vec<u8>> {
        self.backend.stream_raw_data(key, ext)
    }

    /// A filesystem path to the blob, when the backend exposes one
    /// (`DirectoryBackend` does; `MemoryBackend` and `DbmBackend` don't).
    pub fn path(&self, key: &str, ext: &str) -> StoreResult<PathBuf> {
        self.backend.raw_data_path(key, ext)
    }

    pub fn stream(&self, key: &str, chunk_size: usize) -> StoreResult<Vec<Vec<u8>>> {
        self.backend.stream(key, chunk_size)
    }
}
