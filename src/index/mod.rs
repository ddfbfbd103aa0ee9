//! Forward/backward secondary indexes over any [`crate::backend::Backend`]
//! An index maps an extracted key to the signature (storage key) of
//! the objects that produced it, and maintains the inverse mapping so a
//! re-indexed or removed object's stale forward entries can be found and
//! pruned. Ported from `storage/index.py`'s `IndexStorage`/`Index` pair.

mod text;

pub use text::{keyword, keywords, no_accents, normalize, paths};

use crate::backend::{Backend, KeyOrder};
use crate::error::StoreResult;
use crate::object_storage::ObjectStorage;
use crate::stored_object::{Entity, StoredObject};
use crate::timestamp;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

const KEY_LAST_UPDATE: &str = "__index__.lastUpdate";

/// Dyn-safe surface [`ObjectStorage`] drives on every create/update/remove,
/// independent of the indexed entity's concrete type.
pub trait IndexDyn: Send + Sync {
    fn add(&self, value: &dyn StoredObject) -> StoreResult<()>;
    fn update(&self, value: &dyn StoredObject) -> StoreResult<()>;
    fn remove_signature(&self, signature: &str) -> StoreResult<()>;
}

/// The two (or three) backends an index is built from: forward maps an
/// extracted key to the signatures that produced it, backward maps a
/// signature back to the keys it last produced (so re-indexing can find
/// and drop stale forward entries), meta tracks the last-build timestamp.
pub struct IndexStorage {
    forward: Arc<dyn Backend>,
    backward: Arc<dyn Backend>,
    meta: Arc<dyn Backend>,
}

impl IndexStorage {
    pub fn new(forward: Arc<dyn Backend>, backward: Arc<dyn Backend>) -> Self {
        let meta = Arc::clone(&backward);
        Self {
            forward,
            backward,
            meta,
        }
    }

    pub fn with_meta(
        forward: Arc<dyn Backend>,
        backward: Arc<dyn Backend>,
        meta: Arc<dyn Backend>,
    ) -> Self {
        Self {
            forward,
            backward,
            meta,
        }
    }

    pub fn last_update(&self) -> StoreResult<Option<i64>> {
        Ok(self
            .meta
            .get(KEY_LAST_UPDATE)?
            .and_then(|v| v.as_i64()))
    }

    /// Registers `keys` as the forward entries produced by `sig`, pruning
    /// any forward entry `sig` previously owned under a key no longer in
    /// `keys` when a re-index moves it elsewhere.
    pub fn add(&self, sig: &str, keys: Vec<String>) -> StoreResult<()> {
        if self.backward.has(sig)? {
            let previous: Vec<String> = self
                .backward
                .get(sig)?
                .map(as_string_vec)
                .unwrap_or_default();
            for previous_key in &previous {
                if keys.contains(previous_key) {
                    continue;
                }
                if let Some(existing) = self.forward.get(previous_key)? {
                    let mut values = as_string_vec(existing);
                    values.retain(|v| v != sig);
                    if values.is_empty() {
                        self.forward.remove(previous_key)?;
                    } else {
                        self.forward.update(previous_key, string_vec_value(values))?;
                    }
                }
            }
            self.backward
                .update(sig, string_vec_value(keys.clone()))?;
        } else {
            self.backward.add(sig, string_vec_value(keys.clone()))?;
        }
        for key in &keys {
            if let Some(existing) = self.forward.get(key)? {
                let mut values = as_string_vec(existing);
                if !values.iter().any(|v| v == sig) {
                    values.push(sig.to_string());
                }
                self.forward.update(key, string_vec_value(values))?;
            } else {
                self.forward
                    .add(key, string_vec_value(vec![sig.to_string()]))?;
            }
        }
        Ok(())
    }

    pub fn update(&self, sig: &str, keys: Vec<String>) -> StoreResult<()> {
        self.add(sig, keys)
    }

    pub fn get(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.forward.get(key)?.map(as_string_vec).unwrap_or_default())
    }

    pub fn get_keys(&self, sig: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .backward
            .get(sig)?
            .map(as_string_vec)
            .unwrap_or_default())
    }

    pub fn keys(
        &self,
        start: usize,
        end: Option<usize>,
        order: KeyOrder,
    ) -> StoreResult<Vec<String>> {
        let all = self.forward.keys("", order)?;
        let end = end.unwrap_or(all.len());
        Ok(all
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i >= start && *i < end)
            .map(|(_, k)| k)
            .collect())
    }

    /// Flattened signatures across every key, in key order, windowed by
    /// `[start, end)`.
    pub fn list(
        &self,
        start: usize,
        end: Option<usize>,
        order: KeyOrder,
    ) -> StoreResult<Vec<String>> {
        let mut out = Vec::new();
        let mut i = 0usize;
        'outer: for key in self.forward.keys("", order)? {
            for sig in self.get(&key)? {
                if let Some(end) = end {
                    if i >= end {
                        break 'outer;
                    }
                }
                if i >= start {
                    out.push(sig);
                }
                i += 1;
            }
        }
        Ok(out)
    }

    pub fn remove(&self, sig: &str) -> StoreResult<()> {
        if self.backward.has(sig)? {
            let previous = self.get_keys(sig)?;
            for previous_key in previous {
                if let Some(existing) = self.forward.get(&previous_key)? {
                    let mut values = as_string_vec(existing);
                    values.retain(|v| v != sig);
                    if values.is_empty() {
                        self.forward.remove(&previous_key)?;
                    } else {
                        self.forward.update(&previous_key, string_vec_value(values))?;
                    }
                }
            }
            self.backward.remove(sig)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.forward.clear()?;
        self.backward.clear()
    }

    pub fn sync(&self) -> StoreResult<()> {
        self.meta.add(KEY_LAST_UPDATE, Value::from(timestamp::now()))?;
        self.forward.sync()?;
        self.backward.sync()
    }
}

fn as_string_vec(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => vec![s],
        _ => Vec::new(),
    }
}

fn string_vec_value(values: Vec<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

#[cfg(test)]
mod storage_tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn new_storage() -> IndexStorage {
        IndexStorage::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn re_adding_under_a_new_key_prunes_the_stale_forward_entry() -> StoreResult<()> {
        let storage = new_storage();
        storage.add("sig.1", vec!["red".to_string()])?;
        assert_eq!(storage.get("red")?, vec!["sig.1".to_string()]);

        storage.add("sig.1", vec!["blue".to_string()])?;
        assert!(storage.get("red")?.is_empty(), "stale forward entry under the old key must be pruned");
        assert_eq!(storage.get("blue")?, vec!["sig.1".to_string()]);
        assert_eq!(storage.get_keys("sig.1")?, vec!["blue".to_string()]);
        Ok(())
    }

    #[test]
    fn re_adding_a_shared_key_does_not_disturb_other_signatures() -> StoreResult<()> {
        let storage = new_storage();
        storage.add("sig.1", vec!["red".to_string()])?;
        storage.add("sig.2", vec!["red".to_string()])?;

        storage.add("sig.1", vec!["blue".to_string()])?;
        assert_eq!(storage.get("red")?, vec!["sig.2".to_string()]);
        assert_eq!(storage.get("blue")?, vec!["sig.1".to_string()]);
        Ok(())
    }

    #[test]
    fn remove_clears_the_signature_and_empties_abandoned_buckets() -> StoreResult<()> {
        let storage = new_storage();
        storage.add("sig.1", vec!["red".to_string(), "round".to_string()])?;

        storage.remove("sig.1")?;
        assert!(storage.get("red")?.is_empty());
        assert!(storage.get("round")?.is_empty());
        assert!(storage.get_keys("sig.1")?.is_empty());
        assert!(storage.keys(0, None, KeyOrder::Ascending)?.is_empty(), "emptied buckets must be deleted, not left as empty arrays");
        Ok(())
    }

    #[test]
    fn remove_leaves_a_bucket_shared_with_another_signature_intact() -> StoreResult<()> {
        let storage = new_storage();
        storage.add("sig.1", vec!["red".to_string()])?;
        storage.add("sig.2", vec!["red".to_string()])?;

        storage.remove("sig.1")?;
        assert_eq!(storage.get("red")?, vec!["sig.2".to_string()]);
        Ok(())
    }
}

pub type Extractor = Arc<dyn Fn(&dyn StoredObject) -> Vec<String> + Send + Sync>;

/// A typed secondary index over entity `T`. Drives [`IndexStorage`] with an
/// extractor function and resolves signatures back to live instances via
/// the owning [`ObjectStorage`].
pub struct Index<T: Entity> {
    storage: IndexStorage,
    extractor: Extractor,
    object_storage: ObjectStorage,
    _marker: PhantomData<T>,
}

impl<T: Entity> Index<T> {
    pub fn new(storage: IndexStorage, extractor: Extractor, object_storage: ObjectStorage) -> Self {
        Self {
            storage,
            extractor,
            object_storage,
            _marker: PhantomData,
        }
    }

    fn restore(&self, sig: &str) -> StoreResult<Option<Arc<T>>> {
        self.object_storage.get_as::<T>(sig)
    }

    pub fn get(&self, key: &str) -> StoreResult<Vec<Arc<T>>> {
        self.storage
            .get(key)?
            .into_iter()
            .filter_map(|sig| self.restore(&sig).transpose())
            .collect()
    }

    pub fn one(&self, key: &str, index: usize) -> StoreResult<Option<Arc<T>>> {
        let sigs = self.storage.get(key)?;
        match sigs.get(index) {
            Some(sig) => self.restore(sig),
            None => Ok(None),
        }
    }

    pub fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(!self.storage.get(key)?.is_empty())
    }

    pub fn count(&self, key: &str) -> StoreResult<usize> {
        Ok(self.storage.get(key)?.len())
    }

    pub fn keys(&self, start: usize, end: Option<usize>, order: KeyOrder) -> StoreResult<Vec<String>> {
        self.storage.keys(start, end, order)
    }

    pub fn list(&self, start: usize, end: Option<usize>, order: KeyOrder) -> StoreResult<Vec<Arc<T>>> {
        self.storage
            .list(start, end, order)?
            .into_iter()
            .filter_map(|sig| self.restore(&sig).transpose())
            .collect()
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.storage.clear()
    }

    /// Clears and re-derives the index from `values` — used when
    /// `IndexStorage::last_update` is absent, i.e. the index has never
    /// been built.
    pub fn rebuild<'a>(&self, values: impl Iterator<Item = &'a Arc<T>>) -> StoreResult<usize>
    where
        T: 'a,
    {
        self.clear()?;
        let mut count = 0;
        for value in values {
            IndexDyn::add(self, value.as_ref())?;
            count += 1;
        }
        Ok(count)
    }

    pub fn save(&self) -> StoreResult<()> {
        self.storage.sync()
    }

    /// An index is cold — never built — when its meta backend carries no
    /// last-update timestamp, *not* merely a zero one.
    pub fn is_cold(&self) -> StoreResult<bool> {
        Ok(self.storage.last_update()?.is_none())
    }
}

impl<T: Entity> IndexDyn for Index<T> {
    fn add(&self, value: &dyn StoredObject) -> StoreResult<()> {
        let sig = value.storage_key();
        let keys = (self.extractor)(value);
        self.storage.add(&sig, keys)
    }

    fn update(&self, value: &dyn StoredObject) -> StoreResult<()> {
        let sig = value.storage_key();
        let keys = (self.extractor)(value);
        self.storage.update(&sig, keys)
    }

    fn remove_signature(&self, signature: &str) -> StoreResult<()> {
        self.storage.remove(signature)
    }
}

/// Per-type, per-field registry mirroring the `<Class>.by.<field>`
/// shortcut access pattern. Typed lookup goes through
/// [`Indexes::get`]; dynamic dispatch (used by `ObjectStorage`) goes
/// through the plain `Arc<dyn IndexDyn>` also kept per type.
#[derive(Default)]
pub struct Indexes {
    by_field: RwLock<HashMap<(&'static str, &'static str), Arc<dyn std::any::Any + Send + Sync>>>,
}

impl Indexes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Entity>(&self, field: &'static str, index: Arc<Index<T>>) {
        self.by_field
            .write()
            .expect("Indexes lock poisoned")
            .insert((T::TYPE_NAME, field), index);
    }

    pub fn get<T: Entity>(&self, field: &'static str) -> Option<Arc<Index<T>>> {
        self.by_field
            .read()
            .expect("Indexes lock poisoned")
            .get(&(T::TYPE_NAME, field))
            .and_then(|any| any.clone().downcast::<Index<T>>().ok())
    }
}

impl std::fmt::Debug for Indexes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.by_field.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("Indexes").field("registered", &count).finish()
    }
}
