//! The identity-preserving cache and dispatcher. `ObjectStorage`
//! is a cheap-to-clone handle (an `Arc` around shared state) so it can be
//! threaded into every live object for lazy relation restoration,
//! following a dependency-injection approach over a
//! global class-level `STORAGE` pointer.

use crate::backend::Backend;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::index::IndexDyn;
use crate::stored_object::{default_collection, Entity, StoredObject};
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

type Restorer =
    Arc<dyn Fn(Value, bool, ObjectStorage) -> StoreResult<Arc<dyn StoredObject>> + Send + Sync>;

type Cache = HashMap<String, Weak<dyn StoredObject>>;

struct Inner {
    backend: Arc<dyn Backend>,
    config: StoreConfig,
    cache: ReentrantMutex<RefCell<Cache>>,
    sync_queue: ReentrantMutex<RefCell<Cache>>,
    declared_classes: RwLock<HashMap<String, Restorer>>,
    indexes: RwLock<HashMap<&'static str, Vec<Arc<dyn IndexDyn>>>>,
}

/// The identity cache, sync queue, class registry and index fan-out
/// driver. Clone is shallow (an `Arc` bump): every clone shares the same
/// cache.
#[derive(Clone)]
pub struct ObjectStorage(Arc<Inner>);

impl ObjectStorage {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        Self(Arc::new(Inner {
            backend,
            config,
            cache: ReentrantMutex::new(RefCell::new(HashMap::new())),
            sync_queue: ReentrantMutex::new(RefCell::new(HashMap::new())),
            declared_classes: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        }))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.0.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.0.config
    }

    /// Binds `T` to this storage so `get`/`get_as` can restore it from
    /// the backend by canonical type name.
    pub fn use_class<T: Entity>(&self) {
        let restorer: Restorer = Arc::new(|value, restored, storage| {
            T::from_primitive(value, restored, storage).map(|arc| arc as Arc<dyn StoredObject>)
        });
        self.0
            .declared_classes
            .write()
            .insert(T::TYPE_NAME.to_string(), restorer);
    }

    pub fn register_index(&self, type_name: &'static str, index: Arc<dyn IndexDyn>) {
        self.0
            .indexes
            .write()
            .entry(type_name)
            .or_default()
            .push(index);
    }

    fn indexes_for(&self, type_name: &'static str) -> Vec<Arc<dyn IndexDyn>> {
        self.0
            .indexes
            .read()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts `obj` into the identity cache. `restored == false` also
    /// enqueues it for the next explicit `sync()`. Re-registering the
    /// same key with a *different* live object is a cache-consistency
    /// violation.
    pub fn register(&self, obj: Arc<dyn StoredObject>, restored: bool) -> StoreResult<()> {
        let key = obj.storage_key();
        let guard = self.0.cache.lock();
        let mut cache = guard.borrow_mut();
        if let Some(existing) = cache.get(&key).and_then(Weak::upgrade) {
            if !Arc::ptr_eq(&existing, &obj) {
                return Err(StoreError::CacheConflict { key });
            }
        }
        cache.insert(key.clone(), Arc::downgrade(&obj));
        drop(cache);
        drop(guard);
        if !restored {
            let guard = self.0.sync_queue.lock();
            guard.borrow_mut().insert(key, Arc::downgrade(&obj));
        }
        Ok(())
    }

    /// Cache hit returns the same physical instance; on miss, fetches
    /// from the backend, restores via the registered class, and
    /// re-registers — all under the same lock acquisition, so a
    /// reentrant `get` for the same key during restoration observes the
    /// partially built instance (the identity algorithm's handling of
    /// cyclic graphs).
    pub fn get(&self, key: &str) -> StoreResult<Option<Arc<dyn StoredObject>>> {
        let guard = self.0.cache.lock();
        let cached = guard.borrow().get(key).and_then(Weak::upgrade);
        if let Some(obj) = cached {
            log::debug!("ObjectStorage.get: cache hit for {key}");
            return Ok(Some(obj));
        }
        log::debug!("ObjectStorage.get: cache miss for {key}, loading from backend");
        let Some(primitive) = self.0.backend.get(key)? else {
            return Ok(None);
        };
        let type_name = primitive
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::Malformed(format!("stored value at {key} has no type")))?
            .to_string();
        let restorer = self
            .0
            .declared_classes
            .read()
            .get(&type_name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownType(type_name.clone()))?;
        // Held across restoration: the restorer's constructor calls back
        // into `register`, which re-enters this same reentrant lock.
        let obj = restorer(primitive, true, self.clone())?;
        Ok(Some(obj))
    }

    pub fn get_as<T: Entity>(&self, key: &str) -> StoreResult<Option<Arc<T>>> {
        match self.get(key)? {
            Some(obj) => {
                let any = Arc::clone(&obj);
                Ok(Some(downcast_arc::<T>(any)?))
            }
            None => Ok(None),
        }
    }

    pub fn has(&self, key: &str) -> StoreResult<bool> {
        let guard = self.0.cache.lock();
        if guard.borrow().get(key).and_then(Weak::upgrade).is_some() {
            return Ok(true);
        }
        drop(guard);
        self.0.backend.has(key)
    }

    /// First save calls `backend.add`, subsequent saves call
    /// `backend.update` — decided by presence in the backend.
    pub fn save(&self, obj: &Arc<dyn StoredObject>) -> StoreResult<()> {
        let key = obj.storage_key();
        if self.0.backend.has(&key)? {
            self.update(obj.as_ref())
        } else {
            self.create(obj.as_ref())
        }
    }

    pub fn create(&self, obj: &dyn StoredObject) -> StoreResult<()> {
        let key = obj.storage_key();
        let primitive = obj.export(self.0.config.export_depth);
        self.0.backend.add(&key, primitive)?;
        for index in self.indexes_for(obj.type_name()) {
            index.add(obj)?;
        }
        Ok(())
    }

    pub fn update(&self, obj: &dyn StoredObject) -> StoreResult<()> {
        let key = obj.storage_key();
        let primitive = obj.export(self.0.config.export_depth);
        self.0.backend.update(&key, primitive)?;
        for index in self.indexes_for(obj.type_name()) {
            index.update(obj)?;
        }
        Ok(())
    }

    /// Resolves to the object (to fire `on_remove` and drive indexes),
    /// uncaches it, and deletes it from the backend.
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        let obj = self.get(key)?;
        let guard = self.0.cache.lock();
        guard.borrow_mut().remove(key);
        drop(guard);
        let sync_guard = self.0.sync_queue.lock();
        sync_guard.borrow_mut().remove(key);
        drop(sync_guard);
        self.0.backend.remove(key)?;
        if let Some(obj) = obj {
            for index in self.indexes_for(obj.type_name()) {
                index.remove_signature(&obj.storage_key())?;
            }
            obj.on_remove();
        }
        Ok(())
    }

    /// Lists objects whose storage key has `collection` as prefix,
    /// windowed by `[start, end)` or `count`, preserving identity by
    /// delegating to `get` per key.
    pub fn list(
        &self,
        collection: &'static str,
        start: usize,
        end: Option<usize>,
    ) -> StoreResult<Vec<Arc<dyn StoredObject>>> {
        let prefix = format!("{collection}.");
        let keys = self.0.backend.keys(&prefix, crate::backend::KeyOrder::Ascending)?;
        let end = end.unwrap_or(keys.len());
        keys.into_iter()
            .enumerate()
            .filter(|(i, _)| *i >= start && *i < end)
            .filter_map(|(_, k)| self.get(&k).transpose())
            .collect()
    }

    pub fn count(&self, collection: &'static str) -> StoreResult<usize> {
        self.0.backend.count(&format!("{collection}."))
    }

    /// Get-or-create: returns the cached/restorable object at `oid` if
    /// it exists, otherwise runs `make` and saves the result.
    pub fn ensure<T: Entity>(
        &self,
        collection: &'static str,
        oid: &str,
        make: impl FnOnce() -> StoreResult<Arc<T>>,
    ) -> StoreResult<Arc<T>> {
        let key = format!("{collection}.{oid}");
        if let Some(existing) = self.get_as::<T>(&key)? {
            return Ok(existing);
        }
        let created = make()?;
        let as_dyn: Arc<dyn StoredObject> = created.clone();
        self.save(&as_dyn)?;
        Ok(created)
    }

    /// Drains the sync queue, flushing every still-live entry through
    /// `backend.update`, then requests a durable flush.
    pub fn sync(&self) -> StoreResult<()> {
        let pending: Vec<Arc<dyn StoredObject>> = {
            let guard = self.0.sync_queue.lock();
            let mut queue = guard.borrow_mut();
            let live: Vec<_> = queue.values().filter_map(Weak::upgrade).collect();
            queue.clear();
            live
        };
        for obj in pending {
            self.update(obj.as_ref())?;
        }
        self.0.backend.sync()
    }

    /// Opens an allocation scope: objects `track`ed during its lifetime
    /// are flushed via `save` when the scope is dropped.
    pub fn scope(&self) -> AllocationScope<'_> {
        AllocationScope {
            storage: self,
            tracked: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

fn downcast_arc<T: Entity>(obj: Arc<dyn StoredObject>) -> StoreResult<Arc<T>> {
    if (*obj).as_any().downcast_ref::<T>().is_some() {
        // Arc<dyn StoredObject> -> Arc<T>: the underlying allocation is a
        // `T`, so this is sound; `Arc::downcast` is unavailable on
        // `Arc<dyn StoredObject>` because `StoredObject` isn't `Arc<dyn
        // Any>`, so we go through a raw pointer cast on the same
        // allocation instead.
        let raw = Arc::into_raw(obj) as *const T;
        Ok(unsafe { Arc::from_raw(raw) })
    } else {
        Err(StoreError::UnknownType(T::TYPE_NAME.to_string()))
    }
}

/// Records every object `track`ed during the scope and flushes them via
/// `save` on drop.
pub struct AllocationScope<'a> {
    storage: &'a ObjectStorage,
    tracked: parking_lot::Mutex<Vec<Arc<dyn StoredObject>>>,
}

impl AllocationScope<'_> {
    pub fn track(&self, obj: Arc<dyn StoredObject>) {
        self.tracked.lock().push(obj);
    }

    pub fn flush(&self) -> StoreResult<()> {
        let objs: Vec<_> = self.tracked.lock().drain(..).collect();
        for obj in objs {
            self.storage.save(&obj)?;
        }
        Ok(())
    }
}

impl Drop for AllocationScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("AllocationScope: flush on drop failed: {e}");
        }
    }
}

/// Storage key helper: `collection + "." + oid"`.
pub fn storage_key_for(type_name: &'static str, oid: &str) -> String {
    format!("{}.{}", default_collection(type_name), oid)
}
