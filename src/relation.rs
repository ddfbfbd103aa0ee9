//! `Relation<T>`: a lazy-dereferencing holder
//! over one or many entity references. Singular relations hold at most
//! one value; plural relations behave like an ordered list. Elements are
//! kept as `{oid,type}` dicts until first access, which is what breaks
//! cycles in the object graph at serialization time.

use crate::error::{StoreError, StoreResult};
use crate::object_storage::ObjectStorage;
use crate::schema::Cardinality;
use crate::stored_object::{is_reference_shape, shallow_reference, Entity};
use crate::updates::Updates;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

enum Slot<T> {
    Reference(Value),
    Resolved(Arc<T>),
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Reference(v) => Slot::Reference(v.clone()),
            Slot::Resolved(arc) => Slot::Resolved(Arc::clone(arc)),
        }
    }
}

/// A declared relation field. `T` is the target entity type; the
/// relation is singular or plural per its schema declaration.
pub struct Relation<T: Entity> {
    name: &'static str,
    class_name: &'static str,
    cardinality: Cardinality,
    updates: Arc<Updates>,
    storage: ObjectStorage,
    slots: RwLock<Vec<Slot<T>>>,
}

impl<T: Entity> Relation<T> {
    pub fn new(
        name: &'static str,
        class_name: &'static str,
        cardinality: Cardinality,
        updates: Arc<Updates>,
        storage: ObjectStorage,
    ) -> Self {
        Self {
            name,
            class_name,
            cardinality,
            updates,
            storage,
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn from_primitive(
        name: &'static str,
        class_name: &'static str,
        cardinality: Cardinality,
        updates: Arc<Updates>,
        storage: ObjectStorage,
        value: &Value,
    ) -> Self {
        let relation = Self::new(name, class_name, cardinality, updates, storage);
        let items: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            single => vec![single.clone()],
        };
        *relation.slots.write() = items.into_iter().map(Slot::Reference).collect();
        relation
    }

    fn resolve(&self, slot: &Slot<T>) -> StoreResult<Arc<T>> {
        match slot {
            Slot::Resolved(arc) => Ok(Arc::clone(arc)),
            Slot::Reference(value) => {
                if is_reference_shape(value) {
                    let oid = value["oid"].as_str().unwrap_or_default();
                    let key = format!(
                        "{}.{}",
                        crate::stored_object::default_collection(T::TYPE_NAME),
                        oid
                    );
                    self.storage
                        .get_as::<T>(&key)?
                        .ok_or(StoreError::NotFound(key))
                } else {
                    T::from_primitive(value.clone(), false, self.storage.clone())
                }
            }
        }
    }

    /// Resolves every slot to a live object, in order.
    pub fn list(&self) -> StoreResult<Vec<Arc<T>>> {
        let slots = self.slots.read().clone();
        slots.iter().map(|s| self.resolve(s)).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn one(&self) -> StoreResult<Option<Arc<T>>> {
        let slots = self.slots.read();
        match slots.first() {
            Some(slot) => Ok(Some(self.resolve(slot)?)),
            None => Ok(None),
        }
    }

    pub fn get(&self, index: usize) -> StoreResult<Option<Arc<T>>> {
        let slot = self.slots.read().get(index).cloned();
        match slot {
            Some(slot) => Ok(Some(self.resolve(&slot)?)),
            None => Ok(None),
        }
    }

    pub fn has(&self) -> bool {
        !self.is_empty()
    }

    pub fn contains(&self, oid: &str) -> bool {
        self.slots.read().iter().any(|s| match s {
            Slot::Resolved(arc) => arc.oid() == oid,
            Slot::Reference(v) => v.get("oid").and_then(|o| o.as_str()) == Some(oid),
        })
    }

    /// Appends a value. Singular relations reject a second value as a
    /// fatal error.
    pub fn append(&self, value: Arc<T>) -> StoreResult<()> {
        let mut slots = self.slots.write();
        if self.cardinality == Cardinality::Singular && !slots.is_empty() {
            return Err(StoreError::RelationCardinality {
                class: self.class_name.to_string(),
                field: self.name.to_string(),
            });
        }
        slots.push(Slot::Resolved(value));
        drop(slots);
        self.updates.touch(self.name);
        Ok(())
    }

    /// Replaces the whole relation with a single value (singular) or
    /// resets a plural relation to hold just this one value.
    pub fn set(&self, value: Arc<T>) {
        *self.slots.write() = vec![Slot::Resolved(value)];
        self.updates.touch(self.name);
    }

    pub fn remove(&self, oid: &str) {
        let mut slots = self.slots.write();
        slots.retain(|s| match s {
            Slot::Resolved(arc) => arc.oid() != oid,
            Slot::Reference(v) => v.get("oid").and_then(|o| o.as_str()) != Some(oid),
        });
        drop(slots);
        self.updates.touch(self.name);
    }

    pub fn clear(&self) {
        self.slots.write().clear();
        self.updates.touch(self.name);
    }

    /// Shallow `{oid,type}` references by default; full exports at
    /// `depth - 1` when `resolve` is requested.
    pub fn export(&self, resolve: bool, depth: i32) -> Value {
        let slots = self.slots.read().clone();
        let items: Vec<Value> = slots
            .iter()
            .map(|slot| match slot {
                Slot::Resolved(arc) => {
                    if resolve {
                        arc.export(depth)
                    } else {
                        shallow_reference(arc.oid(), arc.type_name())
                    }
                }
                Slot::Reference(v) => v.clone(),
            })
            .collect();
        match self.cardinality {
            Cardinality::Singular => items.into_iter().next().unwrap_or(Value::Null),
            Cardinality::Plural => Value::Array(items),
        }
    }
}

impl<T: Entity> std::fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("cardinality", &self.cardinality)
            .field("len", &self.slots.read().len())
            .finish()
    }
}
