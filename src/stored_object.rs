//! The declarative base every persistable type implements. Rust
//! has no attribute-interception descriptors, so the effect is obtained
//! the way hand-written typed accessors do: each concrete type hand-writes
//! typed accessors (via [`crate::property::Property`] and
//! [`crate::relation::Relation`]) instead of routing through a dynamic
//! `get(name)/set(name, value)` pair.

use crate::error::StoreResult;
use crate::object_storage::ObjectStorage;
use crate::schema::Schema;
use crate::updates::Updates;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Dyn-safe base trait every persistable type implements. This is the
/// "Storable" of the glossary: an oid, a type name, and an
/// export/restore pair.
pub trait StoredObject: Any + Send + Sync + fmt::Debug {
    fn oid(&self) -> &str;

    /// Canonical `module.Class` type name.
    fn type_name(&self) -> &'static str;

    /// Collection defaults to the final segment of `type_name`; types may
    /// override this to pick a different collection name.
    fn collection(&self) -> &'static str {
        default_collection(self.type_name())
    }

    fn storage_key(&self) -> String {
        format!("{}.{}", self.collection(), self.oid())
    }

    fn updates(&self) -> &Updates;

    /// `export(depth)`: at depth 0, only `{oid, type, updates}` are
    /// emitted; relations serialize as shallow `{oid, type}` references
    /// unless `depth > 0` is propagated to them.
    fn export(&self, depth: i32) -> Value;

    fn as_any(&self) -> &dyn Any;

    /// Fired by `ObjectStorage::remove` after the object has been
    /// uncached and the backend delete has succeeded.
    fn on_remove(&self) {}
}

pub fn default_collection(type_name: &'static str) -> &'static str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

/// The base `{oid, type, updates}` envelope every export carries,
/// regardless of depth.
pub fn export_envelope(oid: &str, type_name: &str, updates: &Updates) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    map.insert("oid".to_string(), Value::String(oid.to_string()));
    map.insert("type".to_string(), Value::String(type_name.to_string()));
    let updates_obj: serde_json::Map<String, Value> = updates
        .snapshot()
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();
    map.insert("updates".to_string(), Value::Object(updates_obj));
    map
}

/// A concrete, restorable `StoredObject`. Implementing this plugs a type
/// into `ObjectStorage::use_class`.
pub trait Entity: StoredObject + Sized + 'static {
    const TYPE_NAME: &'static str;

    /// Builds a live instance from a primitive payload. `restored` is
    /// `false` for a freshly constructed ("new") object and `true` when
    /// rehydrating from the backend. Implementations MUST register the
    /// instance with `storage` (directly, or by delegating to a
    /// constructor that does) before they finish building nested
    /// relations, so a reentrant `get` for the same key observes the
    /// partially built instance and a cycle terminates instead of
    /// recursing forever.
    fn from_primitive(value: Value, restored: bool, storage: ObjectStorage) -> StoreResult<Arc<Self>>;

    /// Declares this type's properties and relations for validation and
    /// documentation. Types with no declared shape may leave this at its
    /// empty default.
    fn schema() -> Schema {
        Schema::default()
    }
}

/// `{oid, type, ...}` — a reference to another entity. Used both for the
/// lazily-restored slot shape and for a shallow export reference.
pub fn shallow_reference(oid: &str, type_name: &str) -> Value {
    serde_json::json!({"oid": oid, "type": type_name})
}

pub fn is_reference_shape(value: &Value) -> bool {
    value.is_object() && value.get("oid").is_some() && value.get("type").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_collection_is_the_final_type_segment() {
        assert_eq!(default_collection("notes.Note"), "Note");
        assert_eq!(default_collection("Note"), "Note");
    }

    #[test]
    fn reference_shape_detection() {
        assert!(is_reference_shape(&shallow_reference("a1", "notes.Note")));
        assert!(!is_reference_shape(&serde_json::json!({"oid": "a1"})));
        assert!(!is_reference_shape(&serde_json::json!("a1")));
    }
}
