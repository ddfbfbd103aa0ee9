//! Crate-wide error taxonomy (schema violations,
//! missing storage bindings, restoration failures, backend I/O, relation
//! cardinality, cache consistency).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("field {field:?} is not declared on type {class:?}")]
    SchemaViolation { class: String, field: String },

    #[error("type {class:?} has no storage bound (call ObjectStorage::use_class first)")]
    MissingStorageBinding { class: String },

    #[error("cannot restore object: unknown type {0:?}")]
    UnknownType(String),

    #[error("backend I/O error: {0}")]
    BackendIo(String),

    #[error("relation {field:?} on {class:?} is singular and already has a value")]
    RelationCardinality { class: String, field: String },

    #[error("object {key:?} is already registered under a different storage")]
    CacheConflict { key: String },

    #[error("no object found for key {0:?}")]
    NotFound(String),

    #[error("malformed stored value: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
