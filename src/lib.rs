//! objectstore - an embeddable object-persistence layer.
//!
//! Three cooperating abstractions sit at the core of this crate:
//!
//! - [`backend`]: a pluggable key-value [`backend::Backend`] trait, with
//!   reference implementations ([`backend::MemoryBackend`],
//!   [`backend::DirectoryBackend`], [`backend::DbmBackend`]) and a
//!   fan-out [`backend::MultiBackend`].
//! - [`object_storage`]: an identity-preserving cache and dispatcher,
//!   [`object_storage::ObjectStorage`], that maps typed [`stored_object::Entity`]
//!   values onto a backend.
//! - [`index`]: a forward/backward lookup-table subsystem
//!   ([`index::Index`], [`index::IndexStorage`], [`index::Indexes`]) that
//!   derives and maintains secondary indexes on top of any backend.
//!
//! [`raw`] is a sibling specialization for large opaque blobs, reusing
//! the same backend interface.

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod id;
pub mod index;
pub mod object_storage;
pub mod property;
pub mod raw;
pub mod relation;
pub mod schema;
pub mod stored_object;
pub mod timestamp;
pub mod updates;

pub use backend::{Backend, Capabilities, KeyOrder, Operation};
pub use error::StoreError;
pub use object_storage::ObjectStorage;
pub use stored_object::{Entity, StoredObject};
