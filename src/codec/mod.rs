//! Pluggable wire serialization. `Backend`
//! implementations are free to pick their own codec; `JsonCodec` is the
//! default used by the reference backends.

mod bincode_codec;
mod json;

pub use bincode_codec::BincodeCodec;
pub use json::JsonCodec;

use crate::error::StoreError;
use serde_json::Value;

/// Converts between the primitive wire value and a byte representation.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, StoreError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, StoreError>;
}
