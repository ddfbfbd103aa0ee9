use super::Codec;
use crate::error::StoreError;
use serde_json::Value;

/// An alternative codec for backends that prefer a compact binary
/// representation over JSON text (e.g. a DBM-style file store).
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(value).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_value() {
        let codec = BincodeCodec;
        let value = json!({"oid": "abc", "n": 3});
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }
}
