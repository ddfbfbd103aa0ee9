//! Process-wide tunables. A `Config` marker trait plus a concrete
//! `*Config` struct with a `Default` impl; this crate has exactly one
//! configuration surface, so there is no per-concern trait split.

use std::time::Duration;

/// Marker trait every configuration type implements.
pub trait Config: Send + Sync {}

/// Process-wide settings for identifier generation, backend retries, and
/// collection naming.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Overrides automatic node-id resolution (env `NODE_ID`, then
    /// hostname suffix, then `0`) when `Some`.
    pub node_id: Option<u64>,
    /// Upper bound on linear-backoff retries a `DbmBackend` performs
    /// before surfacing a write failure.
    pub dbm_max_retries: u32,
    /// Base delay multiplied by the attempt number for `DbmBackend`'s
    /// linear backoff.
    pub dbm_retry_backoff: Duration,
    /// Export depth used by `ObjectStorage::create`/`update` when
    /// persisting an object.
    pub export_depth: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            dbm_max_retries: 5,
            dbm_retry_backoff: Duration::from_millis(5),
            export_depth: 1,
        }
    }
}

impl Config for StoreConfig {}

impl StoreConfig {
    pub fn resolved_node_id(&self) -> u64 {
        self.node_id.unwrap_or_else(crate::id::node_id)
    }
}

/// Initializes the `log` backend once per process. Safe to call more
/// than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_bounds() {
        let config = StoreConfig::default();
        assert_eq!(config.dbm_max_retries, 5);
        assert_eq!(config.export_depth, 1);
    }
}
