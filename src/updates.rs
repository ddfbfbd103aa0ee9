//! Per-field update timestamps. Every setter bumps `updates[field]` and
//! `updates["oid"]` (the overall modification time) to `max(current,
//! now)`. A freshly constructed "new" object suppresses this bookkeeping
//! during its initial property population, so bulk-import can preserve
//! an externally supplied `updates` map.

use crate::timestamp;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// The synthetic key holding the object's overall modification time —
/// the max timestamp across every field.
pub const OID_KEY: &str = "oid";

#[derive(Debug, Default)]
pub struct Updates {
    fields: RwLock<HashMap<String, i64>>,
    suppressed: AtomicBool,
}

impl Updates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: HashMap<String, i64>) -> Self {
        Self {
            fields: RwLock::new(snapshot),
            suppressed: AtomicBool::new(false),
        }
    }

    /// While suppressed, `touch` is a no-op. Used while a "new" object is
    /// populated from its constructor, and while a restored object is
    /// being rehydrated from a primitive that already carries `updates`.
    pub fn suppress(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    /// Bumps `field` and the overall `oid` timestamp to `max(current, now)`.
    pub fn touch(&self, field: &str) {
        if self.is_suppressed() {
            return;
        }
        let now = timestamp::now();
        let mut fields = self.fields.write();
        let entry = fields.entry(field.to_string()).or_insert(0);
        *entry = (*entry).max(now);
        let overall = fields.entry(OID_KEY.to_string()).or_insert(0);
        *overall = (*overall).max(now);
    }

    pub fn get(&self, field: &str) -> Option<i64> {
        self.fields.read().get(field).copied()
    }

    pub fn overall(&self) -> i64 {
        self.get(OID_KEY).unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.fields.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_bumps_field_and_overall_to_the_max() {
        let updates = Updates::new();
        updates.touch("value");
        let value_ts = updates.get("value").unwrap();
        let overall = updates.overall();
        assert_eq!(value_ts, overall);
        assert!(overall >= updates.get("value").unwrap());
    }

    #[test]
    fn suppressed_touch_is_a_no_op() {
        let updates = Updates::new();
        updates.suppress(true);
        updates.touch("value");
        assert!(updates.get("value").is_none());
    }

    #[test]
    fn successive_touches_never_decrease_a_field() {
        let updates = Updates::new();
        updates.touch("value");
        let first = updates.get("value").unwrap();
        updates.touch("value");
        let second = updates.get("value").unwrap();
        assert!(second >= first);
    }
}
