//! `Property<T>`: a typed holder exposing a
//! declared field through a read/write slot, with optional setter/getter
//! hook filters. Reference-shaped values (relations to other entities)
//! are handled by [`crate::relation::Relation`] instead — see DESIGN.md
//! for why the two concerns are split this way in a statically typed
//! target.

use crate::updates::Updates;
use parking_lot::RwLock;
use std::sync::Arc;

type Hook<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// A declared scalar property. Reads and writes route through
/// `getProperty`/`setProperty`-equivalent hooks: a hook returning `None`
/// preserves the raw value (for side-effect-only hooks), matching the
/// "returning nil or self preserves the raw value" rule.
pub struct Property<T: Clone + Send + Sync> {
    name: &'static str,
    updates: Arc<Updates>,
    value: RwLock<T>,
    get_hook: Option<Hook<T>>,
    set_hook: Option<Hook<T>>,
}

impl<T: Clone + Send + Sync> Property<T> {
    pub fn new(name: &'static str, updates: Arc<Updates>, initial: T) -> Self {
        Self {
            name,
            updates,
            value: RwLock::new(initial),
            get_hook: None,
            set_hook: None,
        }
    }

    pub fn with_hooks(mut self, get_hook: Option<Hook<T>>, set_hook: Option<Hook<T>>) -> Self {
        self.get_hook = get_hook;
        self.set_hook = set_hook;
        self
    }

    pub fn get(&self) -> T {
        let raw = self.value.read().clone();
        match &self.get_hook {
            Some(hook) => hook(raw.clone()).unwrap_or(raw),
            None => raw,
        }
    }

    pub fn set(&self, value: T) {
        let filtered = match &self.set_hook {
            Some(hook) => hook(value.clone()).unwrap_or(value),
            None => value,
        };
        *self.value.write() = filtered;
        self.updates.touch(self.name);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug> std::fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("value", &*self.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_and_touches_timestamp() {
        let updates = Arc::new(Updates::new());
        let prop = Property::new("value", Arc::clone(&updates), "x".to_string());
        prop.set("y".to_string());
        assert_eq!(prop.get(), "y");
        assert!(updates.get("value").is_some());
    }

    #[test]
    fn a_hook_returning_none_preserves_the_raw_value() {
        let updates = Arc::new(Updates::new());
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let prop = Property::new("value", updates, 1i64).with_hooks(
            None,
            Some(Arc::new(move |_v: i64| {
                hits2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                None
            })),
        );
        prop.set(42);
        assert_eq!(prop.get(), 42);
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
