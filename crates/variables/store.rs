use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

/// Per-bot keyed string store with an opt-in persistence set.
///
/// Cheap to clone: the backing map lives behind an `Arc<RwLock<_>>` so a
/// bot's main routine task and every sentry task spawned for that bot share
/// one logical store.
#[derive(Clone, Default)]
pub struct VariableStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    values: IndexMap<String, String>,
    persistent: IndexSet<String>,
}

impl VariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a variable's current value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.read().values.get(name).cloned()
    }

    /// Sets a variable's value, leaving its persistence flag untouched.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.write().values.insert(name.into(), value.into());
    }

    /// Sets a variable's value and marks it persistent in one call — the
    /// common case for config-param seeding and reserved runtime names.
    pub fn set_persistent(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut inner = self.inner.write();
        inner.persistent.insert(name.clone());
        inner.values.insert(name, value.into());
    }

    /// Marks an existing (or not-yet-set) name as persistent without
    /// changing its value.
    pub fn mark_persistent(&self, name: impl Into<String>) {
        self.inner.write().persistent.insert(name.into());
    }

    /// Whether `name` is currently in the persistent set.
    #[must_use]
    pub fn is_persistent(&self, name: &str) -> bool {
        self.inner.read().persistent.contains(name)
    }

    /// Removes every variable, including the persistence set itself.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.values.clear();
        inner.persistent.clear();
    }

    /// Removes every variable not marked persistent. The persistent set
    /// itself, and the values of persistent names, are left untouched —
    /// this is what a control-flow loop calls between routine iterations.
    pub fn clear_non_persistent(&self) {
        let mut inner = self.inner.write();
        let Inner { values, persistent } = &mut *inner;
        values.retain(|name, _| persistent.contains(name));
    }

    /// Ordered snapshot of every currently set variable, for diagnostics
    /// and tests.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.inner.read().values.clone()
    }

    /// Seeds the runtime-reserved names documented in the routine file
    /// format (`device_account_id`, `execution_id`, declared `config`
    /// params) as persistent entries so they survive
    /// `clear_non_persistent` across loop iterations.
    pub fn seed_reserved(&self, entries: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in entries {
            self.set_persistent(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let store = VariableStore::new();
        store.set("name", "value");
        assert_eq!(store.get("name").as_deref(), Some("value"));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn clear_non_persistent_preserves_only_persistent_names() {
        let store = VariableStore::new();
        store.set_persistent("execution_id", "abc");
        store.set("scratch", "1");
        store.clear_non_persistent();

        assert_eq!(store.get("execution_id").as_deref(), Some("abc"));
        assert_eq!(store.get("scratch"), None);
        assert!(store.is_persistent("execution_id"));
    }

    #[test]
    fn clear_wipes_persistence_set_too() {
        let store = VariableStore::new();
        store.set_persistent("acct", "a1");
        store.clear();
        assert_eq!(store.get("acct"), None);
        assert!(!store.is_persistent("acct"));
    }

    #[test]
    fn clone_shares_backing_store() {
        let store = VariableStore::new();
        let handle = store.clone();
        store.set("shared", "1");
        assert_eq!(handle.get("shared").as_deref(), Some("1"));
    }
}
