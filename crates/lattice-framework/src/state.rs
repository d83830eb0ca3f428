//! Per-run mutable state shared by every middleware of one module run.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

/// A cheaply clonable JSON object passed through every middleware call of a
/// module run. Writes made by one middleware are visible to the next.
///
/// Lock scope is confined to each accessor; the guard never crosses an
/// `.await`.
#[derive(Clone, Default)]
pub struct State {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl State {
    /// Creates an empty state object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.lock().insert(key.into(), value.into());
    }

    /// Returns a clone of the value under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().remove(key)
    }

    /// Runs `f` against the underlying map while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Returns a deep copy of the current contents.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.lock().clone()
    }

    /// Returns the current contents as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.snapshot())
    }

    /// Returns `true` when nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("State").field(&*self.inner.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_are_visible_through_clones() {
        let state = State::new();
        let view = state.clone();
        state.set("x", 1);
        assert_eq!(view.get("x"), Some(json!(1)));
    }

    #[test]
    fn snapshot_is_detached() {
        let state = State::new();
        state.set("x", 1);
        let snapshot = state.snapshot();
        state.set("x", 2);
        assert_eq!(snapshot["x"], json!(1));
    }
}
