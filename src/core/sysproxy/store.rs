//! Settings store abstraction
//!
//! The toggler only ever talks to the platform settings database through
//! [`SettingsStore`] and the [`SettingsKey`] handles it hands out. The
//! Windows registry implementation lives in `registry.rs`; this module also
//! provides [`MemorySettingsStore`], an in-process fake used by tests and by
//! callers that want to dry-run a toggle.
//!
//! # Handles
//!
//! A key handle is a scoped resource: it is acquired by `open_key` and
//! released when the boxed handle is dropped. Each toggler operation opens
//! its key once and drops it before returning, on every exit path.

use super::errors::{StoreError, StoreResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Hierarchical key-value settings database
pub trait SettingsStore: Send + Sync {
    /// Open `path` with read/write access
    fn open_key(&self, path: &str) -> StoreResult<Box<dyn SettingsKey + '_>>;
}

/// An open handle to one key of a [`SettingsStore`]
///
/// Reads report a missing value as [`StoreError::NotFound`], which lets
/// callers tell "absent" apart from "present but empty".
pub trait SettingsKey {
    /// Path this handle was opened with
    fn path(&self) -> &str;

    fn get_u32(&self, name: &str) -> StoreResult<u32>;

    fn get_string(&self, name: &str) -> StoreResult<String>;

    fn set_u32(&self, name: &str, value: u32) -> StoreResult<()>;

    fn set_string(&self, name: &str, value: &str) -> StoreResult<()>;

    /// Remove a value; a missing value is reported as `NotFound`
    fn delete_value(&self, name: &str) -> StoreResult<()>;
}

/// Typed value held by the in-memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    U32(u32),
    String(String),
}

#[derive(Default)]
struct MemoryState {
    keys: HashMap<String, HashMap<String, StoredValue>>,
    denied_keys: HashSet<String>,
    failing_values: HashSet<String>,
    open_handles: usize,
    mutations: usize,
}

/// In-memory settings store (tests and dry runs)
///
/// Clones share the same underlying data, so a test can keep one clone for
/// inspection while the toggler owns another.
#[derive(Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the two keys the toggler uses, both empty
    pub fn with_proxy_keys() -> Self {
        let store = Self::new();
        store.create_key(super::toggler::INTERNET_SETTINGS_KEY);
        store.create_key(super::toggler::ENVIRONMENT_KEY);
        store
    }

    /// Create an empty key if it does not exist yet
    pub fn create_key(&self, path: &str) {
        if let Ok(mut state) = self.inner.write() {
            state.keys.entry(path.to_string()).or_default();
        }
    }

    pub fn insert(&self, path: &str, name: &str, value: StoredValue) {
        if let Ok(mut state) = self.inner.write() {
            state
                .keys
                .entry(path.to_string())
                .or_default()
                .insert(name.to_string(), value);
        }
    }

    pub fn insert_u32(&self, path: &str, name: &str, value: u32) {
        self.insert(path, name, StoredValue::U32(value));
    }

    pub fn insert_string(&self, path: &str, name: &str, value: &str) {
        self.insert(path, name, StoredValue::String(value.to_string()));
    }

    /// Current value, `None` if the key or value does not exist
    pub fn value(&self, path: &str, name: &str) -> Option<StoredValue> {
        self.inner
            .read()
            .ok()
            .and_then(|state| state.keys.get(path).and_then(|k| k.get(name).cloned()))
    }

    pub fn contains(&self, path: &str, name: &str) -> bool {
        self.value(path, name).is_some()
    }

    /// Make `open_key(path)` fail with `AccessDenied`
    pub fn deny_access(&self, path: &str) {
        if let Ok(mut state) = self.inner.write() {
            state.denied_keys.insert(path.to_string());
        }
    }

    pub fn allow_access(&self, path: &str) {
        if let Ok(mut state) = self.inner.write() {
            state.denied_keys.remove(path);
        }
    }

    /// Make every set/delete of the named value fail with a backend error
    pub fn fail_mutations_of(&self, name: &str) {
        if let Ok(mut state) = self.inner.write() {
            state.failing_values.insert(name.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.inner.write() {
            state.failing_values.clear();
        }
    }

    /// Number of handles currently open
    pub fn open_handles(&self) -> usize {
        self.inner.read().map(|s| s.open_handles).unwrap_or(0)
    }

    /// Number of successful sets and deletes since creation
    pub fn mutation_count(&self) -> usize {
        self.inner.read().map(|s| s.mutations).unwrap_or(0)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn open_key(&self, path: &str) -> StoreResult<Box<dyn SettingsKey + '_>> {
        let mut state = self
            .inner
            .write()
            .map_err(|e| StoreError::Backend(format!("write lock poisoned: {e}")))?;

        if state.denied_keys.contains(path) {
            return Err(StoreError::AccessDenied(path.to_string()));
        }
        if !state.keys.contains_key(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }

        state.open_handles += 1;
        Ok(Box::new(MemoryKey {
            inner: Arc::clone(&self.inner),
            path: path.to_string(),
        }))
    }
}

struct MemoryKey {
    inner: Arc<RwLock<MemoryState>>,
    path: String,
}

impl MemoryKey {
    fn read_value(&self, name: &str) -> StoreResult<StoredValue> {
        let state = self
            .inner
            .read()
            .map_err(|e| StoreError::Backend(format!("read lock poisoned: {e}")))?;
        state
            .keys
            .get(&self.path)
            .and_then(|k| k.get(name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}\\{}", self.path, name)))
    }

    fn mutate(
        &self,
        name: &str,
        f: impl FnOnce(&mut HashMap<String, StoredValue>) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut state = self
            .inner
            .write()
            .map_err(|e| StoreError::Backend(format!("write lock poisoned: {e}")))?;
        if state.failing_values.contains(name) {
            return Err(StoreError::Backend(format!(
                "injected failure for {}\\{}",
                self.path, name
            )));
        }
        let values = state.keys.entry(self.path.clone()).or_default();
        f(values)?;
        state.mutations += 1;
        Ok(())
    }
}

impl SettingsKey for MemoryKey {
    fn path(&self) -> &str {
        &self.path
    }

    fn get_u32(&self, name: &str) -> StoreResult<u32> {
        match self.read_value(name)? {
            StoredValue::U32(v) => Ok(v),
            StoredValue::String(_) => Err(StoreError::TypeMismatch(format!(
                "{}\\{} is not a 32-bit value",
                self.path, name
            ))),
        }
    }

    fn get_string(&self, name: &str) -> StoreResult<String> {
        match self.read_value(name)? {
            StoredValue::String(v) => Ok(v),
            StoredValue::U32(_) => Err(StoreError::TypeMismatch(format!(
                "{}\\{} is not a string value",
                self.path, name
            ))),
        }
    }

    fn set_u32(&self, name: &str, value: u32) -> StoreResult<()> {
        self.mutate(name, |values| {
            values.insert(name.to_string(), StoredValue::U32(value));
            Ok(())
        })
    }

    fn set_string(&self, name: &str, value: &str) -> StoreResult<()> {
        self.mutate(name, |values| {
            values.insert(name.to_string(), StoredValue::String(value.to_string()));
            Ok(())
        })
    }

    fn delete_value(&self, name: &str) -> StoreResult<()> {
        let path = self.path.clone();
        self.mutate(name, |values| {
            values
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("{}\\{}", path, name)))
        })
    }
}

impl Drop for MemoryKey {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.write() {
            state.open_handles = state.open_handles.saturating_sub(1);
        }
    }
}
