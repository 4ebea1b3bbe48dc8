//! Nullable store — thread-safe in-memory object storage for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tally_store::{ObjectStore, StoreError};

/// An in-memory object store for testing.
///
/// Faithful by default. With `set_drop_writes(true)` every subsequent `put`
/// silently does nothing, simulating a write that lost the race against a
/// concurrent writer to the same key — the exact failure the ledger's
/// append-and-verify protocol must detect.
pub struct NullObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    drop_writes: AtomicBool,
}

impl NullObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            drop_writes: AtomicBool::new(false),
        }
    }

    /// When enabled, `put` calls succeed but store nothing.
    pub fn set_drop_writes(&self, drop: bool) {
        self.drop_writes.store(drop, Ordering::Relaxed);
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NullObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for NullObjectStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if self.drop_writes.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}
