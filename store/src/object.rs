//! The durable object-store trait.

use crate::StoreError;

/// A durable key-value blob store with list-by-prefix.
///
/// This is the entire external storage interface: `get` returns the bytes at
/// a key or `StoreError::NotFound`; `put` overwrites unconditionally; `list`
/// returns every key under a prefix. Implementations must be safe to share
/// across threads; they are not required to make a `put` immediately visible
/// to subsequent `get`s (eventual read-after-write visibility).
pub trait ObjectStore: Send + Sync {
    /// Fetch the object at `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write `bytes` to `key`, replacing any existing object. Last writer
    /// wins; there is no compare-and-swap.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// List all keys beginning with `prefix`, in unspecified order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Whether an object exists at `key`. Default implementation in terms
    /// of `get`; backends may override with something cheaper.
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch and decode an object as UTF-8 text.
    fn get_text(&self, key: &str) -> Result<String, StoreError> {
        let bytes = self.get(key)?;
        String::from_utf8(bytes).map_err(|e| StoreError::Backend(e.to_string()))
    }
}
