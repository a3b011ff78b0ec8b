// =============================================================================
// Memory Store - process-local key-value backend
// =============================================================================
//
// Documents live in a map behind a lock and vanish with the process. An
// outage switch makes every call fail with `StoreError::Unavailable`.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::{KvStore, StoreError};

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every subsequent call fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { key: key.to_string() });
        }
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check(key)?;
        Ok(self.docs.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check(key)?;
        self.docs.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check(key)?;
        self.docs.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.put("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn unavailable_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.get("a").is_err());
        assert!(store.put("a", "1").is_err());
        store.set_unavailable(false);
        assert!(store.put("a", "1").is_ok());
    }
}
