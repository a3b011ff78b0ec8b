// =============================================================================
// Durable Key-Value Storage
// =============================================================================
//
// Every piece of learned state (observations, win statistics, guard window,
// lead-time cells) is persisted as one JSON document under a fixed key.
// Components hold an `Arc<dyn KvStore>` so tests can inject a fresh
// in-memory store while the binary runs against files on disk.
//
// Reads degrade: a missing, unreadable or unparsable document loads as the
// empty state. Writes are strict: a failed put is reported to the caller.

pub mod file;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage keys for each persisted table.
pub mod keys {
    pub const PRICES: &str = "prices_v1";
    pub const STATS: &str = "stats_v1";
    pub const GUARD: &str = "guard_v1";
    pub const LEAD: &str = "lead_v1";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable for '{key}'")]
    Unavailable { key: String },
}

impl StoreError {
    pub fn key(&self) -> &str {
        match self {
            Self::Io { key, .. } | Self::Encode { key, .. } | Self::Unavailable { key } => key,
        }
    }
}

/// Minimal string-keyed document store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Load and decode the document at `key`, falling back to `T::default()` when
/// the store cannot be read or the content does not parse.
pub fn load_or_default<T>(store: &dyn KvStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            warn!(key, error = %e, "store read failed, starting from empty state");
            return T::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "stored document is corrupt, starting from empty state");
            T::default()
        }
    }
}

/// Encode `value` as JSON and write it under `key`.
pub fn save_json<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, &json)
}
