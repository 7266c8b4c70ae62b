//! Keyed JSON storage.
//!
//! Everything the engine persists (workflow records, the history index,
//! durable audit ledgers) goes through [`Store`]. Backends make no promise
//! beyond single-key get/put; callers that read-modify-write accept the race.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{AppError, Result};

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Replace the value stored under `key`.
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Typed read on top of [`Store::get`].
pub async fn get_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AppError::Persistence(format!("Corrupt record at `{key}`: {e}"))),
        None => Ok(None),
    }
}

/// Typed write on top of [`Store::put`].
pub async fn put_json<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| AppError::Persistence(format!("Failed to encode `{key}`: {e}")))?;
    store.put(key, value).await
}

/// Build the store selected by configuration.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File => Ok(Arc::new(FileStore::open(&config.data_dir).await?)),
    }
}
