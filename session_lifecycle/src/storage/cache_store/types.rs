use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;
use crate::storage::types::CacheData;

pub struct InMemoryCacheStore {
    pub(super) entry: Mutex<MemoryEntries>,
}

/// Entries plus the earliest known deadline, so writes can tell when a sweep is due.
#[derive(Default)]
pub(super) struct MemoryEntries {
    pub(super) map: HashMap<String, MemoryEntry>,
    pub(super) next_expiry: Option<DateTime<Utc>>,
}

pub(super) struct MemoryEntry {
    pub(super) data: CacheData,
    pub(super) expires_at: Option<DateTime<Utc>>,
}

pub struct RedisCacheStore {
    pub(super) client: redis::Client,
}

/// Key-value store backing session records.
///
/// Every operation is atomic per key. A `ttl` of zero means the entry has no
/// store-side expiry.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Initialize the store. This is called when the store is created.
    async fn init(&self) -> Result<(), StorageError>;

    /// Put a value into the store with a TTL, overwriting any existing value.
    async fn put_with_ttl(
        &self,
        prefix: &str,
        key: &str,
        value: CacheData,
        ttl: usize,
    ) -> Result<(), StorageError>;

    /// Get a value from the store.
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<CacheData>, StorageError>;

    /// Remove a value from the store.
    async fn remove(&self, prefix: &str, key: &str) -> Result<(), StorageError>;

    /// Put a value into the store only if it doesn't already exist (atomic check-and-set).
    /// Returns true if the value was stored, false if it already existed.
    async fn put_if_not_exists(
        &self,
        prefix: &str,
        key: &str,
        value: CacheData,
        ttl: usize,
    ) -> Result<bool, StorageError>;

    /// Replace the value only if the current value is exactly `expected`.
    /// Returns false, leaving the entry untouched, when the value differs or is absent.
    async fn compare_and_swap(
        &self,
        prefix: &str,
        key: &str,
        expected: &CacheData,
        value: CacheData,
        ttl: usize,
    ) -> Result<bool, StorageError>;
}
