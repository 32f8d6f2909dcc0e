use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::storage::errors::StorageError;
use crate::storage::types::CacheData;

use super::types::{CacheStore, InMemoryCacheStore, MemoryEntries, MemoryEntry};

const CACHE_PREFIX: &str = "cache";

impl InMemoryCacheStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory generic cache store");
        Self {
            entry: Default::default(),
        }
    }

    fn make_key(prefix: &str, key: &str) -> String {
        format!("{CACHE_PREFIX}:{prefix}:{key}")
    }

    fn make_entry(value: CacheData, ttl: usize) -> MemoryEntry {
        MemoryEntry {
            data: value,
            expires_at: deadline(ttl),
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Deadline for a TTL in seconds. Zero, or a TTL past the end of the
/// calendar, means the entry never expires.
fn deadline(ttl: usize) -> Option<DateTime<Utc>> {
    if ttl == 0 {
        return None;
    }
    let ttl = Duration::try_seconds(i64::try_from(ttl).ok()?)?;
    Utc::now().checked_add_signed(ttl)
}

impl MemoryEntry {
    fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }
}

impl MemoryEntries {
    fn get(&self, key: &str) -> Option<&MemoryEntry> {
        self.map.get(key)
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }

    /// Store an entry, first dropping every expired entry if any deadline has passed.
    fn insert(&mut self, key: String, entry: MemoryEntry) {
        let now = Utc::now();
        if self.next_expiry.is_some_and(|at| at <= now) {
            self.sweep(now);
        }
        if let Some(at) = entry.expires_at {
            self.next_expiry = Some(self.next_expiry.map_or(at, |next| next.min(at)));
        }
        self.map.insert(key, entry);
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live_at(now));
        self.next_expiry = self.map.values().filter_map(|entry| entry.expires_at).min();
        tracing::debug!("Swept {} expired cache entries", before - self.map.len());
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(()) // Nothing to initialize for in-memory store
    }

    async fn put_with_ttl(
        &self,
        prefix: &str,
        key: &str,
        value: CacheData,
        ttl: usize,
    ) -> Result<(), StorageError> {
        let key = Self::make_key(prefix, key);
        self.entry
            .lock()
            .await
            .insert(key, Self::make_entry(value, ttl));
        Ok(())
    }

    async fn get(&self, prefix: &str, key: &str) -> Result<Option<CacheData>, StorageError> {
        let key = Self::make_key(prefix, key);
        let mut entries = self.entry.lock().await;

        match entries.get(&key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.data.clone())),
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, prefix: &str, key: &str) -> Result<(), StorageError> {
        let key = Self::make_key(prefix, key);
        self.entry.lock().await.remove(&key);
        Ok(())
    }

    async fn put_if_not_exists(
        &self,
        prefix: &str,
        key: &str,
        value: CacheData,
        ttl: usize,
    ) -> Result<bool, StorageError> {
        let key = Self::make_key(prefix, key);
        let mut entries = self.entry.lock().await;

        if entries.get(&key).is_some_and(MemoryEntry::is_live) {
            return Ok(false);
        }

        entries.insert(key, Self::make_entry(value, ttl));
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        prefix: &str,
        key: &str,
        expected: &CacheData,
        value: CacheData,
        ttl: usize,
    ) -> Result<bool, StorageError> {
        let key = Self::make_key(prefix, key);
        let mut entries = self.entry.lock().await;

        match entries.get(&key) {
            Some(current) if current.is_live() && current.data == *expected => {
                entries.insert(key, Self::make_entry(value, ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
