use std::{env, sync::Arc};

use crate::storage::errors::StorageError;

use super::types::{CacheStore, InMemoryCacheStore, RedisCacheStore};

const DEFAULT_STORE_TYPE: &str = "memory";
const DEFAULT_STORE_URL: &str = "memory";

/// Build the cache store selected by `GENERIC_CACHE_STORE_TYPE` and
/// `GENERIC_CACHE_STORE_URL`, verifying connectivity before returning it.
///
/// Falls back to the in-memory store when no type is configured.
pub async fn cache_store_from_env() -> Result<Arc<dyn CacheStore>, StorageError> {
    let store_type =
        env::var("GENERIC_CACHE_STORE_TYPE").unwrap_or_else(|_| DEFAULT_STORE_TYPE.to_string());
    let store_url =
        env::var("GENERIC_CACHE_STORE_URL").unwrap_or_else(|_| DEFAULT_STORE_URL.to_string());

    build_cache_store(&store_type, &store_url).await
}

pub(super) async fn build_cache_store(
    store_type: &str,
    store_url: &str,
) -> Result<Arc<dyn CacheStore>, StorageError> {
    tracing::info!(
        "Initializing cache store with type: {}, url: {}",
        store_type,
        store_url
    );

    let store: Arc<dyn CacheStore> = match store_type {
        "memory" => Arc::new(InMemoryCacheStore::new()),
        "redis" => {
            let store = RedisCacheStore::new(store_url).inspect_err(|e| {
                tracing::error!("Failed to create Redis client: {}", e);
            })?;
            Arc::new(store)
        }
        t => {
            return Err(StorageError::Storage(format!(
                "Unsupported cache store type: {t}. Supported types are 'memory' and 'redis'"
            )));
        }
    };

    store.init().await.inspect_err(|e| {
        tracing::error!("Failed to connect to cache store: {}", e);
    })?;

    tracing::info!(
        "Connected to cache store: type={}, url={}",
        store_type,
        store_url
    );

    Ok(store)
}
