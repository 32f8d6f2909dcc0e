use thiserror::Error;

/// Failures of the cache store backing session records.
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    /// The backend could not be reached or rejected a command
    #[error("Cache store error: {0}")]
    Storage(String),

    /// A cached value could not be encoded or decoded
    #[error("Cache value encoding error: {0}")]
    Serde(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::Storage(format!("redis {}", err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}
