use thiserror::Error;

use crate::storage::StorageError;
use crate::utils::UtilError;

/// Failures surfaced by the session layer.
///
/// Expired or hijacked sessions are not errors; they show up as a
/// [`Transition`](crate::Transition) on the resumed session.
#[derive(Debug, Error, Clone)]
pub enum SessionError {
    /// The backing store could not be read or written
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Cookie error: {0}")]
    Cookie(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from utils operations
    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
