use std::error::Error;

use thiserror::Error;
use uuid::Uuid;

/// Result alias for event store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by any event store backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("event store unavailable: {message}")]
    Unavailable {
        /// Short description of the failed call.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// An event with the same identifier is already stored.
    #[error("event `{id}` already exists")]
    Duplicate {
        /// Event id.
        id: Uuid,
    },
    /// A stored record could not be mapped back onto the domain model.
    #[error("stored record `{id}` is corrupt: {reason}")]
    Corrupt {
        /// Record key.
        id: String,
        /// What did not map.
        reason: String,
    },
}

impl StorageError {
    /// Wrap a backend failure.
    pub fn unavailable(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}
