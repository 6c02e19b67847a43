//! MongoDB backend, enabled by the `mongo-store` feature.

mod config;
mod connection;
mod error;
mod models;
/// [`MongoEventStore`] and its queries.
pub mod store;

pub use config::MongoConfig;
pub use error::{MongoDaoError, MongoResult};
pub use store::MongoEventStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::InvalidDocument { id, reason } => StorageError::Corrupt { id, reason },
            MongoDaoError::DuplicateEvent { id } => StorageError::Duplicate { id },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
