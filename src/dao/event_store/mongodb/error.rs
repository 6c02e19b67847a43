//! Failures of the MongoDB backend, before they are folded into [`StorageError`].
//!
//! [`StorageError`]: crate::dao::storage::StorageError

use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result of a MongoDB backend call.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// What went wrong talking to MongoDB, with the key involved.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required variable is unset.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The connection string did not parse.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings sent.
        attempts: u32,
        /// Error of the last ping.
        #[source]
        source: MongoError,
    },
    /// A health ping on an established client failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation at startup failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection name.
        collection: &'static str,
        /// Indexed keys.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Insert hit an existing `_id`.
    #[error("event `{id}` already exists")]
    DuplicateEvent {
        /// Event id.
        id: Uuid,
    },
    /// Insert or conditional replace of an event failed.
    #[error("failed to save event `{id}`")]
    SaveEvent {
        /// Event id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Lookup of an event by id or team failed.
    #[error("failed to load event `{id}`")]
    LoadEvent {
        /// Event or team id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A listing query or its cursor failed.
    #[error("failed to list events")]
    ListEvents {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// User upsert failed.
    #[error("failed to save user `{username}`")]
    SaveUser {
        /// Username being written.
        username: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// User lookup failed.
    #[error("failed to load user `{key}`")]
    LoadUser {
        /// Id or username searched for.
        key: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored document does not map onto the entity.
    #[error("invalid document `{id}`: {reason}")]
    InvalidDocument {
        /// Document id.
        id: String,
        /// What did not map.
        reason: String,
    },
}
