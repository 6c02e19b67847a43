/// In-process backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{EventEntity, EventFilter, UserEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::MemoryEventStore;

/// Abstraction over the persistence layer for events and users.
///
/// Events are stored as whole aggregates (teams and memberships embedded) so a single
/// conditional write is enough to keep a capacity check and the reservation atomic.
pub trait EventStore: Send + Sync {
    /// Store a new event; an existing id is [`StorageError::Duplicate`].
    ///
    /// [`StorageError::Duplicate`]: crate::dao::storage::StorageError::Duplicate
    fn insert_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Event by id, cancelled ones included.
    fn find_event(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<EventEntity>>>;
    /// Event owning the team.
    fn find_event_by_team(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<EventEntity>>>;
    /// Replace the stored event only while its version still equals `expected_version`.
    ///
    /// Returns `false` when another writer got there first or the event vanished.
    fn replace_event(
        &self,
        event: EventEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Events matching `filter`, soonest first.
    fn list_events(&self, filter: EventFilter)
    -> BoxFuture<'static, StorageResult<Vec<EventEntity>>>;
    /// User by id.
    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// User by username without `@`.
    fn find_user_by_username(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Create the user, or refresh the contact fields of the one holding the same username.
    ///
    /// The returned entity carries the identifier that is actually stored.
    fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<UserEntity>>;
    /// Cheap round trip to the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
