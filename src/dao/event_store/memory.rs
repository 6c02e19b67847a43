//! In-process store used when no database is configured and by the test-suite.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, ready};
use uuid::Uuid;

use crate::dao::{
    event_store::EventStore,
    models::{EventEntity, EventFilter, UserEntity},
    storage::{StorageError, StorageResult},
};

/// [`EventStore`] over concurrent maps; clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryEventStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    events: DashMap<Uuid, EventEntity>,
    users: DashMap<Uuid, UserEntity>,
    usernames: DashMap<String, Uuid>,
}

impl MemoryEventStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn compare_and_replace(&self, event: EventEntity, expected_version: u64) -> bool {
        match self.inner.events.get_mut(&event.id) {
            Some(mut stored) if stored.version == expected_version => {
                *stored = event;
                true
            }
            _ => false,
        }
    }

    fn filtered_events(&self, filter: &EventFilter) -> Vec<EventEntity> {
        let mut events: Vec<EventEntity> = self
            .inner
            .events
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by_key(|event| event.starts_at);
        events
    }

    fn register_user(&self, user: UserEntity) -> UserEntity {
        // The username entry guard serializes concurrent registrations of the same handle.
        match self.inner.usernames.entry(user.username.clone()) {
            Entry::Occupied(slot) => {
                let id = *slot.get();
                let mut stored = self
                    .inner
                    .users
                    .entry(id)
                    .or_insert_with(|| UserEntity { id, ..user.clone() });
                stored.name = user.name;
                stored.chat_id = user.chat_id;
                if user.phone.is_some() {
                    stored.phone = user.phone;
                }
                stored.clone()
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.inner.users.insert(user.id, user.clone());
                user
            }
        }
    }
}

impl EventStore for MemoryEventStore {
    fn insert_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.inner.events.entry(event.id) {
            Entry::Occupied(_) => Err(StorageError::Duplicate { id: event.id }),
            Entry::Vacant(slot) => {
                slot.insert(event);
                Ok(())
            }
        };
        Box::pin(ready(result))
    }

    fn find_event(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
        let event = self.inner.events.get(&id).map(|entry| entry.value().clone());
        Box::pin(ready(Ok(event)))
    }

    fn find_event_by_team(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
        let event = self
            .inner
            .events
            .iter()
            .find(|entry| entry.value().team_index(team_id).is_some())
            .map(|entry| entry.value().clone());
        Box::pin(ready(Ok(event)))
    }

    fn replace_event(
        &self,
        event: EventEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let replaced = self.compare_and_replace(event, expected_version);
        Box::pin(ready(Ok(replaced)))
    }

    fn list_events(
        &self,
        filter: EventFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let events = self.filtered_events(&filter);
        Box::pin(ready(Ok(events)))
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let user = self.inner.users.get(&id).map(|entry| entry.value().clone());
        Box::pin(ready(Ok(user)))
    }

    fn find_user_by_username(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let user = self
            .inner
            .usernames
            .get(&username)
            .map(|entry| *entry.value())
            .and_then(|id| self.inner.users.get(&id).map(|entry| entry.value().clone()));
        Box::pin(ready(Ok(user)))
    }

    fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let stored = self.register_user(user);
        Box::pin(ready(Ok(stored)))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::dao::models::{TeamEntity, Visibility};

    fn event(starts_in: Duration) -> EventEntity {
        let now = OffsetDateTime::now_utc();
        EventEntity {
            id: Uuid::new_v4(),
            category: "football".into(),
            organizer_id: Uuid::new_v4(),
            organizer_username: "organizer".into(),
            organizer_chat_id: 1,
            location: "Arena 5".into(),
            fee: 0,
            starts_at: now + starts_in,
            ends_at: now + starts_in + Duration::minutes(90),
            team_size: 1,
            team_count: 1,
            visibility: Visibility::Public,
            cancelled: false,
            teams: vec![TeamEntity {
                id: Uuid::new_v4(),
                label: "red".into(),
                size: 1,
                members: Vec::new(),
            }],
            version: 0,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn replace_is_rejected_on_stale_version() {
        let store = MemoryEventStore::new();
        let mut stored = event(Duration::hours(3));
        store.insert_event(stored.clone()).await.unwrap();

        stored.version = 1;
        assert!(store.replace_event(stored.clone(), 0).await.unwrap());
        assert!(!store.replace_event(stored, 0).await.unwrap());
    }

    #[tokio::test]
    async fn inserting_the_same_event_twice_fails() {
        let store = MemoryEventStore::new();
        let stored = event(Duration::hours(3));
        store.insert_event(stored.clone()).await.unwrap();

        let err = store.insert_event(stored.clone()).await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { id } if id == stored.id));
    }

    #[tokio::test]
    async fn listing_skips_events_starting_too_soon() {
        let store = MemoryEventStore::new();
        let later = event(Duration::hours(4));
        let earlier = event(Duration::hours(2));
        store.insert_event(later.clone()).await.unwrap();
        store.insert_event(earlier.clone()).await.unwrap();
        store.insert_event(event(Duration::minutes(10))).await.unwrap();

        let listed = store
            .list_events(EventFilter::upcoming(OffsetDateTime::now_utc()))
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }

    #[tokio::test]
    async fn upsert_keeps_the_first_identifier_for_a_username() {
        let store = MemoryEventStore::new();
        let first = UserEntity {
            id: Uuid::new_v4(),
            name: "Aidar".into(),
            username: "aidar".into(),
            chat_id: 1,
            phone: None,
        };
        let second = UserEntity {
            id: Uuid::new_v4(),
            chat_id: 2,
            phone: Some("77001112233".into()),
            ..first.clone()
        };

        store.upsert_user(first.clone()).await.unwrap();
        let stored = store.upsert_user(second).await.unwrap();

        assert_eq!(stored.id, first.id);
        assert_eq!(stored.chat_id, 2);
        assert_eq!(stored.phone.as_deref(), Some("77001112233"));
    }
}
