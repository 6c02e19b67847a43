use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoEventDocument, MongoUserDocument, doc_id, to_bson_datetime},
};
use crate::dao::{
    event_store::EventStore,
    models::{EventEntity, EventFilter, LISTING_LEAD_TIME, UserEntity},
    storage::StorageResult,
};

const EVENT_COLLECTION_NAME: &str = "events";
const USER_COLLECTION_NAME: &str = "users";

/// [`EventStore`] over the `events` and `users` collections.
#[derive(Clone)]
pub struct MongoEventStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = connection::connect(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

const DUPLICATE_KEY_CODE: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

fn listing_filter(filter: &EventFilter) -> Document {
    let mut query = doc! {
        "cancelled": false,
        "starts_at": { "$gt": to_bson_datetime(filter.now + LISTING_LEAD_TIME) },
    };
    if filter.public_only {
        query.insert("visibility", "public");
    }
    if let Some(category) = &filter.category {
        query.insert("category", category.as_str());
    }
    if let Some(organizer) = filter.organizer {
        query.insert("organizer_id", organizer.to_string());
    }
    if let Some(member) = filter.member {
        query.insert(
            "teams.members",
            doc! { "$elemMatch": { "user_id": member.to_string(), "cancelled": false } },
        );
    }
    query
}

impl MongoEventStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = connection::connect(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let events = self.events().await;
        let indexes = [
            ("category_start_idx", "category,starts_at", doc! { "category": 1, "starts_at": 1 }),
            ("team_id_idx", "teams.id", doc! { "teams.id": 1 }),
        ];
        for (name, index, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            events
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: EVENT_COLLECTION_NAME,
                    index,
                    source,
                })?;
        }

        let users = self.users().await;
        let username_index = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("username_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        users
            .create_index(username_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: USER_COLLECTION_NAME,
                index: "username",
                source,
            })?;

        Ok(())
    }

    async fn events(&self) -> Collection<MongoEventDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoEventDocument>(EVENT_COLLECTION_NAME)
    }

    async fn users(&self) -> Collection<MongoUserDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoUserDocument>(USER_COLLECTION_NAME)
    }

    async fn insert_event(&self, event: EventEntity) -> MongoResult<()> {
        let id = event.id;
        let document: MongoEventDocument = event.into();
        self.events()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicateEvent { id }
                } else {
                    MongoDaoError::SaveEvent { id, source }
                }
            })?;
        Ok(())
    }

    async fn find_one_event(&self, id: Uuid, filter: Document) -> MongoResult<Option<EventEntity>> {
        let document = self
            .events()
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::LoadEvent { id, source })?;
        document.map(EventEntity::try_from).transpose()
    }

    async fn replace_event(&self, event: EventEntity, expected_version: u64) -> MongoResult<bool> {
        let id = event.id;
        let mut filter = doc_id(id);
        filter.insert("version", i64::try_from(expected_version).unwrap_or(i64::MAX));
        let document: MongoEventDocument = event.into();
        let result = self
            .events()
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::SaveEvent { id, source })?;
        Ok(result.matched_count == 1)
    }

    async fn list_events(&self, filter: EventFilter) -> MongoResult<Vec<EventEntity>> {
        let documents: Vec<MongoEventDocument> = self
            .events()
            .await
            .find(listing_filter(&filter))
            .sort(doc! { "starts_at": 1 })
            .await
            .map_err(|source| MongoDaoError::ListEvents { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListEvents { source })?;

        documents.into_iter().map(EventEntity::try_from).collect()
    }

    async fn find_user(&self, key: String, filter: Document) -> MongoResult<Option<UserEntity>> {
        let document = self
            .users()
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::LoadUser { key, source })?;
        document.map(UserEntity::try_from).transpose()
    }

    async fn upsert_user(&self, user: UserEntity) -> MongoResult<UserEntity> {
        let username = user.username.clone();
        let mut fields = doc! { "name": user.name.as_str(), "chat_id": user.chat_id };
        if let Some(phone) = &user.phone {
            fields.insert("phone", phone.as_str());
        }
        let mut on_insert = doc! { "_id": user.id.to_string() };
        if user.phone.is_none() {
            on_insert.insert("phone", mongodb::bson::Bson::Null);
        }
        let update = doc! { "$set": fields, "$setOnInsert": on_insert };

        let stored = self
            .users()
            .await
            .find_one_and_update(doc! { "username": username.as_str() }, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveUser {
                username: username.clone(),
                source,
            })?;

        match stored {
            Some(document) => UserEntity::try_from(document),
            None => Err(MongoDaoError::InvalidDocument {
                id: username,
                reason: "upsert returned no document".into(),
            }),
        }
    }
}

impl EventStore for MongoEventStore {
    fn insert_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_event(event).await.map_err(Into::into) })
    }

    fn find_event(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_event(id, doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_event_by_team(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_event(team_id, doc! { "teams.id": team_id.to_string() })
                .await
                .map_err(Into::into)
        })
    }

    fn replace_event(
        &self,
        event: EventEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_event(event, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn list_events(
        &self,
        filter: EventFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_events(filter).await.map_err(Into::into) })
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_user(id.to_string(), doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_user_by_username(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! { "username": username.as_str() };
            store.find_user(username, filter).await.map_err(Into::into)
        })
    }

    fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_user(user).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
