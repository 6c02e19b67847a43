use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{EventEntity, MembershipEntity, TeamEntity, UserEntity, Visibility};

// Identifiers are stored as strings so roster lookups can use plain equality filters.

/// Stored shape of [`EventEntity`], teams embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    id: String,
    category: String,
    organizer_id: String,
    organizer_username: String,
    organizer_chat_id: i64,
    location: String,
    fee: i64,
    starts_at: DateTime,
    ends_at: DateTime,
    team_size: u32,
    team_count: u32,
    visibility: Visibility,
    #[serde(default)]
    cancelled: bool,
    teams: Vec<MongoTeamDocument>,
    version: i64,
    created_at: DateTime,
}

/// Embedded team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamDocument {
    id: String,
    label: String,
    size: u32,
    #[serde(default)]
    members: Vec<MongoMembershipDocument>,
}

/// Embedded membership; flags default to false on older documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMembershipDocument {
    user_id: String,
    username: String,
    chat_id: i64,
    #[serde(default)]
    confirmed: bool,
    #[serde(default)]
    paid: bool,
    #[serde(default)]
    payment_pending: bool,
    #[serde(default)]
    cancelled: bool,
}

/// Stored shape of [`UserEntity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    username: String,
    chat_id: i64,
    phone: Option<String>,
}

/// Millisecond BSON date; sub-millisecond precision is dropped.
pub fn to_bson_datetime(value: OffsetDateTime) -> DateTime {
    DateTime::from_millis((value.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn from_bson_datetime(owner: &str, value: DateTime) -> Result<OffsetDateTime, MongoDaoError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(value.timestamp_millis()) * 1_000_000)
        .map_err(|err| invalid(owner, err.to_string()))
}

fn parse_id(owner: &str, raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|err| invalid(owner, format!("bad identifier `{raw}`: {err}")))
}

fn invalid(owner: &str, reason: String) -> MongoDaoError {
    MongoDaoError::InvalidDocument {
        id: owner.to_owned(),
        reason,
    }
}

/// `_id` filter.
pub fn doc_id(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

impl From<EventEntity> for MongoEventDocument {
    fn from(value: EventEntity) -> Self {
        Self {
            id: value.id.to_string(),
            category: value.category,
            organizer_id: value.organizer_id.to_string(),
            organizer_username: value.organizer_username,
            organizer_chat_id: value.organizer_chat_id,
            location: value.location,
            fee: i64::try_from(value.fee).unwrap_or(i64::MAX),
            starts_at: to_bson_datetime(value.starts_at),
            ends_at: to_bson_datetime(value.ends_at),
            team_size: value.team_size,
            team_count: value.team_count,
            visibility: value.visibility,
            cancelled: value.cancelled,
            teams: value.teams.into_iter().map(Into::into).collect(),
            version: i64::try_from(value.version).unwrap_or(i64::MAX),
            created_at: to_bson_datetime(value.created_at),
        }
    }
}

impl TryFrom<MongoEventDocument> for EventEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoEventDocument) -> Result<Self, Self::Error> {
        let owner = value.id.clone();
        let teams = value
            .teams
            .into_iter()
            .map(|team| team.into_entity(&owner))
            .collect::<Result<Vec<_>, _>>()?;
        let fee = u64::try_from(value.fee)
            .map_err(|_| invalid(&owner, format!("negative fee {}", value.fee)))?;
        let version = u64::try_from(value.version)
            .map_err(|_| invalid(&owner, format!("negative version {}", value.version)))?;

        Ok(Self {
            id: parse_id(&owner, &value.id)?,
            category: value.category,
            organizer_id: parse_id(&owner, &value.organizer_id)?,
            organizer_username: value.organizer_username,
            organizer_chat_id: value.organizer_chat_id,
            location: value.location,
            fee,
            starts_at: from_bson_datetime(&owner, value.starts_at)?,
            ends_at: from_bson_datetime(&owner, value.ends_at)?,
            team_size: value.team_size,
            team_count: value.team_count,
            visibility: value.visibility,
            cancelled: value.cancelled,
            teams,
            version,
            created_at: from_bson_datetime(&owner, value.created_at)?,
        })
    }
}

impl From<TeamEntity> for MongoTeamDocument {
    fn from(value: TeamEntity) -> Self {
        Self {
            id: value.id.to_string(),
            label: value.label,
            size: value.size,
            members: value.members.into_iter().map(Into::into).collect(),
        }
    }
}

impl MongoTeamDocument {
    fn into_entity(self, owner: &str) -> Result<TeamEntity, MongoDaoError> {
        let members = self
            .members
            .into_iter()
            .map(|member| {
                Ok(MembershipEntity {
                    user_id: parse_id(owner, &member.user_id)?,
                    username: member.username,
                    chat_id: member.chat_id,
                    confirmed: member.confirmed,
                    paid: member.paid,
                    payment_pending: member.payment_pending,
                    cancelled: member.cancelled,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        Ok(TeamEntity {
            id: parse_id(owner, &self.id)?,
            label: self.label,
            size: self.size,
            members,
        })
    }
}

impl From<MembershipEntity> for MongoMembershipDocument {
    fn from(value: MembershipEntity) -> Self {
        Self {
            user_id: value.user_id.to_string(),
            username: value.username,
            chat_id: value.chat_id,
            confirmed: value.confirmed,
            paid: value.paid,
            payment_pending: value.payment_pending,
            cancelled: value.cancelled,
        }
    }
}

impl From<UserEntity> for MongoUserDocument {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name,
            username: value.username,
            chat_id: value.chat_id,
            phone: value.phone,
        }
    }
}

impl TryFrom<MongoUserDocument> for UserEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoUserDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id, &value.id)?,
            name: value.name,
            username: value.username,
            chat_id: value.chat_id,
            phone: value.phone,
        })
    }
}
