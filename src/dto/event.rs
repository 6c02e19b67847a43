//! Read-only event projections served by `/events`.

use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::{EventEntity, TeamEntity, Visibility},
    services::allocation,
};

/// Active member as shown in a roster.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct MemberView {
    /// Username without `@`.
    pub username: String,
    /// Attendance confirmed.
    pub confirmed: bool,
    /// Fee settled.
    pub paid: bool,
}

/// One team with its active roster.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct TeamView {
    /// Team id.
    pub id: Uuid,
    /// Palette label.
    pub label: String,
    /// Marker configured for the label.
    pub marker: String,
    /// Seats in the team.
    pub size: u32,
    /// Active members in join order.
    pub members: Vec<MemberView>,
}

/// Read-only projection of a committed event.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct EventView {
    /// Event id.
    pub id: Uuid,
    /// Sport.
    pub category: String,
    /// Free-text place.
    pub location: String,
    /// Organizer's username.
    pub organizer: String,
    /// Fee owed by each participant.
    pub fee: u64,
    /// Start, RFC 3339.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub starts_at: OffsetDateTime,
    /// End, RFC 3339.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub ends_at: OffsetDateTime,
    /// Listing visibility.
    pub visibility: Visibility,
    /// Cancelled by the organizer.
    pub cancelled: bool,
    /// Seats across all teams.
    pub capacity: u64,
    /// Seats still free.
    pub remaining: u64,
    /// Teams in creation order.
    pub teams: Vec<TeamView>,
}

impl TeamView {
    fn from_entity(team: &TeamEntity, config: &AppConfig) -> Self {
        Self {
            id: team.id,
            label: team.label.clone(),
            marker: config.marker_for(&team.label).to_owned(),
            size: team.size,
            members: team
                .active_members()
                .map(|member| MemberView {
                    username: member.username.clone(),
                    confirmed: member.confirmed,
                    paid: member.paid,
                })
                .collect(),
        }
    }
}

impl EventView {
    /// Project `event`, resolving team markers through `config`.
    pub fn from_entity(event: &EventEntity, config: &AppConfig) -> Self {
        Self {
            id: event.id,
            category: event.category.clone(),
            location: event.location.clone(),
            organizer: event.organizer_username.clone(),
            fee: event.fee,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            visibility: event.visibility,
            cancelled: event.cancelled,
            capacity: event.capacity(),
            remaining: allocation::capacity_remaining(event),
            teams: event
                .teams
                .iter()
                .map(|team| TeamView::from_entity(team, config))
                .collect(),
        }
    }
}
