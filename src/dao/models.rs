use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;
use uuid::Uuid;

/// Listings hide events starting sooner than this.
pub const LISTING_LEAD_TIME: Duration = Duration::minutes(30);

/// Whether an event shows up in public listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Listed for everyone browsing the category.
    Public,
    /// Reachable only through invitations and direct links.
    Private,
}

/// Registered chat user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Stable identifier of the user.
    pub id: Uuid,
    /// Display name reported by the chat client.
    pub name: String,
    /// Unique chat handle, stored without the leading `@`.
    pub username: String,
    /// Chat identifier used to address outbound prompts.
    pub chat_id: i64,
    /// Phone number used by the payment gateway, if the user shared one.
    pub phone: Option<String>,
}

/// Association of one user with one team of one event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipEntity {
    /// Member's user id.
    pub user_id: Uuid,
    /// Username at the time of joining, without `@`.
    pub username: String,
    /// Chat the member is notified in.
    pub chat_id: i64,
    /// Attendance confirmed by the member.
    pub confirmed: bool,
    /// Fee settled.
    pub paid: bool,
    /// A charge for this membership is in flight.
    #[serde(default)]
    pub payment_pending: bool,
    /// Signed out; the entry stays as history.
    pub cancelled: bool,
}

impl MembershipEntity {
    /// Fresh unconfirmed, unpaid membership for `user`.
    pub fn pending(user: &UserEntity) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            chat_id: user.chat_id,
            confirmed: false,
            paid: false,
            payment_pending: false,
            cancelled: false,
        }
    }

    /// Cancelled memberships stay in the roster as history but do not hold a seat.
    pub fn is_active(&self) -> bool {
        !self.cancelled
    }
}

/// Fixed-capacity subgroup of an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Team id, the key invites refer to.
    pub id: Uuid,
    /// Palette label, unique within the event.
    pub label: String,
    /// Target number of active members.
    pub size: u32,
    /// Memberships in join order, including cancelled ones.
    pub members: Vec<MembershipEntity>,
}

impl TeamEntity {
    /// Active memberships in join order.
    pub fn active_members(&self) -> impl Iterator<Item = &MembershipEntity> {
        self.members.iter().filter(|member| member.is_active())
    }

    /// Number of seats currently taken.
    pub fn occupancy(&self) -> usize {
        self.active_members().count()
    }

    /// Whether another active member fits.
    pub fn has_room(&self) -> bool {
        self.occupancy() < self.size as usize
    }
}

/// Committed event with its team structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEntity {
    /// Identifier assigned by the catalog on commit.
    pub id: Uuid,
    /// Sport or activity type.
    pub category: String,
    /// User who confirmed the draft.
    pub organizer_id: Uuid,
    /// Organizer's username when the event was created.
    pub organizer_username: String,
    /// Where organizer notifications are sent.
    pub organizer_chat_id: i64,
    /// Free-text place.
    pub location: String,
    /// Fee owed by each participant.
    pub fee: u64,
    /// Start in UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    /// End in UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    /// Seats per team.
    pub team_size: u32,
    /// Number of teams, equal to `teams.len()`.
    pub team_count: u32,
    /// Whether the event is listed by category.
    pub visibility: Visibility,
    /// Cancelled by the organizer; kept but treated as absent.
    pub cancelled: bool,
    /// Teams in creation order; the order drives tie-breaks during allocation.
    pub teams: Vec<TeamEntity>,
    /// Incremented on every stored mutation; writes are guarded by it.
    pub version: u64,
    /// Commit instant.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl EventEntity {
    /// Total number of seats across all teams.
    pub fn capacity(&self) -> u64 {
        u64::from(self.team_size) * u64::from(self.team_count)
    }

    /// Number of active memberships across all teams.
    pub fn occupancy(&self) -> u64 {
        self.teams.iter().map(|team| team.occupancy() as u64).sum()
    }

    /// Position `(team, member)` of the user's active membership, if any.
    pub fn active_membership(&self, user_id: Uuid) -> Option<(usize, usize)> {
        self.teams.iter().enumerate().find_map(|(team_index, team)| {
            team.members
                .iter()
                .position(|member| member.is_active() && member.user_id == user_id)
                .map(|member_index| (team_index, member_index))
        })
    }

    /// Borrow the user's active membership, if any.
    pub fn membership_of(&self, user_id: Uuid) -> Option<&MembershipEntity> {
        self.active_membership(user_id)
            .map(|(team, member)| &self.teams[team].members[member])
    }

    /// Position of `team_id` in [`EventEntity::teams`].
    pub fn team_index(&self, team_id: Uuid) -> Option<usize> {
        self.teams.iter().position(|team| team.id == team_id)
    }

    /// Length of the scheduled slot in minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.ends_at - self.starts_at).whole_minutes()
    }

    /// Whether the event still appears in listings at `now`.
    pub fn is_upcoming(&self, now: OffsetDateTime) -> bool {
        !self.cancelled && self.starts_at - LISTING_LEAD_TIME > now
    }
}

/// Criteria for listing events; every populated field narrows the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Only this category.
    pub category: Option<String>,
    /// Only events where this user holds an active membership.
    pub member: Option<Uuid>,
    /// Only events organized by this user.
    pub organizer: Option<Uuid>,
    /// Skip private events.
    pub public_only: bool,
    /// Reference instant for the listing lead time.
    pub now: OffsetDateTime,
}

impl EventFilter {
    /// Upcoming events starting from `now`, with no other restriction.
    pub fn upcoming(now: OffsetDateTime) -> Self {
        Self {
            category: None,
            member: None,
            organizer: None,
            public_only: false,
            now,
        }
    }

    /// Evaluate the filter against one event.
    pub fn matches(&self, event: &EventEntity) -> bool {
        event.is_upcoming(self.now)
            && (!self.public_only || event.visibility == Visibility::Public)
            && self
                .category
                .as_ref()
                .is_none_or(|category| &event.category == category)
            && self
                .organizer
                .is_none_or(|organizer| event.organizer_id == organizer)
            && self
                .member
                .is_none_or(|member| event.active_membership(member).is_some())
    }
}
