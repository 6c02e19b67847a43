//! Committed events and their memberships.
//!
//! Every mutation is an optimistic loop over the stored aggregate: load it, apply the
//! change in memory, then write it back only if its version is unchanged. The whole call
//! is bounded by the configured catalog timeout.

use std::{collections::HashSet, future::Future};

use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{EventEntity, EventFilter, MembershipEntity, UserEntity},
    dto::interaction::Sender,
    error::ServiceError,
    services::allocation,
    state::{Draft, SharedState},
};

/// Attempts before a write gives up on a hot event.
const MAX_WRITE_ATTEMPTS: usize = 16;

/// Username as stored: trimmed and without the leading `@`.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_owned()
}

async fn bounded<T, F>(state: &SharedState, work: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match timeout(state.config().catalog_timeout(), work).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout),
    }
}

/// Load the event, let `change` edit it, and store it if nobody wrote in between.
async fn mutate_event<T, F>(
    state: &SharedState,
    event_id: Uuid,
    mut change: F,
) -> Result<(EventEntity, T), ServiceError>
where
    F: FnMut(&mut EventEntity) -> Result<T, ServiceError>,
{
    let store = state.require_event_store().await?;
    bounded(state, async move {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut event = store
                .find_event(event_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))?;
            let expected = event.version;
            let outcome = change(&mut event)?;
            event.version = expected + 1;

            if store.replace_event(event.clone(), expected).await? {
                return Ok((event, outcome));
            }
            debug!(%event_id, attempt, "event changed concurrently; retrying");
        }
        warn!(%event_id, "giving up after repeated write conflicts");
        Err(ServiceError::Contention(event_id))
    })
    .await
}

/// Commit a draft that has its organizer attached.
pub async fn create_event(state: &SharedState, draft: Draft) -> Result<EventEntity, ServiceError> {
    let status = draft.status();
    let Draft::OrganizerAssigned { draft, organizer } = draft else {
        return Err(ServiceError::InvalidInput(format!(
            "draft at {status} cannot be committed"
        )));
    };

    let teams = allocation::partition(
        draft.lineup.team_count,
        draft.lineup.team_size,
        state.config().palette(),
    )?;
    let event = EventEntity {
        id: Uuid::new_v4(),
        category: draft.slot.venue.category,
        organizer_id: organizer.id,
        organizer_username: organizer.username,
        organizer_chat_id: organizer.chat_id,
        location: draft.slot.venue.location,
        fee: draft.fee,
        starts_at: draft.slot.starts_at,
        ends_at: draft.slot.ends_at,
        team_size: draft.lineup.team_size,
        team_count: draft.lineup.team_count,
        visibility: draft.visibility,
        cancelled: false,
        teams,
        version: 0,
        created_at: OffsetDateTime::now_utc(),
    };

    let store = state.require_event_store().await?;
    let stored = event.clone();
    bounded(state, async move { Ok(store.insert_event(stored).await?) }).await?;
    info!(event_id = %event.id, category = %event.category, "event created");
    Ok(event)
}

/// Event by id, cancelled ones included.
pub async fn get_event(state: &SharedState, id: Uuid) -> Result<EventEntity, ServiceError> {
    let store = state.require_event_store().await?;
    bounded(state, async move {
        store
            .find_event(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("event {id}")))
    })
    .await
}

/// Event owning `team_id`, with the team's position in it.
pub async fn event_for_team(
    state: &SharedState,
    team_id: Uuid,
) -> Result<(EventEntity, usize), ServiceError> {
    let store = state.require_event_store().await?;
    bounded(state, async move {
        let event = store
            .find_event_by_team(team_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("team {team_id}")))?;
        let index = event
            .team_index(team_id)
            .ok_or_else(|| ServiceError::NotFound(format!("team {team_id}")))?;
        Ok((event, index))
    })
    .await
}

async fn list(state: &SharedState, filter: EventFilter) -> Result<Vec<EventEntity>, ServiceError> {
    let store = state.require_event_store().await?;
    bounded(state, async move { Ok(store.list_events(filter).await?) }).await
}

/// Public upcoming events of one category, soonest first.
pub async fn list_open_events_by_category(
    state: &SharedState,
    category: &str,
) -> Result<Vec<EventEntity>, ServiceError> {
    let filter = EventFilter {
        category: Some(category.to_owned()),
        public_only: true,
        ..EventFilter::upcoming(OffsetDateTime::now_utc())
    };
    list(state, filter).await
}

/// Upcoming events where the user holds an active membership.
pub async fn list_events_for_user(
    state: &SharedState,
    user_id: Uuid,
) -> Result<Vec<EventEntity>, ServiceError> {
    let filter = EventFilter {
        member: Some(user_id),
        ..EventFilter::upcoming(OffsetDateTime::now_utc())
    };
    list(state, filter).await
}

/// Upcoming events the user organizes.
pub async fn list_events_by_organizer(
    state: &SharedState,
    organizer_id: Uuid,
) -> Result<Vec<EventEntity>, ServiceError> {
    let filter = EventFilter {
        organizer: Some(organizer_id),
        ..EventFilter::upcoming(OffsetDateTime::now_utc())
    };
    list(state, filter).await
}

/// Registered user holding `username`.
pub async fn resolve_user(state: &SharedState, username: &str) -> Result<UserEntity, ServiceError> {
    let username = normalize_username(username);
    let store = state.require_event_store().await?;
    bounded(state, async move {
        store
            .find_user_by_username(username.clone())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user @{username}")))
    })
    .await
}

/// Register the sender, or refresh the contact details of the existing record.
pub async fn create_user(state: &SharedState, sender: &Sender) -> Result<UserEntity, ServiceError> {
    let user = UserEntity {
        id: Uuid::new_v4(),
        name: sender.first_name.clone(),
        username: normalize_username(&sender.username),
        chat_id: sender.chat_id,
        phone: sender.phone.clone(),
    };
    let store = state.require_event_store().await?;
    bounded(state, async move { Ok(store.upsert_user(user).await?) }).await
}

/// Join the least loaded team with room left.
///
/// Returns the stored event and the index of the team joined.
pub async fn sign_up(
    state: &SharedState,
    event_id: Uuid,
    user: &UserEntity,
) -> Result<(EventEntity, usize), ServiceError> {
    let (event, team) = mutate_event(state, event_id, |event| {
        if event.cancelled {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }
        if event.active_membership(user.id).is_some() {
            return Err(ServiceError::AlreadyMember);
        }
        let team = allocation::select_team(&event.teams)?;
        event.teams[team]
            .members
            .push(MembershipEntity::pending(user));
        Ok(team)
    })
    .await?;
    info!(%event_id, user = %user.username, team = %event.teams[team].label, "signed up");
    Ok((event, team))
}

/// Cancel the user's active membership; the seat is released, the record stays.
pub async fn sign_out(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<EventEntity, ServiceError> {
    let (event, ()) = mutate_event(state, event_id, |event| {
        let (team, member) = event
            .active_membership(user_id)
            .ok_or(ServiceError::NotMember)?;
        event.teams[team].members[member].cancelled = true;
        Ok(())
    })
    .await?;
    info!(%event_id, %user_id, "signed out");
    Ok(event)
}

/// Mark the user's active membership as confirmed.
pub async fn confirm_attendance(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<EventEntity, ServiceError> {
    let (event, ()) = mutate_event(state, event_id, |event| {
        let (team, member) = event
            .active_membership(user_id)
            .ok_or(ServiceError::NotMember)?;
        event.teams[team].members[member].confirmed = true;
        Ok(())
    })
    .await?;
    Ok(event)
}

/// Organizer-only. Marks the event cancelled and keeps every membership as history.
pub async fn cancel_event(
    state: &SharedState,
    organizer_id: Uuid,
    event_id: Uuid,
) -> Result<EventEntity, ServiceError> {
    let (event, ()) = mutate_event(state, event_id, |event| {
        if event.organizer_id != organizer_id {
            return Err(ServiceError::Unauthorized(
                "only the organizer can cancel this event".into(),
            ));
        }
        event.cancelled = true;
        Ok(())
    })
    .await?;
    info!(%event_id, "event cancelled");
    Ok(event)
}

/// Add the named users to a team, as many as it has room for.
///
/// Unknown usernames and users already active in the event are skipped. Returns the
/// users actually added, in the order given.
pub async fn add_team_members(
    state: &SharedState,
    requester_id: Uuid,
    team_id: Uuid,
    usernames: &[String],
) -> Result<(EventEntity, Vec<UserEntity>), ServiceError> {
    let (event, _) = event_for_team(state, team_id).await?;

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for raw in usernames {
        let username = normalize_username(raw);
        if username.is_empty() || !seen.insert(username.clone()) {
            continue;
        }
        match resolve_user(state, &username).await {
            Ok(user) => candidates.push(user),
            Err(ServiceError::NotFound(_)) => debug!(%username, "skipping unknown username"),
            Err(err) => return Err(err),
        }
    }

    let (event, added) = mutate_event(state, event.id, |event| {
        let team = event
            .team_index(team_id)
            .ok_or_else(|| ServiceError::NotFound(format!("team {team_id}")))?;
        let may_invite = event.organizer_id == requester_id
            || event.teams[team]
                .active_members()
                .any(|member| member.user_id == requester_id);
        if !may_invite {
            return Err(ServiceError::Unauthorized(
                "only the organizer or a team member can add players".into(),
            ));
        }
        if event.cancelled {
            return Err(ServiceError::NotFound(format!("event {}", event.id)));
        }

        let mut added = Vec::new();
        let mut refused = false;
        for user in &candidates {
            if event.active_membership(user.id).is_some() {
                continue;
            }
            if !event.teams[team].has_room() {
                refused = true;
                break;
            }
            event.teams[team]
                .members
                .push(MembershipEntity::pending(user));
            added.push(user.clone());
        }
        if added.is_empty() && refused {
            return Err(ServiceError::TeamFull);
        }
        Ok(added)
    })
    .await?;

    info!(event_id = %event.id, %team_id, added = added.len(), "team members added");
    Ok((event, added))
}

/// Settle the per-participant fee for a confirmed membership and mark it paid.
///
/// The membership is claimed before the bank is called, so at most one charge runs for it.
/// A failed charge releases the claim.
pub async fn pay_fee(
    state: &SharedState,
    event_id: Uuid,
    user: &UserEntity,
) -> Result<EventEntity, ServiceError> {
    let phone = user.phone.clone().ok_or_else(|| {
        ServiceError::InvalidInput("share a phone number before paying".into())
    })?;

    let (event, ()) = mutate_event(state, event_id, |event| {
        let (team, member) = event
            .active_membership(user.id)
            .ok_or(ServiceError::NotMember)?;
        let membership = &mut event.teams[team].members[member];
        check_payable(membership)?;
        membership.payment_pending = true;
        Ok(())
    })
    .await?;

    if event.fee > 0 {
        if let Err(err) = state.payments().make_payment(phone, event.fee).await {
            if let Err(release) = release_payment_claim(state, event_id, user.id).await {
                warn!(
                    %event_id,
                    user = %user.username,
                    error = %release,
                    "payment claim not released"
                );
            }
            return Err(err.into());
        }
    }

    let (event, ()) = mutate_event(state, event_id, |event| {
        let (team, member) = event
            .active_membership(user.id)
            .ok_or(ServiceError::NotMember)?;
        let membership = &mut event.teams[team].members[member];
        if membership.paid || !membership.payment_pending {
            return Err(ServiceError::Internal(format!(
                "payment claim for {} lost on event {event_id}",
                user.id
            )));
        }
        membership.paid = true;
        membership.payment_pending = false;
        Ok(())
    })
    .await
    .inspect_err(|err| {
        error!(%event_id, user = %user.username, error = %err, "charged fee not recorded");
    })?;
    info!(%event_id, user = %user.username, "fee paid");
    Ok(event)
}

async fn release_payment_claim(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    mutate_event(state, event_id, |event| {
        if let Some((team, member)) = event.active_membership(user_id) {
            event.teams[team].members[member].payment_pending = false;
        }
        Ok(())
    })
    .await
    .map(|_| ())
}

fn check_payable(membership: &MembershipEntity) -> Result<(), ServiceError> {
    if !membership.confirmed {
        return Err(ServiceError::InvalidInput(
            "confirm attendance before paying".into(),
        ));
    }
    if membership.paid {
        return Err(ServiceError::InvalidInput("fee already paid".into()));
    }
    if membership.payment_pending {
        return Err(ServiceError::InvalidInput("payment already in progress".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration as StdDuration,
    };

    use futures::future::{BoxFuture, join_all};
    use time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            event_store::{EventStore, MemoryEventStore},
            models::Visibility,
            storage::StorageResult,
        },
        services::payment::{PaymentError, PaymentGateway},
        state::{
            AppState,
            draft::{CompleteDraft, Lineup, Slot, Venue},
        },
    };

    #[derive(Default)]
    struct RecordingPayments {
        calls: Mutex<Vec<(String, u64)>>,
    }

    impl PaymentGateway for RecordingPayments {
        fn make_payment(
            &self,
            phone: String,
            amount: u64,
        ) -> BoxFuture<'static, Result<(), PaymentError>> {
            self.calls.lock().unwrap().push((phone, amount));
            Box::pin(async { Ok(()) })
        }
    }

    /// Gateway whose charges take a while; the first `failures` calls are declined.
    struct SlowPayments {
        calls: AtomicUsize,
        failures: usize,
    }

    impl SlowPayments {
        fn new(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
            }
        }
    }

    impl PaymentGateway for SlowPayments {
        fn make_payment(
            &self,
            _phone: String,
            _amount: u64,
        ) -> BoxFuture<'static, Result<(), PaymentError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let declined = call < self.failures;
            Box::pin(async move {
                tokio::time::sleep(StdDuration::from_millis(50)).await;
                if declined {
                    Err(PaymentError::MissingCredentials)
                } else {
                    Ok(())
                }
            })
        }
    }

    /// Memory store whose conditional writes stall before reaching the data.
    struct StallingStore {
        inner: MemoryEventStore,
        stall: StdDuration,
    }

    impl EventStore for StallingStore {
        fn insert_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_event(event)
        }

        fn find_event(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
            self.inner.find_event(id)
        }

        fn find_event_by_team(
            &self,
            team_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
            self.inner.find_event_by_team(team_id)
        }

        fn replace_event(
            &self,
            event: EventEntity,
            expected_version: u64,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            let inner = self.inner.clone();
            let stall = self.stall;
            Box::pin(async move {
                tokio::time::sleep(stall).await;
                inner.replace_event(event, expected_version).await
            })
        }

        fn list_events(
            &self,
            filter: EventFilter,
        ) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
            self.inner.list_events(filter)
        }

        fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
            self.inner.find_user(id)
        }

        fn find_user_by_username(
            &self,
            username: String,
        ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
            self.inner.find_user_by_username(username)
        }

        fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<UserEntity>> {
            self.inner.upsert_user(user)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    async fn state_with(payments: Arc<dyn PaymentGateway>) -> SharedState {
        let state = AppState::new(AppConfig::default(), payments);
        state
            .set_event_store(Arc::new(MemoryEventStore::new()))
            .await;
        state
    }

    async fn state() -> SharedState {
        state_with(Arc::new(RecordingPayments::default())).await
    }

    fn sender(username: &str, chat_id: i64) -> Sender {
        Sender {
            chat_id,
            username: username.into(),
            first_name: username.to_uppercase(),
            phone: Some(format!("7700{chat_id}")),
        }
    }

    async fn event(state: &SharedState, team_size: u32, team_count: u32, fee: u64) -> EventEntity {
        let organizer = create_user(state, &sender("coach", 1)).await.unwrap();
        let starts_at = OffsetDateTime::now_utc() + Duration::hours(5);
        let draft = Draft::VisibilitySet(CompleteDraft {
            slot: Slot {
                venue: Venue {
                    category: "football".into(),
                    location: "Arena 5".into(),
                },
                starts_at,
                ends_at: starts_at + Duration::minutes(90),
            },
            lineup: Lineup {
                team_size,
                team_count,
            },
            fee,
            visibility: Visibility::Public,
        })
        .assign_organizer(organizer)
        .unwrap();
        create_event(state, draft).await.unwrap()
    }

    #[tokio::test]
    async fn committed_event_has_one_team_per_requested_count() {
        let state = state().await;
        let event = event(&state, 5, 2, 5000).await;

        assert_eq!(event.teams.len(), 2);
        assert!(event.teams.iter().all(|team| team.size == 5));
        assert_eq!(event.capacity(), 10);
        assert_eq!(get_event(&state, event.id).await.unwrap(), event);
    }

    #[tokio::test]
    async fn uncommitted_draft_is_refused() {
        let state = state().await;
        let err = create_event(&state, Draft::New).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn two_users_fill_a_two_seat_event_and_the_third_is_refused() {
        let state = state().await;
        let event = event(&state, 1, 2, 0).await;
        let first = create_user(&state, &sender("ann", 10)).await.unwrap();
        let second = create_user(&state, &sender("bob", 11)).await.unwrap();
        let third = create_user(&state, &sender("cid", 12)).await.unwrap();

        let (a, b) = tokio::join!(
            sign_up(&state, event.id, &first),
            sign_up(&state, event.id, &second)
        );
        let (_, team_a) = a.unwrap();
        let (_, team_b) = b.unwrap();
        assert_ne!(team_a, team_b);

        let err = sign_up(&state, event.id, &third).await.unwrap_err();
        assert!(matches!(err, ServiceError::EventFull));
    }

    #[tokio::test]
    async fn concurrent_sign_ups_never_exceed_capacity() {
        let state = state().await;
        let event = event(&state, 3, 2, 0).await;
        let mut users = Vec::new();
        for i in 0..12 {
            users.push(
                create_user(&state, &sender(&format!("player{i}"), 100 + i))
                    .await
                    .unwrap(),
            );
        }

        let results = join_all(users.iter().map(|user| {
            let state = state.clone();
            let user = user.clone();
            let event_id = event.id;
            tokio::spawn(async move { sign_up(&state, event_id, &user).await })
        }))
        .await;

        let succeeded = results
            .iter()
            .filter(|result| matches!(result, Ok(Ok(_))))
            .count();
        let full = results
            .iter()
            .filter(|result| matches!(result, Ok(Err(ServiceError::EventFull))))
            .count();
        assert_eq!(succeeded, 6);
        assert_eq!(full, 6);

        let stored = get_event(&state, event.id).await.unwrap();
        assert!(stored.teams.iter().all(|team| team.occupancy() == 3));
    }

    #[tokio::test]
    async fn signing_up_twice_is_refused() {
        let state = state().await;
        let event = event(&state, 5, 2, 0).await;
        let user = create_user(&state, &sender("ann", 10)).await.unwrap();

        sign_up(&state, event.id, &user).await.unwrap();
        let err = sign_up(&state, event.id, &user).await.unwrap_err();

        assert!(matches!(err, ServiceError::AlreadyMember));
    }

    #[tokio::test]
    async fn signing_out_twice_reports_not_member_without_touching_capacity() {
        let state = state().await;
        let event = event(&state, 5, 2, 0).await;
        let user = create_user(&state, &sender("ann", 10)).await.unwrap();
        sign_up(&state, event.id, &user).await.unwrap();

        let after_first = sign_out(&state, event.id, user.id).await.unwrap();
        assert_eq!(allocation::capacity_remaining(&after_first), 10);

        let err = sign_out(&state, event.id, user.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotMember));
        let stored = get_event(&state, event.id).await.unwrap();
        assert_eq!(allocation::capacity_remaining(&stored), 10);
        assert_eq!(stored.version, after_first.version);
    }

    #[tokio::test]
    async fn only_the_organizer_can_cancel() {
        let state = state().await;
        let event = event(&state, 5, 2, 0).await;
        let stranger = create_user(&state, &sender("eve", 66)).await.unwrap();

        let err = cancel_event(&state, stranger.id, event.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let cancelled = cancel_event(&state, event.organizer_id, event.id)
            .await
            .unwrap();
        assert!(cancelled.cancelled);

        let err = sign_up(&state, event.id, &stranger).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn adding_members_skips_unknown_names_and_respects_team_size() {
        let state = state().await;
        let event = event(&state, 2, 2, 0).await;
        let team_id = event.teams[0].id;
        create_user(&state, &sender("ann", 10)).await.unwrap();
        create_user(&state, &sender("bob", 11)).await.unwrap();
        create_user(&state, &sender("cid", 12)).await.unwrap();

        let names = ["@ann", "ghost", "bob", "cid"].map(String::from);
        let (stored, added) = add_team_members(&state, event.organizer_id, team_id, &names)
            .await
            .unwrap();

        let added: Vec<_> = added.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(added, ["ann", "bob"]);
        assert_eq!(stored.teams[0].occupancy(), 2);

        let err = add_team_members(&state, event.organizer_id, team_id, &["cid".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TeamFull));
    }

    #[tokio::test]
    async fn outsiders_cannot_add_members() {
        let state = state().await;
        let event = event(&state, 2, 2, 0).await;
        let outsider = create_user(&state, &sender("eve", 66)).await.unwrap();

        let err = add_team_members(&state, outsider.id, event.teams[1].id, &["ann".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn paying_requires_confirmation_and_records_the_fee() {
        let payments = Arc::new(RecordingPayments::default());
        let state = state_with(payments.clone()).await;
        let event = event(&state, 5, 2, 2500).await;
        let user = create_user(&state, &sender("ann", 10)).await.unwrap();
        sign_up(&state, event.id, &user).await.unwrap();

        let err = pay_fee(&state, event.id, &user).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        confirm_attendance(&state, event.id, user.id).await.unwrap();
        let paid = pay_fee(&state, event.id, &user).await.unwrap();

        assert!(paid.membership_of(user.id).unwrap().paid);
        assert_eq!(
            payments.calls.lock().unwrap().as_slice(),
            [("770010".to_string(), 2500)]
        );
        let err = pay_fee(&state, event.id, &user).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn concurrent_payments_charge_once() {
        let payments = Arc::new(SlowPayments::new(0));
        let state = state_with(payments.clone()).await;
        let event = event(&state, 5, 2, 2500).await;
        let user = create_user(&state, &sender("ann", 10)).await.unwrap();
        sign_up(&state, event.id, &user).await.unwrap();
        confirm_attendance(&state, event.id, user.id).await.unwrap();

        let (first, second) = tokio::join!(
            pay_fee(&state, event.id, &user),
            pay_fee(&state, event.id, &user)
        );

        let succeeded = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        let refused = if first.is_ok() { second } else { first };
        assert!(matches!(refused, Err(ServiceError::InvalidInput(_))));
        assert_eq!(payments.calls.load(Ordering::SeqCst), 1);

        let stored = get_event(&state, event.id).await.unwrap();
        let membership = stored.membership_of(user.id).unwrap();
        assert!(membership.paid);
        assert!(!membership.payment_pending);
    }

    #[tokio::test]
    async fn declined_charge_can_be_retried() {
        let payments = Arc::new(SlowPayments::new(1));
        let state = state_with(payments.clone()).await;
        let event = event(&state, 5, 2, 2500).await;
        let user = create_user(&state, &sender("ann", 10)).await.unwrap();
        sign_up(&state, event.id, &user).await.unwrap();
        confirm_attendance(&state, event.id, user.id).await.unwrap();

        let err = pay_fee(&state, event.id, &user).await.unwrap_err();
        assert!(matches!(err, ServiceError::Payment(_)));
        let stored = get_event(&state, event.id).await.unwrap();
        let membership = stored.membership_of(user.id).unwrap();
        assert!(!membership.paid);
        assert!(!membership.payment_pending);

        let paid = pay_fee(&state, event.id, &user).await.unwrap();
        assert!(paid.membership_of(user.id).unwrap().paid);
        assert_eq!(payments.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn adding_only_unknown_names_adds_nobody() {
        let state = state().await;
        let event = event(&state, 2, 2, 0).await;
        let team_id = event.teams[0].id;

        let names = ["@ghost", "phantom"].map(String::from);
        let (stored, added) = add_team_members(&state, event.organizer_id, team_id, &names)
            .await
            .unwrap();

        assert!(added.is_empty());
        assert_eq!(stored.teams[0].occupancy(), 0);
    }

    #[tokio::test]
    async fn timed_out_write_leaves_the_event_untouched() {
        let state = AppState::new(
            AppConfig::default().with_catalog_timeout(StdDuration::from_millis(50)),
            Arc::new(RecordingPayments::default()),
        );
        let memory = MemoryEventStore::new();
        state.set_event_store(Arc::new(memory.clone())).await;
        let event = event(&state, 5, 2, 0).await;
        let user = create_user(&state, &sender("ann", 10)).await.unwrap();

        state
            .set_event_store(Arc::new(StallingStore {
                inner: memory.clone(),
                stall: StdDuration::from_millis(200),
            }))
            .await;
        let err = sign_up(&state, event.id, &user).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout));

        tokio::time::sleep(StdDuration::from_millis(250)).await;
        let stored = memory.find_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored, event);
        assert!(stored.membership_of(user.id).is_none());
    }

    #[tokio::test]
    async fn degraded_catalog_is_reported_as_unavailable() {
        let state = AppState::new(
            AppConfig::default().with_catalog_timeout(StdDuration::from_millis(50)),
            Arc::new(RecordingPayments::default()),
        );

        let err = get_event(&state, Uuid::new_v4()).await.unwrap_err();

        assert!(err.is_catalog_unavailable());
    }

    #[tokio::test]
    async fn listings_follow_visibility_and_membership() {
        let state = state().await;
        let open = event(&state, 5, 2, 0).await;
        let user = create_user(&state, &sender("ann", 10)).await.unwrap();
        sign_up(&state, open.id, &user).await.unwrap();

        let by_category = list_open_events_by_category(&state, "football")
            .await
            .unwrap();
        assert_eq!(by_category.len(), 1);
        assert!(
            list_open_events_by_category(&state, "volleyball")
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(list_events_for_user(&state, user.id).await.unwrap().len(), 1);
        assert_eq!(
            list_events_by_organizer(&state, open.organizer_id)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(list_events_by_organizer(&state, user.id).await.unwrap().is_empty());
    }
}
