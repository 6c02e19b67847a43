use std::{
    hash::Hash,
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use uuid::Uuid;

use crate::state::draft::{Draft, DraftError, DraftStatus};

/// Chat identity used to key every per-user session.
pub type UserKey = i64;

/// Failure of a read-modify-write on an expiring entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError<E> {
    /// No live entry for the key, either never created or expired.
    #[error("no active session")]
    NotFound,
    /// The mutation refused the current value; the entry is left untouched.
    #[error(transparent)]
    Rejected(E),
}

struct Slot<V> {
    value: V,
    touched: Instant,
}

impl<V> Slot<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            touched: Instant::now(),
        }
    }

    fn is_expired(&self, idle: Duration) -> bool {
        self.touched.elapsed() > idle
    }
}

/// Keyed store whose entries vanish once idle for longer than the configured window.
///
/// Every read-modify-write runs while holding the key's shard guard, so operations on the
/// same key serialize while different keys proceed independently.
pub struct ExpiringStore<K, V> {
    entries: DashMap<K, Slot<V>>,
    idle: Duration,
}

impl<K, V> ExpiringStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Empty store whose entries expire after `idle` without a write.
    pub fn new(idle: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            idle,
        }
    }

    /// Insert `value`, replacing whatever the key held.
    pub fn put(&self, key: K, value: V) {
        self.entries.insert(key, Slot::new(value));
    }

    /// Insert `value` only when the key holds no live entry. Returns whether it was stored.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) if slot.get().is_expired(self.idle) => {
                slot.insert(Slot::new(value));
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Slot::new(value));
                true
            }
        }
    }

    /// Clone of the live value. An expired entry is removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().is_expired(self.idle) => {
                slot.remove();
                None
            }
            Entry::Occupied(slot) => Some(slot.get().value.clone()),
            Entry::Vacant(_) => None,
        }
    }

    /// Replace the live value with the result of `mutation` and refresh its idle timer.
    pub fn update<F, E>(&self, key: &K, mutation: F) -> Result<V, SessionError<E>>
    where
        F: FnOnce(&V) -> Result<V, E>,
    {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().is_expired(self.idle) => {
                slot.remove();
                Err(SessionError::NotFound)
            }
            Entry::Occupied(mut slot) => {
                let next = mutation(&slot.get().value).map_err(SessionError::Rejected)?;
                slot.insert(Slot::new(next.clone()));
                Ok(next)
            }
            Entry::Vacant(_) => Err(SessionError::NotFound),
        }
    }

    /// Remove and return the live value when `accept` agrees; otherwise leave it in place.
    pub fn take_if<F, E>(&self, key: &K, accept: F) -> Result<V, SessionError<E>>
    where
        F: FnOnce(&V) -> Result<(), E>,
    {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().is_expired(self.idle) => {
                slot.remove();
                Err(SessionError::NotFound)
            }
            Entry::Occupied(slot) => {
                accept(&slot.get().value).map_err(SessionError::Rejected)?;
                Ok(slot.remove().value)
            }
            Entry::Vacant(_) => Err(SessionError::NotFound),
        }
    }

    /// Drop the key's entry, live or expired.
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every expired entry, returning how many were reclaimed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(self.idle));
        before.saturating_sub(self.entries.len())
    }

    /// Stored entries, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored, not even expired entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-user in-progress event drafts.
pub struct DraftSessions {
    store: ExpiringStore<UserKey, Draft>,
}

impl DraftSessions {
    /// Drafts expire after `idle` without a step.
    pub fn new(idle: Duration) -> Self {
        Self {
            store: ExpiringStore::new(idle),
        }
    }

    /// Start a fresh draft, discarding any previous one for the user.
    pub fn begin(&self, user: UserKey) -> Draft {
        self.store.put(user, Draft::New);
        Draft::New
    }

    /// Apply `mutation` to the user's draft and store the result.
    pub fn advance<F>(&self, user: UserKey, mutation: F) -> Result<Draft, SessionError<DraftError>>
    where
        F: FnOnce(&Draft) -> Result<Draft, DraftError>,
    {
        self.store.update(&user, mutation)
    }

    /// Status of the user's live draft.
    pub fn status(&self, user: UserKey) -> Result<DraftStatus, SessionError<DraftError>> {
        self.snapshot(user).map(|draft| draft.status())
    }

    /// Copy of the user's live draft.
    pub fn snapshot(&self, user: UserKey) -> Result<Draft, SessionError<DraftError>> {
        self.store.get(&user).ok_or(SessionError::NotFound)
    }

    /// Remove a completed draft so exactly one caller may commit it.
    pub fn take_complete(&self, user: UserKey) -> Result<Draft, SessionError<DraftError>> {
        self.store.take_if(&user, |draft| match draft.status() {
            DraftStatus::VisibilitySet => Ok(()),
            status => Err(DraftError::UnexpectedStep {
                status,
                step: "confirmation",
            }),
        })
    }

    /// Put a draft back after a failed commit, unless the user already started another one.
    pub fn restore(&self, user: UserKey, draft: Draft) -> bool {
        self.store.put_if_absent(user, draft)
    }

    /// Drop the user's draft without committing it.
    pub fn discard(&self, user: UserKey) {
        self.store.remove(&user);
    }

    /// Drop expired sessions, returning how many went.
    pub fn sweep(&self) -> usize {
        self.store.sweep()
    }

    /// Stored sessions, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.store.len()
    }
}

/// Step of the invite side flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteeStatus {
    /// The next free text is a list of usernames.
    AwaitingUsernames,
}

/// Pending "add these usernames to my team" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteeSession {
    /// Event owning the team.
    pub event_id: Uuid,
    /// Team the usernames are added to.
    pub team_id: Uuid,
    /// Current step.
    pub status: InviteeStatus,
}

/// Per-user invite side flow, independent from drafts.
pub struct InviteeSessions {
    store: ExpiringStore<UserKey, InviteeSession>,
}

impl InviteeSessions {
    /// Invites expire after `idle` without an answer.
    pub fn new(idle: Duration) -> Self {
        Self {
            store: ExpiringStore::new(idle),
        }
    }

    /// Wait for usernames to add to `team_id`, replacing any earlier invite of the user.
    pub fn open(&self, user: UserKey, event_id: Uuid, team_id: Uuid) {
        self.store.put(
            user,
            InviteeSession {
                event_id,
                team_id,
                status: InviteeStatus::AwaitingUsernames,
            },
        );
    }

    /// Consume the pending invite; a second call finds nothing.
    pub fn take(&self, user: UserKey) -> Option<InviteeSession> {
        self.store
            .take_if(&user, |_| Ok::<(), ()>(()))
            .ok()
    }

    /// Drop expired sessions, returning how many went.
    pub fn sweep(&self) -> usize {
        self.store.sweep()
    }

    /// Stored sessions, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.store.len()
    }
}
