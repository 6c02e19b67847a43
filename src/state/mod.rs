//! Process-wide state shared by the routes and services.

/// Typed event drafts and their step machine.
pub mod draft;
mod outbox;
/// Expiring per-user sessions.
pub mod session;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::event_store::EventStore,
    error::ServiceError,
    services::payment::PaymentGateway,
};

pub use self::draft::{Draft, DraftError, DraftStatus};
pub use self::outbox::Outbox;
pub use self::session::{DraftSessions, InviteeSessions, SessionError, UserKey};

/// Handle cloned into every route and task.
pub type SharedState = Arc<AppState>;

const OUTBOX_CAPACITY: usize = 64;

/// Central application state: storage handle, session stores, outbox and configuration.
pub struct AppState {
    event_store: RwLock<Option<Arc<dyn EventStore>>>,
    degraded: watch::Sender<bool>,
    drafts: DraftSessions,
    invitees: InviteeSessions,
    outbox: Outbox,
    config: Arc<AppConfig>,
    payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, payments: Arc<dyn PaymentGateway>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let idle = config.sessions().idle;
        Arc::new(Self {
            event_store: RwLock::new(None),
            degraded: degraded_tx,
            drafts: DraftSessions::new(idle),
            invitees: InviteeSessions::new(idle),
            outbox: Outbox::new(OUTBOX_CAPACITY),
            config: Arc::new(config),
            payments,
        })
    }

    /// Obtain a handle to the current event store, if one is installed.
    pub async fn event_store(&self) -> Option<Arc<dyn EventStore>> {
        let guard = self.event_store.read().await;
        guard.as_ref().cloned()
    }

    /// Event store usable right now, or [`ServiceError::Degraded`].
    pub async fn require_event_store(&self) -> Result<Arc<dyn EventStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.event_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new event store implementation and leave degraded mode.
    pub async fn set_event_store(&self, store: Arc<dyn EventStore>) {
        {
            let mut guard = self.event_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Event drafts in progress.
    pub fn drafts(&self) -> &DraftSessions {
        &self.drafts
    }

    /// Pending invite flows.
    pub fn invitees(&self) -> &InviteeSessions {
        &self.invitees
    }

    /// Broadcast hub used for the outbox SSE stream.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Gateway used to charge fees.
    pub fn payments(&self) -> Arc<dyn PaymentGateway> {
        self.payments.clone()
    }
}
