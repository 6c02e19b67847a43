//! Health endpoint payload.

use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Event drafts currently held in memory.
    pub open_drafts: usize,
    /// Invite flows waiting for usernames.
    pub open_invites: usize,
}

impl HealthResponse {
    /// Payload for the current degraded flag and session counters.
    pub fn new(degraded: bool, open_drafts: usize, open_invites: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            open_drafts,
            open_invites,
        }
    }

    /// Whether the payload reports degraded mode.
    pub fn is_degraded(&self) -> bool {
        self.status == "degraded"
    }
}
