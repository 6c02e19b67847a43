use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Read-only event catalog.
pub mod events;
/// Health check.
pub mod health;
/// Chat webhook.
pub mod interactions;
/// Outbox stream.
pub mod sse;

/// Compose all route trees and attach the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(interactions::router(state.clone()))
        .merge(events::router())
        .merge(sse::router())
        .merge(docs::router());

    api_router.with_state(state)
}
