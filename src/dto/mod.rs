/// Event views.
pub mod event;
/// Health payload.
pub mod health;
/// Interaction webhook payloads.
pub mod interaction;
/// Outbox stream frames.
pub mod sse;
/// Custom field validators.
pub mod validation;
