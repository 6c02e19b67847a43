/// Team partitioning and seat assignment.
pub mod allocation;
/// Committed events, memberships and users.
pub mod catalog_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Event creation dialog on top of the draft sessions.
pub mod draft_service;
/// Health check service.
pub mod health_service;
/// Dispatch of inbound interactions and the per-interaction error boundary.
pub mod interaction_service;
/// Participation fee transfers.
pub mod payment;
/// Prompt texts and option sets.
pub mod prompts;
/// Command and option data protocol.
pub mod selection;
/// Periodic cleanup of idle sessions.
pub mod session_sweeper;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming for the outbox.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
