use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the matchday backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::interactions::receive_interaction,
        crate::routes::events::list_events,
        crate::routes::events::get_event,
        crate::routes::sse::outbox_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::interaction::InboundInteraction,
            crate::dto::interaction::InteractionKind,
            crate::dto::interaction::Sender,
            crate::dto::interaction::InteractionResponse,
            crate::dto::interaction::OutboundPrompt,
            crate::dto::interaction::PromptOption,
            crate::dto::event::EventView,
            crate::dto::event::TeamView,
            crate::dto::event::MemberView,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dao::models::Visibility,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "interactions", description = "Webhook for the chat-transport adapter"),
        (name = "events", description = "Read-only event catalog"),
        (name = "outbox", description = "Prompts for users other than the sender"),
    )
)]
/// OpenAPI document of the HTTP surface.
pub struct ApiDoc;
