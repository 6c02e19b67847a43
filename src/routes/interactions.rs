use axum::{
    Json, Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_valid::Valid;
use tracing::warn;

use crate::{
    dto::interaction::{InboundInteraction, InteractionResponse},
    error::AppError,
    services::interaction_service,
    state::SharedState,
};

/// Header the chat-transport adapter authenticates with when a token is configured.
pub const TRANSPORT_TOKEN_HEADER: &str = "x-transport-token";

/// Routes receiving interactions from the chat-transport adapter.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/interactions", post(receive_interaction))
        .route_layer(middleware::from_fn_with_state(state, require_transport_token))
}

/// Handle one inbound interaction and return the prompts for its sender.
#[utoipa::path(
    post,
    path = "/interactions",
    tag = "interactions",
    request_body = InboundInteraction,
    params(("X-Transport-Token" = Option<String>, Header, description = "Shared secret, required when configured")),
    responses(
        (status = 200, description = "Prompts addressed to the sender", body = InteractionResponse),
        (status = 400, description = "Malformed interaction"),
        (status = 401, description = "Missing or wrong transport token")
    )
)]
/// Handle one interaction and answer with the sender's prompts.
pub async fn receive_interaction(
    State(state): State<SharedState>,
    Valid(Json(interaction)): Valid<Json<InboundInteraction>>,
) -> Json<InteractionResponse> {
    Json(interaction_service::handle(state, interaction).await)
}

async fn require_transport_token(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = state.config().transport_token() {
        let provided = request
            .headers()
            .get(TRANSPORT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            warn!("interaction rejected: bad transport token");
            return AppError::Unauthorized("invalid transport token".into()).into_response();
        }
    }
    next.run(request).await
}
