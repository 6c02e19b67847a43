use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/outbox",
    tag = "outbox",
    responses((status = 200, description = "Prompts addressed to users other than the sender", content_type = "text/event-stream", body = String))
)]
/// Stream prompts the chat-transport adapter must deliver.
pub async fn outbox_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_outbox(&state);
    info!("New outbox SSE connection");
    let handshake = sse_service::handshake(&state).await;
    sse_service::to_sse_stream(receiver, handshake)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/outbox", get(outbox_stream))
}
