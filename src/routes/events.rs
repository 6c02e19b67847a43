use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{dto::event::EventView, error::AppError, services::catalog_service, state::SharedState};

/// Read-only catalog routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
}

/// Query string of `GET /events`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Sport to list open matches for.
    pub category: String,
}

/// Open upcoming public events of a category, soonest first.
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    params(ListQuery),
    responses(
        (status = 200, description = "Open events", body = [EventView]),
        (status = 503, description = "Catalog unavailable")
    )
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<EventView>>, AppError> {
    let events = catalog_service::list_open_events_by_category(&state, &query.category).await?;
    let config = state.config();
    Ok(Json(
        events
            .iter()
            .map(|event| EventView::from_entity(event, config))
            .collect(),
    ))
}

/// A single event with its roster.
#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "events",
    params(("id" = String, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Event found", body = EventView),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn get_event(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventView>, AppError> {
    let event = catalog_service::get_event(&state, id).await?;
    Ok(Json(EventView::from_entity(&event, state.config())))
}
