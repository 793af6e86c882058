use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sessions/{pin}/events",
    tag = "sse",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Session snapshot stream", content_type = "text/event-stream", body = String))
)]
/// Stream reconciled session snapshots to a connected client.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let stream = sse_service::session_events(&state, &pin).await?;
    info!(pin = %pin, "new session SSE connection");
    Ok(stream)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{pin}/events", get(session_events))
}
