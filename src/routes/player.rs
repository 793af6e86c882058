use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::player::{
        AnswerAck, JoinRequest, JoinResponse, LeaderboardResponse, PlayerQuestionView,
        SubmitAnswerRequest,
    },
    error::AppError,
    services::player_service,
    state::SharedState,
};

/// Routes used by player clients.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{pin}/join", post(join_session))
        .route("/sessions/{pin}/answers", post(submit_answer))
        .route("/sessions/{pin}/question", get(current_question))
        .route("/sessions/{pin}/leaderboard", get(leaderboard))
        .route("/sessions/{pin}/leaderboard/reveal", get(leaderboard_reveal))
}

#[utoipa::path(
    post,
    path = "/sessions/{pin}/join",
    tag = "player",
    params(("pin" = String, Path, description = "Game PIN")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined", body = JoinResponse),
        (status = 400, description = "Nickname invalid or already taken"),
        (status = 409, description = "Session is not accepting joins")
    )
)]
/// Join a session while it sits in the lobby.
pub async fn join_session(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    payload.validate()?;
    let response = player_service::join(&state, &pin, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/sessions/{pin}/answers",
    tag = "player",
    params(("pin" = String, Path, description = "Game PIN")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Submission acknowledged", body = AnswerAck),
        (status = 409, description = "No question is currently accepting answers")
    )
)]
/// Submit an answer for the running question.
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerAck>, AppError> {
    let ack = player_service::submit_answer(&state, &pin, payload).await?;
    Ok(Json(ack))
}

#[utoipa::path(
    get,
    path = "/sessions/{pin}/question",
    tag = "player",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Player view of the current phase", body = PlayerQuestionView))
)]
/// Player-safe view of the current phase: answer buttons only, never the
/// question text.
pub async fn current_question(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<PlayerQuestionView>, AppError> {
    let view = player_service::current_question(&state, &pin).await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/sessions/{pin}/leaderboard",
    tag = "player",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Current standings", body = LeaderboardResponse))
)]
/// Current standings.
pub async fn leaderboard(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let response = player_service::leaderboard(&state, &pin).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/sessions/{pin}/leaderboard/reveal",
    tag = "player",
    params(("pin" = String, Path, description = "Game PIN")),
    responses(
        (status = 200, description = "Reveal standings with movement indicators", body = LeaderboardResponse),
        (status = 409, description = "No question has closed yet")
    )
)]
/// Reveal standings with position-change indicators.
pub async fn leaderboard_reveal(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let response = player_service::leaderboard_reveal(&state, &pin).await?;
    Ok(Json(response))
}
