use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        common::SessionSummary,
        host::{
            ActionResponse, CreateSessionRequest, HostSessionView, LockSessionRequest,
            QuestionResultsResponse, QuizInput, QuizListItem, QuizSummary, StartQuestionRequest,
        },
    },
    error::AppError,
    services::{host_service, session_service},
    state::SharedState,
};

/// Header carrying the host principal on host-only routes.
const HOST_ID_HEADER: &str = "x-host-id";

/// Extracted host principal.
///
/// Authentication itself is out of scope; the identity provider puts the
/// principal in the header and the core only compares it against the
/// session's registered host.
pub struct HostId(pub Uuid);

impl<S> FromRequestParts<S> for HostId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(HOST_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {HOST_ID_HEADER} header")))?;
        let raw = value
            .to_str()
            .map_err(|_| AppError::Unauthorized(format!("invalid {HOST_ID_HEADER} header")))?;
        let id = Uuid::parse_str(raw)
            .map_err(|_| AppError::Unauthorized(format!("{HOST_ID_HEADER} is not a UUID")))?;
        Ok(Self(id))
    }
}

/// Routes reserved to session hosts.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{pin}", get(get_session).delete(close_session))
        .route(
            "/sessions/{pin}/questions/{index}/start",
            post(start_question),
        )
        .route("/sessions/{pin}/question/end", post(end_question))
        .route("/sessions/{pin}/next", post(next_question))
        .route("/sessions/{pin}/end", post(end_session))
        .route("/sessions/{pin}/lock", post(lock_session))
        .route(
            "/sessions/{pin}/questions/{index}/results",
            get(question_results),
        )
        .route("/quizzes", post(create_quiz))
        .route("/quizzes", get(list_quizzes))
}

#[utoipa::path(
    post,
    path = "/sessions",
    tag = "host",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session opened", body = SessionSummary),
        (status = 401, description = "Missing or invalid host identity")
    )
)]
/// Open a new session from an inline or stored quiz.
pub async fn create_session(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    payload.validate()?;
    let summary = session_service::create_session(&state, host_id, payload).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/sessions/{pin}",
    tag = "host",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Host dashboard view", body = HostSessionView))
)]
/// Full host dashboard for a session.
pub async fn get_session(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path(pin): Path<String>,
) -> Result<Json<HostSessionView>, AppError> {
    let view = host_service::get_session(&state, &pin, host_id).await?;
    Ok(Json(view))
}

#[utoipa::path(
    delete,
    path = "/sessions/{pin}",
    tag = "host",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Session closed", body = ActionResponse))
)]
/// Tear a session down and release its coordinator.
pub async fn close_session(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path(pin): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    session_service::close_session(&state, &pin, host_id).await?;
    Ok(Json(ActionResponse {
        message: "closed".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/sessions/{pin}/questions/{index}/start",
    tag = "host",
    params(
        ("pin" = String, Path, description = "Game PIN"),
        ("index" = usize, Path, description = "Question index to start")
    ),
    request_body = StartQuestionRequest,
    responses((status = 200, description = "Question started", body = SessionSummary))
)]
/// Start (or restart) a question and its countdown.
pub async fn start_question(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path((pin, index)): Path<(String, usize)>,
    Json(payload): Json<StartQuestionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    payload.validate()?;
    let summary = host_service::start_question(&state, &pin, host_id, index, payload).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/sessions/{pin}/question/end",
    tag = "host",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Question closed", body = SessionSummary))
)]
/// Close the running question early.
pub async fn end_question(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path(pin): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = host_service::end_question(&state, &pin, host_id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/sessions/{pin}/next",
    tag = "host",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Advanced to the next question or the final scoreboard", body = SessionSummary))
)]
/// Advance past the current question.
pub async fn next_question(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path(pin): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = host_service::next_question(&state, &pin, host_id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/sessions/{pin}/end",
    tag = "host",
    params(("pin" = String, Path, description = "Game PIN")),
    responses((status = 200, description = "Session ended", body = SessionSummary))
)]
/// End the session early from any phase.
pub async fn end_session(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path(pin): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = host_service::end_session(&state, &pin, host_id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/sessions/{pin}/lock",
    tag = "host",
    params(("pin" = String, Path, description = "Game PIN")),
    request_body = LockSessionRequest,
    responses((status = 200, description = "Join gate updated", body = SessionSummary))
)]
/// Open or close the session to new joins.
pub async fn lock_session(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path(pin): Path<String>,
    Json(payload): Json<LockSessionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = host_service::lock_session(&state, &pin, host_id, payload.locked).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/sessions/{pin}/questions/{index}/results",
    tag = "host",
    params(
        ("pin" = String, Path, description = "Game PIN"),
        ("index" = usize, Path, description = "Question index")
    ),
    responses((status = 200, description = "Answer distribution", body = QuestionResultsResponse))
)]
/// Per-option answer distribution for a closed question.
pub async fn question_results(
    State(state): State<SharedState>,
    HostId(host_id): HostId,
    Path((pin, index)): Path<(String, usize)>,
) -> Result<Json<QuestionResultsResponse>, AppError> {
    let results = host_service::question_results(&state, &pin, host_id, index).await?;
    Ok(Json(results))
}

#[utoipa::path(
    post,
    path = "/quizzes",
    tag = "host",
    request_body = QuizInput,
    responses((status = 200, description = "Quiz stored", body = QuizSummary))
)]
/// Store a reusable quiz definition.
pub async fn create_quiz(
    State(state): State<SharedState>,
    Json(payload): Json<QuizInput>,
) -> Result<Json<QuizSummary>, AppError> {
    payload.validate()?;
    let summary = session_service::create_quiz(&state, payload).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/quizzes",
    tag = "host",
    responses((status = 200, description = "Stored quizzes", body = [QuizListItem]))
)]
/// List the stored quizzes.
pub async fn list_quizzes(
    State(state): State<SharedState>,
) -> Result<Json<Vec<QuizListItem>>, AppError> {
    let quizzes = session_service::list_quizzes(&state).await?;
    Ok(Json(quizzes))
}
