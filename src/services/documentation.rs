use utoipa::OpenApi;

/// Aggregated OpenAPI specification for the quizpin backend.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::session_events,
        crate::routes::host::create_session,
        crate::routes::host::get_session,
        crate::routes::host::close_session,
        crate::routes::host::start_question,
        crate::routes::host::end_question,
        crate::routes::host::next_question,
        crate::routes::host::end_session,
        crate::routes::host::lock_session,
        crate::routes::host::question_results,
        crate::routes::host::create_quiz,
        crate::routes::host::list_quizzes,
        crate::routes::player::join_session,
        crate::routes::player::submit_answer,
        crate::routes::player::current_question,
        crate::routes::player::leaderboard,
        crate::routes::player::leaderboard_reveal,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::SessionSummary,
            crate::dto::common::QuestionPrompt,
            crate::dto::host::CreateSessionRequest,
            crate::dto::host::QuizInput,
            crate::dto::host::QuestionInput,
            crate::dto::host::AnswerOptionInput,
            crate::dto::host::StartQuestionRequest,
            crate::dto::host::LockSessionRequest,
            crate::dto::host::ActionResponse,
            crate::dto::host::PlayerSummary,
            crate::dto::host::HostQuestionView,
            crate::dto::host::HostAnswerOption,
            crate::dto::host::HostSessionView,
            crate::dto::host::AnswerDistribution,
            crate::dto::host::QuestionResultsResponse,
            crate::dto::host::QuizSummary,
            crate::dto::host::QuizListItem,
            crate::dto::player::JoinRequest,
            crate::dto::player::JoinResponse,
            crate::dto::player::SubmitAnswerRequest,
            crate::dto::player::AnswerAck,
            crate::dto::player::PlayerQuestionView,
            crate::dto::player::LeaderboardResponse,
            crate::dto::sse::SessionEvent,
            crate::state::flow::Phase,
            crate::state::leaderboard::RankedPlayer,
            crate::state::leaderboard::Movement,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent session snapshot streams"),
        (name = "host", description = "Host-only session lifecycle commands"),
        (name = "player", description = "Player join, answer, and standings operations"),
    )
)]
pub struct ApiDoc;
