//! Session bootstrap: quiz resolution, PIN allocation, and coordinator
//! registration.

use uuid::Uuid;

use crate::{
    dao::models::{AnswerOptionEntity, QuestionEntity, QuizEntity},
    dto::{
        common::SessionSummary,
        host::{CreateSessionRequest, QuizInput, QuizListItem, QuizSummary},
    },
    error::ServiceError,
    state::{
        SharedState,
        coordinator::SessionCoordinator,
        flow::Phase,
        session::{Quiz, Session, generate_pin},
    },
};

/// Open a new session: resolve the quiz, allocate a unique PIN, create the
/// session document, and register its coordinator.
pub async fn create_session(
    state: &SharedState,
    host_id: Uuid,
    request: CreateSessionRequest,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_session_store().await?;

    let quiz_entity = match (request.quiz, request.quiz_id) {
        (Some(input), None) => {
            let entity = build_quiz_entity(input);
            store.save_quiz(entity.clone()).await?;
            entity
        }
        (None, Some(id)) => store
            .find_quiz(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("quiz `{id}` not found")))?,
        _ => {
            return Err(ServiceError::InvalidInput(
                "provide either `quiz` or `quiz_id`".into(),
            ));
        }
    };

    if quiz_entity.questions.is_empty() {
        return Err(ServiceError::InvalidState(format!(
            "quiz `{}` has no questions",
            quiz_entity.id
        )));
    }

    let quiz: Quiz = quiz_entity.into();

    let mut session = None;
    for _ in 0..state.config().max_pin_attempts() {
        // The thread-local RNG must not live across an await point.
        let pin = {
            let mut rng = rand::rng();
            generate_pin(&mut rng)
        };
        if state.pin_in_use(&pin) {
            continue;
        }
        let candidate = Session::new(pin, quiz.id, host_id, request.locked);
        if store.create_session(candidate.clone().into()).await? {
            session = Some(candidate);
            break;
        }
    }
    let Some(session) = session else {
        return Err(ServiceError::InvalidState(
            "could not allocate a unique game PIN".into(),
        ));
    };

    let config = state.config();
    let coordinator = SessionCoordinator::new(
        session.pin.clone(),
        quiz.clone(),
        store,
        config.countdown_tick(),
        config.refractory(),
        config.snapshot_capacity(),
    );
    state.register_coordinator(coordinator);

    Ok(SessionSummary::from((&session, &quiz)))
}

/// Tear down a session: force-end it when still running, then cancel and
/// drop its coordinator. The session document stays behind, terminated.
pub async fn close_session(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
) -> Result<(), ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator.session().await?;
    if session.host_id != host_id {
        return Err(ServiceError::Unauthorized(
            "only the session host may do that".into(),
        ));
    }

    if session.phase != Phase::Final {
        coordinator.end_session(host_id).await?;
    }
    state.remove_coordinator(pin);
    Ok(())
}

/// Store a reusable quiz definition.
pub async fn create_quiz(
    state: &SharedState,
    input: QuizInput,
) -> Result<QuizSummary, ServiceError> {
    let store = state.require_session_store().await?;
    let entity = build_quiz_entity(input);
    let summary = QuizSummary {
        id: entity.id,
        title: entity.title.clone(),
        question_count: entity.questions.len(),
    };
    store.save_quiz(entity).await?;
    Ok(summary)
}

/// List the stored quizzes available for new sessions.
pub async fn list_quizzes(state: &SharedState) -> Result<Vec<QuizListItem>, ServiceError> {
    let store = state.require_session_store().await?;
    let entries = store.list_quizzes().await?;
    Ok(entries
        .into_iter()
        .map(|entry| QuizListItem {
            id: entry.id,
            title: entry.title,
            question_count: entry.question_count,
        })
        .collect())
}

fn build_quiz_entity(input: QuizInput) -> QuizEntity {
    QuizEntity {
        id: Uuid::new_v4(),
        title: input.title,
        questions: input
            .questions
            .into_iter()
            .map(|question| QuestionEntity {
                id: Uuid::new_v4(),
                text: question.text,
                answers: question
                    .answers
                    .into_iter()
                    .map(|option| AnswerOptionEntity {
                        text: option.text,
                        is_correct: option.is_correct,
                    })
                    .collect(),
                time_limit: question.time_limit,
                points: question.points,
            })
            .collect(),
    }
}
