//! Business logic powering the host REST routes: phase-changing commands and
//! host-only projections. Every operation checks the caller against the
//! session's registered host before touching anything.

use uuid::Uuid;

use crate::{
    dto::{
        common::SessionSummary,
        host::{
            AnswerDistribution, HostQuestionView, HostSessionView, PlayerSummary,
            QuestionResultsResponse, StartQuestionRequest,
        },
    },
    error::ServiceError,
    state::{
        SharedState,
        coordinator::SessionCoordinator,
        flow::Phase,
        session::{PlayerSession, Session},
    },
};

/// Start (or restart) the question at `index`.
pub async fn start_question(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
    index: usize,
    request: StartQuestionRequest,
) -> Result<SessionSummary, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator
        .start_question(host_id, index, request.duration)
        .await?;
    Ok(summary(&coordinator, &session))
}

/// Close the running question and move to results.
pub async fn end_question(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator.end_question(host_id).await?;
    Ok(summary(&coordinator, &session))
}

/// Advance to the next question's lobby, or to the final scoreboard.
pub async fn next_question(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator.next_question(host_id).await?;
    Ok(summary(&coordinator, &session))
}

/// End the session early from whatever phase it is in.
pub async fn end_session(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator.end_session(host_id).await?;
    Ok(summary(&coordinator, &session))
}

/// Open or close the session to new joins.
pub async fn lock_session(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
    locked: bool,
) -> Result<SessionSummary, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator.set_locked(host_id, locked).await?;
    Ok(summary(&coordinator, &session))
}

/// Full host dashboard: session snapshot, roster, and the current question
/// with its text and correctness flags (the host screen is trusted).
pub async fn get_session(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
) -> Result<HostSessionView, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let mut session = coordinator.session().await?;
    authorize(&session, host_id)?;
    session.time_remaining = session.remaining_now();

    let store = state.require_session_store().await?;
    let players: Vec<PlayerSession> = store
        .list_players(pin)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let current_question = session.current_question_index.and_then(|index| {
        coordinator
            .quiz()
            .questions
            .get(index)
            .map(|question| HostQuestionView::from((index, question)))
    });

    Ok(HostSessionView {
        session: summary(&coordinator, &session),
        players: players.iter().map(PlayerSummary::from).collect(),
        current_question,
    })
}

/// Per-option answer distribution for a closed question.
pub async fn question_results(
    state: &SharedState,
    pin: &str,
    host_id: Uuid,
    index: usize,
) -> Result<QuestionResultsResponse, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator.session().await?;
    authorize(&session, host_id)?;

    let played = session
        .current_question_index
        .is_some_and(|current| index <= current);
    if !played {
        return Err(ServiceError::InvalidState(format!(
            "question {index} has not been played yet"
        )));
    }
    if session.phase == Phase::Question && session.current_question_index == Some(index) {
        return Err(ServiceError::InvalidState(
            "question is still running".into(),
        ));
    }

    let Some(question) = coordinator.quiz().questions.get(index) else {
        return Err(ServiceError::NotFound(format!(
            "question {index} is not part of the quiz"
        )));
    };

    let store = state.require_session_store().await?;
    let players: Vec<PlayerSession> = store
        .list_players(pin)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let question_index = index as u32;
    let mut counts = vec![0usize; question.answers.len()];
    let mut answered = 0usize;
    for player in &players {
        if let Some(record) = player.answers.get(&question_index) {
            answered += 1;
            if let Some(chosen) = record.answer_index {
                if let Some(slot) = counts.get_mut(chosen) {
                    *slot += 1;
                }
            }
        }
    }

    Ok(QuestionResultsResponse {
        question_index: index,
        text: question.text.clone(),
        distribution: question
            .answers
            .iter()
            .enumerate()
            .map(|(option_index, option)| AnswerDistribution {
                option_index,
                text: option.text.clone(),
                is_correct: option.is_correct,
                count: counts[option_index],
            })
            .collect(),
        answered,
        player_count: players.len(),
    })
}

fn summary(coordinator: &SessionCoordinator, session: &Session) -> SessionSummary {
    SessionSummary::from((session, coordinator.quiz()))
}

fn authorize(session: &Session, caller: Uuid) -> Result<(), ServiceError> {
    if session.host_id != caller {
        return Err(ServiceError::Unauthorized(
            "only the session host may do that".into(),
        ));
    }
    Ok(())
}
