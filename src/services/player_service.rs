//! Business logic powering the player REST routes: joining, answering, and
//! the read-only projections player clients poll between SSE updates.

use tracing::info;

use crate::{
    dto::{
        common::QuestionPrompt,
        player::{
            AnswerAck, JoinRequest, JoinResponse, LeaderboardResponse, PlayerQuestionView,
            SubmitAnswerRequest,
        },
    },
    error::ServiceError,
    state::{
        SharedState, leaderboard,
        flow::Phase,
        session::{PlayerSession, Session},
    },
};

/// Join a session while it sits in the lobby.
///
/// Nickname uniqueness is case-sensitive and ultimately enforced by the
/// store, so two players racing for the same name cannot both win.
pub async fn join(
    state: &SharedState,
    pin: &str,
    request: JoinRequest,
) -> Result<JoinResponse, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session = coordinator.session().await?;

    if session.phase != Phase::Waiting {
        return Err(ServiceError::InvalidState(
            "players can only join while the session is in the lobby".into(),
        ));
    }
    if session.locked {
        return Err(ServiceError::InvalidState(
            "the host has locked this session".into(),
        ));
    }

    let nickname = request.nickname;
    if nickname.chars().count() > state.config().nickname_max_chars() {
        return Err(ServiceError::InvalidInput(format!(
            "nickname must be at most {} characters",
            state.config().nickname_max_chars()
        )));
    }

    let store = state.require_session_store().await?;
    let player = PlayerSession::new(pin.to_owned(), nickname.clone(), request.avatar);
    let player_id = player.player_id;

    let created = store.create_player(player.into()).await?;
    if !created {
        return Err(ServiceError::InvalidInput(format!(
            "nickname `{nickname}` is already taken in this session"
        )));
    }

    info!(pin = %pin, player = %player_id, nickname = %nickname, "player joined");
    Ok(JoinResponse {
        player_id,
        nickname,
        pin: pin.to_owned(),
    })
}

/// Submit an answer for the running question.
///
/// A duplicate submission is acknowledged as a no-op instead of failing; any
/// other rejection propagates so the client can roll back its optimistic
/// "answered" state.
pub async fn submit_answer(
    state: &SharedState,
    pin: &str,
    request: SubmitAnswerRequest,
) -> Result<AnswerAck, ServiceError> {
    let coordinator = state.coordinator(pin)?;

    match coordinator
        .submit_answer(request.player_id, request.answer_index)
        .await
    {
        Ok(question_index) => Ok(AnswerAck {
            accepted: true,
            question_index,
        }),
        Err(ServiceError::DuplicateAnswer(_)) => {
            let session = coordinator.session().await?;
            let question_index = session.current_question_index.unwrap_or_default() as u32;
            Ok(AnswerAck {
                accepted: false,
                question_index,
            })
        }
        Err(err) => Err(err),
    }
}

/// The player-safe view of the current phase: answer buttons during a
/// question, bare phase otherwise.
pub async fn current_question(
    state: &SharedState,
    pin: &str,
) -> Result<PlayerQuestionView, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let mut session = coordinator.session().await?;
    session.time_remaining = session.remaining_now();

    Ok(PlayerQuestionView {
        phase: session.phase,
        question: QuestionPrompt::for_session(&session, coordinator.quiz()),
    })
}

/// Current standings, ranked by score with join-order tie-breaks.
pub async fn leaderboard(
    state: &SharedState,
    pin: &str,
) -> Result<LeaderboardResponse, ServiceError> {
    let players = players_of(state, pin).await?;
    Ok(LeaderboardResponse {
        entries: leaderboard::rank(&players),
    })
}

/// Reveal-style standings with position-change indicators for the question
/// that just closed. Only meaningful once results are showing.
pub async fn leaderboard_reveal(
    state: &SharedState,
    pin: &str,
) -> Result<LeaderboardResponse, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let session: Session = coordinator.session().await?;

    if !matches!(session.phase, Phase::Results | Phase::Final) {
        return Err(ServiceError::InvalidState(
            "the reveal is only available once a question has closed".into(),
        ));
    }
    let Some(index) = session.current_question_index else {
        return Err(ServiceError::InvalidState(
            "no question has been played yet".into(),
        ));
    };

    let players = players_of(state, pin).await?;
    Ok(LeaderboardResponse {
        entries: leaderboard::rank_reveal(&players, index as u32),
    })
}

async fn players_of(state: &SharedState, pin: &str) -> Result<Vec<PlayerSession>, ServiceError> {
    // The coordinator lookup doubles as the session existence check.
    state.coordinator(pin)?;
    let store = state.require_session_store().await?;
    Ok(store
        .list_players(pin)
        .await?
        .into_iter()
        .map(Into::into)
        .collect())
}
