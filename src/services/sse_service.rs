//! SSE plumbing: merges a coordinator's reconciled snapshot stream with the
//! session's roster stream into one `text/event-stream` response.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
    dto::{
        common::QuestionPrompt,
        sse::{ServerEvent, SessionEvent},
    },
    error::ServiceError,
    state::{
        SharedState,
        coordinator::SessionCoordinator,
        flow::Phase,
        leaderboard,
        session::{PlayerSession, Session},
    },
};

const EVENT_SESSION: &str = "session";

/// Open the per-session snapshot stream for one client.
///
/// Session snapshots come from the coordinator's reconciled pump; roster
/// changes come from the store's player-set subscription. Both delivery paths
/// are at-least-once, so every emitted event is rebuilt from the latest full
/// state rather than diffed.
pub async fn session_events(
    state: &SharedState,
    pin: &str,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let coordinator = state.coordinator(pin)?;
    let store = state.require_session_store().await?;

    let mut session_rx = coordinator.subscribe().await?;
    let mut roster_stream = store.watch_players(pin).await?;

    // Small bounded channel between the forwarder task and the response.
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut latest_session: Option<Session> = None;
        let mut roster: Vec<PlayerSession> = Vec::new();
        let mut roster_done = false;

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = session_rx.recv() => {
                    match recv_result {
                        Ok(snapshot) => {
                            latest_session = Some(snapshot);
                        }
                        Err(RecvError::Closed) => break,
                        // Skip lagged snapshots; the next one is
                        // authoritative anyway.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
                maybe_roster = roster_stream.next(), if !roster_done => {
                    match maybe_roster {
                        Some(players) => {
                            roster = players.into_iter().map(Into::into).collect();
                            if latest_session.is_none() {
                                continue;
                            }
                        }
                        None => {
                            roster_done = true;
                            continue;
                        }
                    }
                }
            }

            let Some(session) = latest_session.clone() else {
                continue;
            };
            let payload = build_session_event(&coordinator, session, &roster);
            let event = match ServerEvent::json(Some(EVENT_SESSION.to_string()), &payload) {
                Ok(server_event) => {
                    let mut event = Event::default().data(server_event.data);
                    if let Some(name) = server_event.event {
                        event = event.event(name);
                    }
                    event
                }
                Err(err) => {
                    warn!(error = %err, "failed to serialize SSE payload");
                    continue;
                }
            };

            if tx.send(Ok(event)).await.is_err() {
                break;
            }
        }
        debug!("session SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Assemble the player-safe event payload for the latest known state.
fn build_session_event(
    coordinator: &SessionCoordinator,
    session: Session,
    roster: &[PlayerSession],
) -> SessionEvent {
    let question = QuestionPrompt::for_session(&session, coordinator.quiz());

    let leaderboard = match (session.phase, session.current_question_index) {
        (Phase::Results, Some(index)) => Some(leaderboard::rank_reveal(roster, index as u32)),
        (Phase::Results, None) | (Phase::Final, _) => Some(leaderboard::rank(roster)),
        _ => None,
    };

    SessionEvent {
        phase: session.phase,
        question_index: session.current_question_index,
        time_remaining: session.time_remaining,
        is_active: session.is_active,
        locked: session.locked,
        player_count: roster.len(),
        question,
        leaderboard,
    }
}
