use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::common::QuestionPrompt,
    state::flow::Phase,
    state::leaderboard::RankedPlayer,
};

/// Dispatched payload carried across the SSE stream.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    /// Optional SSE event name.
    pub event: Option<String>,
    /// Serialized event data.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Snapshot broadcast to session subscribers on every observed change.
///
/// Player-safe: question and option text never ride this stream; the
/// leaderboard appears only once the phase reveals it anyway.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionEvent {
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Current question index, absent before the first question.
    pub question_index: Option<usize>,
    /// Seconds left on the countdown (reconciled against wall clock).
    pub time_remaining: u32,
    /// Whether a countdown is running.
    pub is_active: bool,
    /// Whether the session is closed to new joins.
    pub locked: bool,
    /// Players currently joined.
    pub player_count: usize,
    /// Answer buttons to render during the question phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionPrompt>,
    /// Ranked standings during the results and final phases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<RankedPlayer>>,
}
