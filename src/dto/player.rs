use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::common::QuestionPrompt,
    dto::validation::validate_nickname,
    state::flow::Phase,
    state::leaderboard::RankedPlayer,
};

/// Payload a player sends to join a session.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRequest {
    /// Desired nickname; must be unique within the session, compared
    /// case-sensitively.
    pub nickname: String,
    /// Opaque UI pass-through (avatar choice etc.); stored, never inspected.
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Validate for JoinRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_nickname(&self.nickname) {
            errors.add("nickname", err);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Confirmation returned on a successful join.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    /// Identifier the player uses for all further calls.
    pub player_id: Uuid,
    /// Accepted nickname.
    pub nickname: String,
    /// PIN of the joined session.
    pub pin: String,
}

/// Payload submitting an answer for the running question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    /// Identifier received at join time.
    pub player_id: Uuid,
    /// Chosen button index; `None` submits a blank (always-incorrect) answer.
    #[serde(default)]
    pub answer_index: Option<usize>,
}

/// Acknowledgement of an answer submission.
///
/// A duplicate submission acknowledges with `accepted: false` instead of
/// failing: from the player's perspective resubmitting is a no-op.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerAck {
    /// Whether this submission was recorded.
    pub accepted: bool,
    /// Question index the submission applied to.
    pub question_index: u32,
}

/// What a player client renders for the current phase.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerQuestionView {
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Answer buttons to render while a question runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionPrompt>,
}

/// Ranked leaderboard payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    /// Rows ordered best-first.
    pub entries: Vec<RankedPlayer>,
}
