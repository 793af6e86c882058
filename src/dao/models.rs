use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::flow::Phase;

/// Session document persisted by the storage layer, keyed by game PIN.
///
/// The session document is single-writer: only the host-side coordinator
/// (including its countdown task) ever updates it. Players read it through
/// snapshot subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// 6-digit numeric game PIN, unique among concurrently active sessions.
    pub pin: String,
    /// Identifier of the quiz this session runs.
    pub quiz_id: Uuid,
    /// Principal allowed to issue phase-changing commands.
    pub host_id: Uuid,
    /// Coarse lifecycle phase of the session.
    pub phase: Phase,
    /// 0-based index into the quiz question sequence; `None` before the first
    /// question. Monotonically non-decreasing within a game.
    pub current_question_index: Option<usize>,
    /// Server-assigned instant the running question started, cleared outside
    /// the question phase.
    pub question_start_time: Option<SystemTime>,
    /// Seconds allotted for the current question.
    pub question_duration: u32,
    /// Cached seconds left; authoritative value is recomputed from wall clock.
    pub time_remaining: u32,
    /// True only while a question countdown is running.
    pub is_active: bool,
    /// True when the host has closed the session to new joins.
    pub locked: bool,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the session document was updated.
    pub updated_at: SystemTime,
}

/// Per-player document persisted by the storage layer, keyed by
/// `(pin, player_id)`.
///
/// Single-writer: only that player's join/answer path mutates it, which is
/// what lets answer submission avoid cross-document transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSessionEntity {
    /// PIN of the session this record belongs to.
    pub pin: String,
    /// Stable identifier for the player.
    pub player_id: Uuid,
    /// Display name, case-sensitively unique within the session.
    pub nickname: String,
    /// Cumulative score; always the sum of recorded answer points.
    pub score: u32,
    /// Consecutive-correct counter, reset on any wrong or missed answer.
    pub streak: u32,
    /// One record per answered question, keyed by the stringified question
    /// index (string keys keep the map portable across document stores).
    pub answers: BTreeMap<String, AnswerRecordEntity>,
    /// Join instant; leaderboard tie-break key.
    pub joined_at: SystemTime,
    /// Opaque UI pass-through (avatar choice etc.); never inspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A single recorded answer inside a player document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecordEntity {
    /// Chosen option index; `None` models a blank submission.
    pub answer_index: Option<usize>,
    /// Whether the chosen option was correct.
    pub is_correct: bool,
    /// Points awarded for this answer.
    pub points: u32,
    /// Seconds left on the clock when the answer arrived.
    pub time_remaining_at_submit: f64,
    /// Submission instant.
    pub submitted_at: SystemTime,
}

/// Quiz document consumed read-only by sessions once they start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizEntity {
    /// Primary key of the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Ordered question sequence.
    pub questions: Vec<QuestionEntity>,
}

/// Question entry inside a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Prompt text; never sent to player clients before the reveal.
    pub text: String,
    /// Candidate options, index-aligned with the player buttons.
    pub answers: Vec<AnswerOptionEntity>,
    /// Seconds allotted to answer.
    pub time_limit: u32,
    /// Base point value.
    pub points: u32,
}

/// Candidate answer option for a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOptionEntity {
    /// Option text, revealed to players only after the question closes.
    pub text: String,
    /// Whether picking this option counts as correct.
    pub is_correct: bool,
}

/// Partial last-write-wins update for a session document.
///
/// Absent fields are left untouched by the store; the store stamps
/// `updated_at` itself on every applied patch.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New phase, when the update changes it.
    pub phase: Option<Phase>,
    /// New question index (never cleared; the index is monotonic).
    pub current_question_index: Option<usize>,
    /// Set (`Some(Some(t))`) or clear (`Some(None)`) the question start time.
    pub question_start_time: Option<Option<SystemTime>>,
    /// New allotted duration in seconds.
    pub question_duration: Option<u32>,
    /// New cached countdown value in seconds.
    pub time_remaining: Option<u32>,
    /// New countdown-running flag.
    pub is_active: Option<bool>,
    /// New join-gate flag.
    pub locked: Option<bool>,
}

impl SessionPatch {
    /// Patch written when a question starts (or restarts).
    pub fn question_started(index: usize, started_at: SystemTime, duration: u32) -> Self {
        Self {
            phase: Some(Phase::Question),
            current_question_index: Some(index),
            question_start_time: Some(Some(started_at)),
            question_duration: Some(duration),
            time_remaining: Some(duration),
            is_active: Some(true),
            ..Self::default()
        }
    }

    /// Patch written by the countdown on every tick.
    pub fn countdown_tick(time_remaining: u32) -> Self {
        Self {
            time_remaining: Some(time_remaining),
            ..Self::default()
        }
    }

    /// Patch written when a question closes and results are shown.
    pub fn results() -> Self {
        Self {
            phase: Some(Phase::Results),
            question_start_time: Some(None),
            time_remaining: Some(0),
            is_active: Some(false),
            ..Self::default()
        }
    }

    /// Patch arming the next question while returning to the lobby.
    pub fn advanced(next_index: usize) -> Self {
        Self {
            phase: Some(Phase::Waiting),
            current_question_index: Some(next_index),
            question_start_time: Some(None),
            time_remaining: Some(0),
            is_active: Some(false),
            ..Self::default()
        }
    }

    /// Patch terminating the session.
    pub fn finalized() -> Self {
        Self {
            phase: Some(Phase::Final),
            question_start_time: Some(None),
            time_remaining: Some(0),
            is_active: Some(false),
            ..Self::default()
        }
    }

    /// Patch toggling the join gate.
    pub fn lock(locked: bool) -> Self {
        Self {
            locked: Some(locked),
            ..Self::default()
        }
    }

    /// Apply this patch to an entity in place, mirroring the store semantics.
    pub fn apply_to(&self, entity: &mut SessionEntity) {
        if let Some(phase) = self.phase {
            entity.phase = phase;
        }
        if let Some(index) = self.current_question_index {
            entity.current_question_index = Some(index);
        }
        if let Some(start) = self.question_start_time {
            entity.question_start_time = start;
        }
        if let Some(duration) = self.question_duration {
            entity.question_duration = duration;
        }
        if let Some(remaining) = self.time_remaining {
            entity.time_remaining = remaining;
        }
        if let Some(active) = self.is_active {
            entity.is_active = active;
        }
        if let Some(locked) = self.locked {
            entity.locked = locked;
        }
    }
}

/// Single-document answer write applied to a player record.
///
/// Carries a score *increment* rather than an absolute total so the update
/// stays correct however stale the snapshot that produced it was.
#[derive(Debug, Clone)]
pub struct AnswerWrite {
    /// Question index the record is filed under.
    pub question_index: u32,
    /// The answer record itself.
    pub record: AnswerRecordEntity,
    /// Points to add to the cumulative score.
    pub points_delta: u32,
    /// New streak value after this answer.
    pub streak: u32,
}

/// Quiz list projection (subset of [`QuizEntity`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizListItemEntity {
    /// Primary key of the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Number of questions in the quiz.
    pub question_count: usize,
}

impl From<&QuizEntity> for QuizListItemEntity {
    fn from(value: &QuizEntity) -> Self {
        Self {
            id: value.id,
            title: value.title.clone(),
            question_count: value.questions.len(),
        }
    }
}
