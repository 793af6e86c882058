use std::collections::BTreeMap;
use std::time::SystemTime;

use rand::Rng;
use uuid::Uuid;

use crate::dao::models::{
    AnswerOptionEntity, AnswerRecordEntity, PlayerSessionEntity, QuestionEntity, QuizEntity,
    SessionEntity,
};
use crate::state::flow::{FlowView, Phase};

/// Number of digits in a game PIN.
pub const PIN_LENGTH: usize = 6;

/// Runtime representation of a quiz consumed by a session.
///
/// Immutable once the session starts; the coordinator holds its own copy and
/// never re-reads it from storage mid-game.
#[derive(Debug, Clone)]
pub struct Quiz {
    /// Stable identifier of the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Ordered question sequence.
    pub questions: Vec<Question>,
}

/// One question of a quiz.
#[derive(Debug, Clone)]
pub struct Question {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Prompt text; withheld from players until the reveal.
    pub text: String,
    /// Candidate options, index-aligned with the player buttons.
    pub answers: Vec<AnswerOption>,
    /// Seconds allotted to answer.
    pub time_limit: u32,
    /// Base point value.
    pub points: u32,
}

/// Candidate answer option of a question.
#[derive(Debug, Clone)]
pub struct AnswerOption {
    /// Option text.
    pub text: String,
    /// Whether picking this option counts as correct.
    pub is_correct: bool,
}

/// Runtime view of a session document.
#[derive(Debug, Clone)]
pub struct Session {
    /// Game PIN.
    pub pin: String,
    /// Quiz the session runs.
    pub quiz_id: Uuid,
    /// Controlling host principal.
    pub host_id: Uuid,
    /// Coarse lifecycle phase.
    pub phase: Phase,
    /// Current question index, `None` before the first question.
    pub current_question_index: Option<usize>,
    /// Instant the running question started.
    pub question_start_time: Option<SystemTime>,
    /// Seconds allotted for the current question.
    pub question_duration: u32,
    /// Seconds left; recomputed from wall clock during reconciliation.
    pub time_remaining: u32,
    /// Whether a countdown is running.
    pub is_active: bool,
    /// Whether the host has closed the session to new joins.
    pub locked: bool,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last update timestamp.
    pub updated_at: SystemTime,
}

impl Session {
    /// Build the lobby-state session a freshly created game starts in.
    pub fn new(pin: String, quiz_id: Uuid, host_id: Uuid, locked: bool) -> Self {
        let now = SystemTime::now();
        Self {
            pin,
            quiz_id,
            host_id,
            phase: Phase::Waiting,
            current_question_index: None,
            question_start_time: None,
            question_duration: 0,
            time_remaining: 0,
            is_active: false,
            locked,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute the authoritative seconds left from wall clock.
    ///
    /// The cached `time_remaining` is never trusted over elapsed real time:
    /// a stale snapshot must not resurrect a countdown that has already run
    /// out.
    pub fn remaining_now(&self) -> u32 {
        if self.phase != Phase::Question {
            return 0;
        }
        let Some(started_at) = self.question_start_time else {
            return 0;
        };
        let elapsed = SystemTime::now()
            .duration_since(started_at)
            .unwrap_or_default()
            .as_secs_f64();
        let remaining = f64::from(self.question_duration) - elapsed;
        remaining.max(0.0).ceil() as u32
    }

    /// Project the slice of this session the flow machine evaluates.
    pub fn flow_view(&self, total_questions: usize) -> FlowView {
        FlowView {
            phase: self.phase,
            current_question_index: self.current_question_index,
            has_start_time: self.question_start_time.is_some(),
            time_remaining: self.time_remaining,
            is_active: self.is_active,
            total_questions,
        }
    }
}

/// Runtime view of a player record.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// PIN of the session this record belongs to.
    pub pin: String,
    /// Stable identifier of the player.
    pub player_id: Uuid,
    /// Display name, unique within the session.
    pub nickname: String,
    /// Cumulative score.
    pub score: u32,
    /// Consecutive-correct counter.
    pub streak: u32,
    /// Recorded answers keyed by question index.
    pub answers: BTreeMap<u32, AnswerRecord>,
    /// Join instant; leaderboard tie-break key.
    pub joined_at: SystemTime,
    /// Opaque UI pass-through, never inspected.
    pub avatar: Option<String>,
}

impl PlayerSession {
    /// Build the zero-score record created when a player joins.
    pub fn new(pin: String, nickname: String, avatar: Option<String>) -> Self {
        Self {
            pin,
            player_id: Uuid::new_v4(),
            nickname,
            score: 0,
            streak: 0,
            answers: BTreeMap::new(),
            joined_at: SystemTime::now(),
            avatar,
        }
    }
}

/// One recorded answer of a player.
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    /// Chosen option index; `None` models a blank submission.
    pub answer_index: Option<usize>,
    /// Whether the chosen option was correct.
    pub is_correct: bool,
    /// Points awarded.
    pub points: u32,
    /// Seconds left on the clock when the answer arrived.
    pub time_remaining_at_submit: f64,
    /// Submission instant.
    pub submitted_at: SystemTime,
}

/// Draw a random 6-digit PIN. Uniqueness among active sessions is the
/// caller's job (retry on collision against the store).
pub fn generate_pin(rng: &mut impl Rng) -> String {
    (0..PIN_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10)))
        .collect()
}

impl From<SessionEntity> for Session {
    fn from(value: SessionEntity) -> Self {
        Self {
            pin: value.pin,
            quiz_id: value.quiz_id,
            host_id: value.host_id,
            phase: value.phase,
            current_question_index: value.current_question_index,
            question_start_time: value.question_start_time,
            question_duration: value.question_duration,
            time_remaining: value.time_remaining,
            is_active: value.is_active,
            locked: value.locked,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<Session> for SessionEntity {
    fn from(value: Session) -> Self {
        Self {
            pin: value.pin,
            quiz_id: value.quiz_id,
            host_id: value.host_id,
            phase: value.phase,
            current_question_index: value.current_question_index,
            question_start_time: value.question_start_time,
            question_duration: value.question_duration,
            time_remaining: value.time_remaining,
            is_active: value.is_active,
            locked: value.locked,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<AnswerRecordEntity> for AnswerRecord {
    fn from(value: AnswerRecordEntity) -> Self {
        Self {
            answer_index: value.answer_index,
            is_correct: value.is_correct,
            points: value.points,
            time_remaining_at_submit: value.time_remaining_at_submit,
            submitted_at: value.submitted_at,
        }
    }
}

impl From<AnswerRecord> for AnswerRecordEntity {
    fn from(value: AnswerRecord) -> Self {
        Self {
            answer_index: value.answer_index,
            is_correct: value.is_correct,
            points: value.points,
            time_remaining_at_submit: value.time_remaining_at_submit,
            submitted_at: value.submitted_at,
        }
    }
}

impl From<PlayerSessionEntity> for PlayerSession {
    fn from(value: PlayerSessionEntity) -> Self {
        Self {
            pin: value.pin,
            player_id: value.player_id,
            nickname: value.nickname,
            score: value.score,
            streak: value.streak,
            // Keys that fail to parse came from a corrupt writer; drop them
            // rather than refuse the whole record.
            answers: value
                .answers
                .into_iter()
                .filter_map(|(index, record)| {
                    index.parse().ok().map(|index: u32| (index, record.into()))
                })
                .collect(),
            joined_at: value.joined_at,
            avatar: value.avatar,
        }
    }
}

impl From<PlayerSession> for PlayerSessionEntity {
    fn from(value: PlayerSession) -> Self {
        Self {
            pin: value.pin,
            player_id: value.player_id,
            nickname: value.nickname,
            score: value.score,
            streak: value.streak,
            answers: value
                .answers
                .into_iter()
                .map(|(index, record)| (index.to_string(), record.into()))
                .collect(),
            joined_at: value.joined_at,
            avatar: value.avatar,
        }
    }
}

impl From<AnswerOptionEntity> for AnswerOption {
    fn from(value: AnswerOptionEntity) -> Self {
        Self {
            text: value.text,
            is_correct: value.is_correct,
        }
    }
}

impl From<AnswerOption> for AnswerOptionEntity {
    fn from(value: AnswerOption) -> Self {
        Self {
            text: value.text,
            is_correct: value.is_correct,
        }
    }
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            text: value.text,
            answers: value.answers.into_iter().map(Into::into).collect(),
            time_limit: value.time_limit,
            points: value.points,
        }
    }
}

impl From<Question> for QuestionEntity {
    fn from(value: Question) -> Self {
        Self {
            id: value.id,
            text: value.text,
            answers: value.answers.into_iter().map(Into::into).collect(),
            time_limit: value.time_limit,
            points: value.points,
        }
    }
}

impl From<QuizEntity> for Quiz {
    fn from(value: QuizEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            questions: value.questions.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Quiz> for QuizEntity {
    fn from(value: Quiz) -> Self {
        Self {
            id: value.id,
            title: value.title,
            questions: value.questions.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn generated_pins_are_six_digits() {
        let mut rng = rand::rng();
        for _ in 0..64 {
            let pin = generate_pin(&mut rng);
            assert_eq!(pin.len(), PIN_LENGTH);
            assert!(pin.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn remaining_now_ignores_the_cached_value() {
        let mut session = Session::new("123456".into(), Uuid::new_v4(), Uuid::new_v4(), false);
        session.phase = Phase::Question;
        session.question_duration = 30;
        session.time_remaining = 30; // stale cache
        session.question_start_time = Some(SystemTime::now() - Duration::from_secs(40));
        session.is_active = true;

        assert_eq!(session.remaining_now(), 0);
    }

    #[test]
    fn remaining_now_counts_down_from_wall_clock() {
        let mut session = Session::new("123456".into(), Uuid::new_v4(), Uuid::new_v4(), false);
        session.phase = Phase::Question;
        session.question_duration = 30;
        session.time_remaining = 0; // stale cache in the other direction
        session.question_start_time = Some(SystemTime::now() - Duration::from_secs(10));
        session.is_active = true;

        let remaining = session.remaining_now();
        assert!((19..=21).contains(&remaining), "got {remaining}");
    }

    #[test]
    fn remaining_now_is_zero_outside_question_phase() {
        let mut session = Session::new("123456".into(), Uuid::new_v4(), Uuid::new_v4(), false);
        session.time_remaining = 25;
        assert_eq!(session.remaining_now(), 0);
    }

    #[test]
    fn session_round_trips_through_its_entity() {
        let mut session = Session::new("654321".into(), Uuid::new_v4(), Uuid::new_v4(), true);
        session.phase = Phase::Results;
        session.current_question_index = Some(2);

        let entity: SessionEntity = session.clone().into();
        let back: Session = entity.into();

        assert_eq!(back.pin, session.pin);
        assert_eq!(back.phase, session.phase);
        assert_eq!(back.current_question_index, session.current_question_index);
        assert_eq!(back.host_id, session.host_id);
    }
}
