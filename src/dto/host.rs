use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{common::SessionSummary, format_system_time},
    state::session::{PlayerSession, Question},
};

/// Bounds on the option list accepted per question.
const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 4;

/// Payload used to open a brand-new session.
///
/// The quiz comes either inline (persisted as a side effect) or as a
/// reference to a stored quiz; exactly one of the two must be present.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    /// Inline quiz definition.
    #[serde(default)]
    pub quiz: Option<QuizInput>,
    /// Reference to a stored quiz.
    #[serde(default)]
    pub quiz_id: Option<Uuid>,
    /// Start with the join gate closed.
    #[serde(default)]
    pub locked: bool,
}

impl Validate for CreateSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match (&self.quiz, &self.quiz_id) {
            (None, None) | (Some(_), Some(_)) => {
                let mut err = ValidationError::new("quiz_source");
                err.message = Some("provide either `quiz` or `quiz_id`, not both".into());
                errors.add("quiz", err);
            }
            _ => {}
        }

        if let Some(ref quiz) = self.quiz {
            if let Err(quiz_errors) = quiz.validate() {
                errors.merge_self("quiz", Err(quiz_errors));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Inline quiz definition supplied when opening a session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct QuizInput {
    /// Display title.
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    /// Ordered question sequence.
    #[validate(length(min = 1, max = 200), nested)]
    pub questions: Vec<QuestionInput>,
}

/// Question details required to populate a quiz.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct QuestionInput {
    /// Prompt text.
    pub text: String,
    /// Candidate options, index-aligned with the player buttons.
    pub answers: Vec<AnswerOptionInput>,
    /// Seconds allotted to answer.
    pub time_limit: u32,
    /// Base point value.
    pub points: u32,
}

impl Validate for QuestionInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.text.trim().is_empty() {
            let mut err = ValidationError::new("question_text");
            err.message = Some("question text must not be blank".into());
            errors.add("text", err);
        }

        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&self.answers.len()) {
            let mut err = ValidationError::new("option_count");
            err.message = Some(
                format!("a question needs between {MIN_OPTIONS} and {MAX_OPTIONS} options").into(),
            );
            errors.add("answers", err);
        }

        if !self.answers.iter().any(|option| option.is_correct) {
            let mut err = ValidationError::new("no_correct_option");
            err.message = Some("at least one option must be marked correct".into());
            errors.add("answers", err);
        }

        if self.time_limit == 0 {
            let mut err = ValidationError::new("time_limit");
            err.message = Some("time limit must be strictly positive".into());
            errors.add("time_limit", err);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Candidate answer option of a question.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AnswerOptionInput {
    /// Option text.
    pub text: String,
    /// Whether picking this option counts as correct.
    pub is_correct: bool,
}

/// Payload starting (or restarting) a question.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct StartQuestionRequest {
    /// Countdown override in seconds; the question's configured time limit is
    /// used when omitted.
    #[serde(default)]
    #[validate(range(min = 1, max = 600))]
    pub duration: Option<u32>,
}

/// Payload toggling the join gate.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LockSessionRequest {
    /// True closes the session to new joins.
    pub locked: bool,
}

/// Generic acknowledgement for host commands without richer payloads.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Human-readable confirmation.
    pub message: String,
}

/// Host-side roster entry.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PlayerSummary {
    /// Stable identifier of the player.
    pub player_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Cumulative score.
    pub score: u32,
    /// Consecutive-correct streak.
    pub streak: u32,
    /// Number of questions answered so far.
    pub answered: usize,
    /// RFC3339 join timestamp.
    pub joined_at: String,
}

impl From<&PlayerSession> for PlayerSummary {
    fn from(player: &PlayerSession) -> Self {
        Self {
            player_id: player.player_id,
            nickname: player.nickname.clone(),
            score: player.score,
            streak: player.streak,
            answered: player.answers.len(),
            joined_at: format_system_time(player.joined_at),
        }
    }
}

/// Full question view for the host screen, including the text players never
/// receive directly.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct HostQuestionView {
    /// Question index.
    pub index: usize,
    /// Prompt text.
    pub text: String,
    /// Candidate options with their correctness flags.
    pub options: Vec<HostAnswerOption>,
    /// Configured time limit in seconds.
    pub time_limit: u32,
    /// Base point value.
    pub points: u32,
}

/// One option of a [`HostQuestionView`].
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct HostAnswerOption {
    /// Option text.
    pub text: String,
    /// Whether this option is correct.
    pub is_correct: bool,
}

impl From<(usize, &Question)> for HostQuestionView {
    fn from((index, question): (usize, &Question)) -> Self {
        Self {
            index,
            text: question.text.clone(),
            options: question
                .answers
                .iter()
                .map(|option| HostAnswerOption {
                    text: option.text.clone(),
                    is_correct: option.is_correct,
                })
                .collect(),
            time_limit: question.time_limit,
            points: question.points,
        }
    }
}

/// Host dashboard view of a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct HostSessionView {
    /// Session snapshot.
    pub session: SessionSummary,
    /// Joined players in arrival order.
    pub players: Vec<PlayerSummary>,
    /// The currently relevant question (running or just closed), if any.
    pub current_question: Option<HostQuestionView>,
}

/// Per-option answer counts for a closed question.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerDistribution {
    /// Option index the count belongs to.
    pub option_index: usize,
    /// Option text.
    pub text: String,
    /// Whether this option was correct.
    pub is_correct: bool,
    /// How many players picked it.
    pub count: usize,
}

/// Answer distribution of one question, shown on the host screen between
/// questions.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionResultsResponse {
    /// Question index.
    pub question_index: usize,
    /// Prompt text.
    pub text: String,
    /// Per-option counts.
    pub distribution: Vec<AnswerDistribution>,
    /// Players who submitted an answer for this question.
    pub answered: usize,
    /// Players in the session.
    pub player_count: usize,
}

/// Summary returned when a quiz has been stored.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizSummary {
    /// Stable identifier of the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Number of questions.
    pub question_count: usize,
}

/// One entry of the stored-quiz listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizListItem {
    /// Stable identifier of the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Number of questions.
    pub question_count: usize,
}
