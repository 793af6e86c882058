use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::flow::Phase,
    state::session::{Quiz, Session},
};

/// Phase-level snapshot of a session shared by host views and the SSE stream.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct SessionSummary {
    /// Game PIN players join with.
    pub pin: String,
    /// Quiz the session runs.
    pub quiz_id: Uuid,
    /// Quiz display title.
    pub quiz_title: String,
    /// Number of questions in the quiz.
    pub question_count: usize,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Current question index, absent before the first question.
    pub current_question_index: Option<usize>,
    /// Seconds allotted for the current question.
    pub question_duration: u32,
    /// Seconds left on the countdown.
    pub time_remaining: u32,
    /// Whether a countdown is running.
    pub is_active: bool,
    /// Whether the session is closed to new joins.
    pub locked: bool,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 last-update timestamp.
    pub updated_at: String,
}

impl From<(&Session, &Quiz)> for SessionSummary {
    fn from((session, quiz): (&Session, &Quiz)) -> Self {
        Self {
            pin: session.pin.clone(),
            quiz_id: session.quiz_id,
            quiz_title: quiz.title.clone(),
            question_count: quiz.questions.len(),
            phase: session.phase,
            current_question_index: session.current_question_index,
            question_duration: session.question_duration,
            time_remaining: session.time_remaining,
            is_active: session.is_active,
            locked: session.locked,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// Player-safe view of the running question: index-aligned answer buttons
/// only, never the question or option text.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct QuestionPrompt {
    /// Question index the buttons belong to.
    pub index: usize,
    /// Number of answer buttons to render.
    pub option_count: usize,
    /// Seconds allotted for this question.
    pub duration: u32,
    /// Seconds left on the countdown.
    pub time_remaining: u32,
}

impl QuestionPrompt {
    /// Build the prompt for the running question, if one is running.
    pub fn for_session(session: &Session, quiz: &Quiz) -> Option<Self> {
        if session.phase != Phase::Question {
            return None;
        }
        let index = session.current_question_index?;
        let question = quiz.questions.get(index)?;
        Some(Self {
            index,
            option_count: question.answers.len(),
            duration: session.question_duration,
            time_remaining: session.time_remaining,
        })
    }
}
