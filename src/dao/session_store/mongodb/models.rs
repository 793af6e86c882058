use std::collections::BTreeMap;

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    AnswerRecordEntity, PlayerSessionEntity, QuestionEntity, QuizEntity, SessionEntity,
};
use crate::dao::storage::StorageError;
use crate::state::flow::Phase;

/// Session document as stored in the `sessions` collection, keyed by PIN.
///
/// Identifier fields are stored as hyphenated UUID strings so query filters
/// and serde agree on the representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub(super) pin: String,
    pub(super) quiz_id: String,
    pub(super) host_id: String,
    pub(super) phase: Phase,
    pub(super) current_question_index: Option<i64>,
    pub(super) question_start_time: Option<DateTime>,
    pub(super) question_duration: i64,
    pub(super) time_remaining: i64,
    pub(super) is_active: bool,
    pub(super) locked: bool,
    pub(super) created_at: DateTime,
    pub(super) updated_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            pin: value.pin,
            quiz_id: value.quiz_id.to_string(),
            host_id: value.host_id.to_string(),
            phase: value.phase,
            current_question_index: value.current_question_index.map(|index| index as i64),
            question_start_time: value.question_start_time.map(DateTime::from_system_time),
            question_duration: i64::from(value.question_duration),
            time_remaining: i64::from(value.time_remaining),
            is_active: value.is_active,
            locked: value.locked,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = StorageError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            quiz_id: parse_uuid(&value.quiz_id, "session.quiz_id")?,
            host_id: parse_uuid(&value.host_id, "session.host_id")?,
            pin: value.pin,
            phase: value.phase,
            current_question_index: value.current_question_index.map(|index| index as usize),
            question_start_time: value.question_start_time.map(DateTime::to_system_time),
            question_duration: value.question_duration as u32,
            time_remaining: value.time_remaining as u32,
            is_active: value.is_active,
            locked: value.locked,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

/// Player record as stored in the `players` collection, keyed by
/// `(pin, player_id)` through a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    pub(super) pin: String,
    pub(super) player_id: String,
    pub(super) nickname: String,
    pub(super) score: i64,
    pub(super) streak: i64,
    pub(super) answers: BTreeMap<String, MongoAnswerDocument>,
    pub(super) joined_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) avatar: Option<String>,
}

/// One recorded answer inside a player document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    pub(super) answer_index: Option<i64>,
    pub(super) is_correct: bool,
    pub(super) points: i64,
    pub(super) time_remaining_at_submit: f64,
    pub(super) submitted_at: DateTime,
}

impl From<PlayerSessionEntity> for MongoPlayerDocument {
    fn from(value: PlayerSessionEntity) -> Self {
        Self {
            pin: value.pin,
            player_id: value.player_id.to_string(),
            nickname: value.nickname,
            score: i64::from(value.score),
            streak: i64::from(value.streak),
            answers: value
                .answers
                .into_iter()
                .map(|(index, record)| (index, record.into()))
                .collect(),
            joined_at: DateTime::from_system_time(value.joined_at),
            avatar: value.avatar,
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerSessionEntity {
    type Error = StorageError;

    fn try_from(value: MongoPlayerDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            player_id: parse_uuid(&value.player_id, "player.player_id")?,
            pin: value.pin,
            nickname: value.nickname,
            score: value.score as u32,
            streak: value.streak as u32,
            answers: value
                .answers
                .into_iter()
                .map(|(index, record)| (index, record.into()))
                .collect(),
            joined_at: value.joined_at.to_system_time(),
            avatar: value.avatar,
        })
    }
}

impl From<AnswerRecordEntity> for MongoAnswerDocument {
    fn from(value: AnswerRecordEntity) -> Self {
        Self {
            answer_index: value.answer_index.map(|index| index as i64),
            is_correct: value.is_correct,
            points: i64::from(value.points),
            time_remaining_at_submit: value.time_remaining_at_submit,
            submitted_at: DateTime::from_system_time(value.submitted_at),
        }
    }
}

impl From<MongoAnswerDocument> for AnswerRecordEntity {
    fn from(value: MongoAnswerDocument) -> Self {
        Self {
            answer_index: value.answer_index.map(|index| index as usize),
            is_correct: value.is_correct,
            points: value.points as u32,
            time_remaining_at_submit: value.time_remaining_at_submit,
            submitted_at: value.submitted_at.to_system_time(),
        }
    }
}

/// Quiz document as stored in the `quizzes` collection.
///
/// Questions round-trip through their entity serde form directly; only the
/// `_id` needs the explicit string representation for querying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    pub(super) id: String,
    pub(super) title: String,
    pub(super) questions: Vec<QuestionEntity>,
}

impl From<QuizEntity> for MongoQuizDocument {
    fn from(value: QuizEntity) -> Self {
        Self {
            id: value.id.to_string(),
            title: value.title,
            questions: value.questions,
        }
    }
}

impl TryFrom<MongoQuizDocument> for QuizEntity {
    type Error = StorageError;

    fn try_from(value: MongoQuizDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id, "quiz._id")?,
            title: value.title,
            questions: value.questions,
        })
    }
}

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw)
        .map_err(|err| StorageError::corrupted(format!("{field} `{raw}` is not a UUID: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::models::AnswerRecordEntity;

    #[test]
    fn session_entity_round_trips_through_its_document() {
        let now = SystemTime::now();
        let entity = SessionEntity {
            pin: "424242".into(),
            quiz_id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            phase: Phase::Results,
            current_question_index: Some(3),
            question_start_time: None,
            question_duration: 20,
            time_remaining: 0,
            is_active: false,
            locked: true,
            created_at: now,
            updated_at: now,
        };

        let document = MongoSessionDocument::from(entity.clone());
        let back: SessionEntity = document.try_into().unwrap();

        assert_eq!(back.pin, entity.pin);
        assert_eq!(back.phase, entity.phase);
        assert_eq!(back.current_question_index, entity.current_question_index);
        assert_eq!(back.host_id, entity.host_id);
        assert_eq!(back.quiz_id, entity.quiz_id);
        assert_eq!(back.locked, entity.locked);
    }

    #[test]
    fn player_entity_round_trips_through_its_document() {
        let mut answers = BTreeMap::new();
        answers.insert(
            "0".to_owned(),
            AnswerRecordEntity {
                answer_index: Some(2),
                is_correct: true,
                points: 750,
                time_remaining_at_submit: 15.0,
                submitted_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            },
        );
        let entity = PlayerSessionEntity {
            pin: "424242".into(),
            player_id: Uuid::new_v4(),
            nickname: "Ada".into(),
            score: 750,
            streak: 1,
            answers,
            joined_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            avatar: Some("fox".into()),
        };

        let document = MongoPlayerDocument::from(entity.clone());
        let back: PlayerSessionEntity = document.try_into().unwrap();

        assert_eq!(back.player_id, entity.player_id);
        assert_eq!(back.score, entity.score);
        assert_eq!(back.answers["0"].points, 750);
        assert_eq!(back.answers["0"].answer_index, Some(2));
        assert_eq!(back.avatar, entity.avatar);
    }

    #[test]
    fn corrupt_uuid_is_reported_not_panicked() {
        let document = MongoQuizDocument {
            id: "not-a-uuid".into(),
            title: "broken".into(),
            questions: Vec::new(),
        };
        let result: Result<QuizEntity, _> = document.try_into();
        assert!(result.is_err());
    }
}
