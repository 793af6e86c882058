use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use indexmap::IndexMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::dao::models::{
    AnswerWrite, PlayerSessionEntity, QuizEntity, QuizListItemEntity, SessionEntity, SessionPatch,
};
use crate::dao::session_store::{SessionStore, SnapshotStream};
use crate::dao::storage::StorageResult;

/// In-memory [`SessionStore`] backend.
///
/// Documents live in process memory and change notifications ride Tokio
/// broadcast channels, which gives the same at-least-once, possibly-lagging
/// delivery contract as the networked backends. This is both the default
/// standalone backend and the substrate the coordinator tests run against.
#[derive(Clone)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    sessions: DashMap<String, SessionEntity>,
    /// Player records per session, in join order.
    players: DashMap<String, IndexMap<Uuid, PlayerSessionEntity>>,
    quizzes: DashMap<Uuid, QuizEntity>,
    session_watch: DashMap<String, broadcast::Sender<SessionEntity>>,
    player_watch: DashMap<String, broadcast::Sender<Vec<PlayerSessionEntity>>>,
    channel_capacity: usize,
}

impl MemorySessionStore {
    /// Build an empty store whose snapshot channels buffer `channel_capacity`
    /// messages per subscriber before lagging.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                sessions: DashMap::new(),
                players: DashMap::new(),
                quizzes: DashMap::new(),
                session_watch: DashMap::new(),
                player_watch: DashMap::new(),
                channel_capacity,
            }),
        }
    }

    fn session_sender(&self, pin: &str) -> broadcast::Sender<SessionEntity> {
        self.inner
            .session_watch
            .entry(pin.to_owned())
            .or_insert_with(|| broadcast::channel(self.inner.channel_capacity).0)
            .clone()
    }

    fn player_sender(&self, pin: &str) -> broadcast::Sender<Vec<PlayerSessionEntity>> {
        self.inner
            .player_watch
            .entry(pin.to_owned())
            .or_insert_with(|| broadcast::channel(self.inner.channel_capacity).0)
            .clone()
    }

    fn notify_session(&self, snapshot: SessionEntity) {
        // No subscribers is fine; the send result is intentionally ignored.
        let _ = self.session_sender(&snapshot.pin).send(snapshot);
    }

    fn notify_players(&self, pin: &str) {
        let roster = self.roster(pin);
        let _ = self.player_sender(pin).send(roster);
    }

    fn roster(&self, pin: &str) -> Vec<PlayerSessionEntity> {
        self.inner
            .players
            .get(pin)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let pin = session.pin.clone();
            let created = match store.inner.sessions.entry(pin.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(session.clone());
                    true
                }
            };
            if created {
                store.inner.players.entry(pin).or_default();
                store.notify_session(session);
            }
            Ok(created)
        })
    }

    fn find_session(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move { Ok(store.inner.sessions.get(&pin).map(|entry| entry.clone())) })
    }

    fn update_session(
        &self,
        pin: &str,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move {
            let snapshot = match store.inner.sessions.get_mut(&pin) {
                Some(mut entry) => {
                    patch.apply_to(&mut entry);
                    entry.updated_at = SystemTime::now();
                    Some(entry.clone())
                }
                None => None,
            };
            match snapshot {
                Some(snapshot) => {
                    store.notify_session(snapshot);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn watch_session(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<SnapshotStream<SessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move {
            let receiver = store.session_sender(&pin).subscribe();
            let current = store.inner.sessions.get(&pin).map(|entry| entry.clone());
            // Lagged subscribers skip to the next snapshot; every snapshot is
            // authoritative so nothing is lost by dropping intermediates.
            let live = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });
            Ok(futures::stream::iter(current).chain(live).boxed())
        })
    }

    fn create_player(
        &self,
        player: PlayerSessionEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let pin = player.pin.clone();
            let created = {
                let mut records = store.inner.players.entry(pin.clone()).or_default();
                let nickname_taken = records
                    .values()
                    .any(|existing| existing.nickname == player.nickname);
                if nickname_taken || records.contains_key(&player.player_id) {
                    false
                } else {
                    records.insert(player.player_id, player);
                    true
                }
            };
            if created {
                store.notify_players(&pin);
            }
            Ok(created)
        })
    }

    fn find_player(
        &self,
        pin: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerSessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move {
            Ok(store
                .inner
                .players
                .get(&pin)
                .and_then(|records| records.get(&player_id).cloned()))
        })
    }

    fn list_players(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerSessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move { Ok(store.roster(&pin)) })
    }

    fn record_answer(
        &self,
        pin: &str,
        player_id: Uuid,
        write: AnswerWrite,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move {
            let applied = {
                let Some(mut records) = store.inner.players.get_mut(&pin) else {
                    return Ok(false);
                };
                let Some(player) = records.get_mut(&player_id) else {
                    return Ok(false);
                };
                let key = write.question_index.to_string();
                if player.answers.contains_key(&key) {
                    false
                } else {
                    player.answers.insert(key, write.record);
                    player.score += write.points_delta;
                    player.streak = write.streak;
                    true
                }
            };
            if applied {
                store.notify_players(&pin);
            }
            Ok(applied)
        })
    }

    fn watch_players(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<SnapshotStream<Vec<PlayerSessionEntity>>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move {
            let receiver = store.player_sender(&pin).subscribe();
            let current = store.roster(&pin);
            let live = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });
            Ok(futures::stream::iter(Some(current)).chain(live).boxed())
        })
    }

    fn save_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.quizzes.insert(quiz.id, quiz);
            Ok(())
        })
    }

    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.quizzes.get(&id).map(|entry| entry.clone())) })
    }

    fn list_quizzes(&self) -> BoxFuture<'static, StorageResult<Vec<QuizListItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .quizzes
                .iter()
                .map(|entry| QuizListItemEntity::from(entry.value()))
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dao::models::AnswerRecordEntity;
    use crate::state::flow::Phase;

    fn sample_session(pin: &str) -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            pin: pin.to_owned(),
            quiz_id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            phase: Phase::Waiting,
            current_question_index: None,
            question_start_time: None,
            question_duration: 0,
            time_remaining: 0,
            is_active: false,
            locked: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_player(pin: &str, nickname: &str) -> PlayerSessionEntity {
        PlayerSessionEntity {
            pin: pin.to_owned(),
            player_id: Uuid::new_v4(),
            nickname: nickname.to_owned(),
            score: 0,
            streak: 0,
            answers: BTreeMap::new(),
            joined_at: SystemTime::now(),
            avatar: None,
        }
    }

    fn sample_write(index: u32, points: u32) -> AnswerWrite {
        AnswerWrite {
            question_index: index,
            record: AnswerRecordEntity {
                answer_index: Some(0),
                is_correct: points > 0,
                points,
                time_remaining_at_submit: 10.0,
                submitted_at: SystemTime::now(),
            },
            points_delta: points,
            streak: u32::from(points > 0),
        }
    }

    #[tokio::test]
    async fn pin_collision_is_rejected() {
        let store = MemorySessionStore::default();
        assert!(store.create_session(sample_session("123456")).await.unwrap());
        assert!(!store.create_session(sample_session("123456")).await.unwrap());
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields_alone() {
        let store = MemorySessionStore::default();
        store.create_session(sample_session("123456")).await.unwrap();

        let updated = store
            .update_session("123456", SessionPatch::lock(true))
            .await
            .unwrap();
        assert!(updated);

        let session = store.find_session("123456").await.unwrap().unwrap();
        assert!(session.locked);
        assert_eq!(session.phase, Phase::Waiting);
        assert!(!session.is_active);
    }

    #[tokio::test]
    async fn update_of_unknown_session_reports_missing() {
        let store = MemorySessionStore::default();
        let updated = store
            .update_session("000000", SessionPatch::results())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn nickname_collision_is_rejected_case_sensitively() {
        let store = MemorySessionStore::default();
        store.create_session(sample_session("123456")).await.unwrap();

        assert!(store.create_player(sample_player("123456", "Ada")).await.unwrap());
        assert!(!store.create_player(sample_player("123456", "Ada")).await.unwrap());
        // Different case is a different nickname.
        assert!(store.create_player(sample_player("123456", "ada")).await.unwrap());
    }

    #[tokio::test]
    async fn record_answer_is_exactly_once() {
        let store = MemorySessionStore::default();
        store.create_session(sample_session("123456")).await.unwrap();
        let player = sample_player("123456", "Ada");
        let player_id = player.player_id;
        store.create_player(player).await.unwrap();

        assert!(store
            .record_answer("123456", player_id, sample_write(0, 750))
            .await
            .unwrap());
        assert!(!store
            .record_answer("123456", player_id, sample_write(0, 500))
            .await
            .unwrap());

        let stored = store.find_player("123456", player_id).await.unwrap().unwrap();
        assert_eq!(stored.score, 750);
        assert_eq!(stored.answers.len(), 1);
        assert_eq!(stored.answers["0"].points, 750);
    }

    #[tokio::test]
    async fn score_accumulates_across_questions() {
        let store = MemorySessionStore::default();
        store.create_session(sample_session("123456")).await.unwrap();
        let player = sample_player("123456", "Ada");
        let player_id = player.player_id;
        store.create_player(player).await.unwrap();

        store
            .record_answer("123456", player_id, sample_write(0, 600))
            .await
            .unwrap();
        store
            .record_answer("123456", player_id, sample_write(1, 400))
            .await
            .unwrap();

        let stored = store.find_player("123456", player_id).await.unwrap().unwrap();
        assert_eq!(stored.score, 1000);
        let total: u32 = stored.answers.values().map(|record| record.points).sum();
        assert_eq!(stored.score, total);
    }

    #[tokio::test]
    async fn watch_session_primes_with_current_state_then_follows() {
        let store = MemorySessionStore::default();
        store.create_session(sample_session("123456")).await.unwrap();

        let mut stream = store.watch_session("123456").await.unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.phase, Phase::Waiting);

        store
            .update_session("123456", SessionPatch::finalized())
            .await
            .unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(second.phase, Phase::Final);
    }
}
