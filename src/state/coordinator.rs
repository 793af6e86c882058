use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::dao::models::{AnswerRecordEntity, AnswerWrite, SessionPatch};
use crate::dao::session_store::SessionStore;
use crate::dao::storage::StorageResult;
use crate::error::ServiceError;
use crate::state::flow::{Advance, GameFlow, Phase};
use crate::state::scoring;
use crate::state::session::{Quiz, Session};

/// Authoritative per-session coordinator.
///
/// One instance lives in the host process for every active session. It is the
/// sole writer of the session document (the countdown task included), applies
/// host and player commands, and republishes reconciled snapshots to
/// subscribers. Player records are only ever written through
/// [`SessionCoordinator::submit_answer`], which touches nothing but that
/// player's own document.
///
/// Cloning is cheap; all clones share the same countdown and watch pump.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    pin: String,
    quiz: Quiz,
    store: Arc<dyn SessionStore>,
    snapshots: broadcast::Sender<Session>,
    flow: Mutex<GameFlow>,
    countdown: Mutex<Option<JoinHandle<()>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
}

impl SessionCoordinator {
    /// Build a coordinator for an existing session document.
    pub fn new(
        pin: String,
        quiz: Quiz,
        store: Arc<dyn SessionStore>,
        tick: Duration,
        refractory: Duration,
        snapshot_capacity: usize,
    ) -> Self {
        let (snapshots, _receiver) = broadcast::channel(snapshot_capacity);
        Self {
            inner: Arc::new(CoordinatorInner {
                pin,
                quiz,
                store,
                snapshots,
                flow: Mutex::new(GameFlow::new(refractory)),
                countdown: Mutex::new(None),
                pump: Mutex::new(None),
                tick,
            }),
        }
    }

    /// PIN of the coordinated session.
    pub fn pin(&self) -> &str {
        &self.inner.pin
    }

    /// Quiz the session runs; immutable for the session's lifetime.
    pub fn quiz(&self) -> &Quiz {
        &self.inner.quiz
    }

    /// Read the current session document.
    pub async fn session(&self) -> Result<Session, ServiceError> {
        let entity = self
            .inner
            .store
            .find_session(&self.inner.pin)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("session `{}` not found", self.inner.pin))
            })?;
        Ok(entity.into())
    }

    /// Start (or restart) the question at `index` and arm the countdown.
    ///
    /// Restarting the index currently running is allowed and simply resets
    /// the timer; any previously armed countdown is cancelled first so two
    /// rapid host clicks can never leave two concurrent countdowns running.
    pub async fn start_question(
        &self,
        caller: Uuid,
        index: usize,
        duration_override: Option<u32>,
    ) -> Result<Session, ServiceError> {
        let session = self.session().await?;
        self.authorize(&session, caller)?;

        if session.phase == Phase::Final {
            return Err(ServiceError::InvalidState(
                "cannot start a question after the session ended".into(),
            ));
        }

        let Some(question) = self.inner.quiz.questions.get(index) else {
            return Err(ServiceError::InvalidState(format!(
                "question index {index} is out of range (quiz has {} questions)",
                self.inner.quiz.questions.len()
            )));
        };

        if let Some(current) = session.current_question_index {
            if index < current {
                return Err(ServiceError::InvalidState(format!(
                    "question index may not move backwards ({index} < {current})"
                )));
            }
            if session.phase == Phase::Question && index != current {
                return Err(ServiceError::InvalidState(
                    "another question is still running".into(),
                ));
            }
        }

        let duration = duration_override.unwrap_or(question.time_limit);
        let patch = SessionPatch::question_started(index, SystemTime::now(), duration);
        self.apply_patch(patch).await?;

        self.spawn_countdown(duration);
        self.session().await
    }

    /// Close the running question and publish results.
    pub async fn end_question(&self, caller: Uuid) -> Result<Session, ServiceError> {
        let session = self.session().await?;
        self.authorize(&session, caller)?;

        if session.phase != Phase::Question {
            return Err(ServiceError::InvalidState(format!(
                "no question is running (phase {:?})",
                session.phase
            )));
        }

        self.abort_countdown();
        self.apply_patch(SessionPatch::results()).await?;
        self.session().await
    }

    /// Advance past the current question: back to the lobby with the next
    /// index armed, or straight to the final scoreboard after the last one.
    pub async fn next_question(&self, caller: Uuid) -> Result<Session, ServiceError> {
        let session = self.session().await?;
        self.authorize(&session, caller)?;

        if session.phase == Phase::Final {
            return Err(ServiceError::InvalidState("session already ended".into()));
        }

        self.abort_countdown();

        let next = session
            .current_question_index
            .map_or(0, |current| current + 1);
        let patch = if next >= self.inner.quiz.questions.len() {
            SessionPatch::finalized()
        } else {
            SessionPatch::advanced(next)
        };
        self.apply_patch(patch).await?;
        self.session().await
    }

    /// Host-initiated early termination from any non-final phase.
    pub async fn end_session(&self, caller: Uuid) -> Result<Session, ServiceError> {
        let session = self.session().await?;
        self.authorize(&session, caller)?;

        if session.phase == Phase::Final {
            return Err(ServiceError::InvalidState("session already ended".into()));
        }

        self.abort_countdown();
        self.apply_patch(SessionPatch::finalized()).await?;
        self.lock_flow().force(Phase::Final);
        self.session().await
    }

    /// Open or close the session to new joins.
    pub async fn set_locked(&self, caller: Uuid, locked: bool) -> Result<Session, ServiceError> {
        let session = self.session().await?;
        self.authorize(&session, caller)?;

        if session.phase == Phase::Final {
            return Err(ServiceError::InvalidState("session already ended".into()));
        }

        self.apply_patch(SessionPatch::lock(locked)).await?;
        self.session().await
    }

    /// Record a player's answer for the running question.
    ///
    /// The write is a single conditional update on the player's own record,
    /// so a store failure leaves no partial player-visible change, and a
    /// second submission for the same question index is rejected even when
    /// two submissions race.
    pub async fn submit_answer(
        &self,
        player_id: Uuid,
        answer_index: Option<usize>,
    ) -> Result<u32, ServiceError> {
        let session = self.session().await?;

        if session.phase != Phase::Question {
            return Err(ServiceError::InvalidState(format!(
                "answers are only accepted during a question (phase {:?})",
                session.phase
            )));
        }
        let Some(started_at) = session.question_start_time else {
            return Err(ServiceError::InvalidState(
                "question has no start time".into(),
            ));
        };
        let Some(index) = session.current_question_index else {
            return Err(ServiceError::InvalidState(
                "no question index is armed".into(),
            ));
        };
        let Some(question) = self.inner.quiz.questions.get(index) else {
            return Err(ServiceError::InvalidState(format!(
                "question index {index} is not part of the quiz"
            )));
        };

        let player = self
            .inner
            .store
            .find_player(&self.inner.pin, player_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("player `{player_id}` has not joined this session"))
            })?;

        let question_index = index as u32;
        if player.answers.contains_key(&question_index.to_string()) {
            return Err(ServiceError::DuplicateAnswer(format!(
                "question {question_index} was already answered"
            )));
        }

        let elapsed = SystemTime::now()
            .duration_since(started_at)
            .unwrap_or_default()
            .as_secs_f64();
        let time_remaining = (f64::from(session.question_duration) - elapsed).max(0.0);
        let outcome = scoring::score(
            question,
            answer_index,
            time_remaining,
            session.question_duration,
        );

        let streak = if outcome.is_correct {
            player.streak + 1
        } else {
            0
        };

        let write = AnswerWrite {
            question_index,
            record: AnswerRecordEntity {
                answer_index,
                is_correct: outcome.is_correct,
                points: outcome.points,
                time_remaining_at_submit: time_remaining,
                submitted_at: SystemTime::now(),
            },
            points_delta: outcome.points,
            streak,
        };

        let applied = self
            .inner
            .store
            .record_answer(&self.inner.pin, player_id, write)
            .await?;
        if !applied {
            return Err(ServiceError::DuplicateAnswer(format!(
                "question {question_index} was already answered"
            )));
        }

        debug!(
            pin = %self.inner.pin,
            player = %player_id,
            question = question_index,
            correct = outcome.is_correct,
            points = outcome.points,
            "answer recorded"
        );
        Ok(question_index)
    }

    /// Subscribe to reconciled session snapshots.
    ///
    /// The first subscription lazily starts the store-watch pump; every
    /// subscriber gets its own receiver and disposes of it by dropping.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<Session>, ServiceError> {
        let receiver = self.inner.snapshots.subscribe();
        self.ensure_pump().await?;
        Ok(receiver)
    }

    /// Cancel the countdown and the watch pump. Safe to call repeatedly.
    pub fn cleanup(&self) {
        self.abort_countdown();
        if let Some(handle) = lock_unpoisoned(&self.inner.pump).take() {
            handle.abort();
        }
    }

    async fn ensure_pump(&self) -> Result<(), ServiceError> {
        {
            let guard = lock_unpoisoned(&self.inner.pump);
            if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
                return Ok(());
            }
        }

        let stream = self.inner.store.watch_session(&self.inner.pin).await?;

        let mut guard = lock_unpoisoned(&self.inner.pump);
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(entity) = stream.next().await {
                let snapshot = this.reconcile(entity.into());
                let _ = this.inner.snapshots.send(snapshot);
            }
            debug!(pin = %this.inner.pin, "session watch stream ended");
        });
        *guard = Some(handle);
        Ok(())
    }

    /// Reconcile a raw snapshot before republishing it.
    ///
    /// The cached countdown value is replaced with one recomputed from wall
    /// clock, and the advisory flow machine observes the snapshot so phase
    /// movement shows up in the logs. The store stays authoritative
    /// throughout; nothing here writes back.
    fn reconcile(&self, mut session: Session) -> Session {
        session.time_remaining = session.remaining_now();

        let view = session.flow_view(self.inner.quiz.questions.len());
        match self.lock_flow().observe(&view) {
            Advance::Adopted { from, to } => {
                debug!(pin = %self.inner.pin, ?from, ?to, "adopted phase reported by store");
            }
            Advance::Stepped { from, to } => {
                debug!(pin = %self.inner.pin, ?from, ?to, "phase advanced");
            }
            Advance::Suppressed { from, to } => {
                trace!(
                    pin = %self.inner.pin,
                    ?from,
                    ?to,
                    "phase step suppressed by refractory window"
                );
            }
            Advance::Unchanged => {}
        }

        session
    }

    fn spawn_countdown(&self, duration: u32) {
        let mut guard = lock_unpoisoned(&self.inner.countdown);
        if let Some(previous) = guard.take() {
            previous.abort();
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(this.inner.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a fresh interval completes immediately.
            ticker.tick().await;

            let mut remaining = duration;
            loop {
                ticker.tick().await;
                remaining = remaining.saturating_sub(1);

                if remaining > 0 {
                    // Tick persistence failures are not fatal; the next tick
                    // writes a fresher value anyway.
                    if let Err(err) = this
                        .inner
                        .store
                        .update_session(&this.inner.pin, SessionPatch::countdown_tick(remaining))
                        .await
                    {
                        warn!(pin = %this.inner.pin, error = %err, "countdown tick persist failed");
                    }
                } else {
                    match this.close_question().await {
                        Ok(()) => break,
                        Err(err) => {
                            warn!(
                                pin = %this.inner.pin,
                                error = %err,
                                "closing expired question failed; retrying next tick"
                            );
                        }
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    /// Countdown-side question close; the task exits by itself afterwards.
    async fn close_question(&self) -> StorageResult<()> {
        let updated = self
            .inner
            .store
            .update_session(&self.inner.pin, SessionPatch::results())
            .await?;
        if !updated {
            warn!(pin = %self.inner.pin, "session document vanished before the question closed");
        }
        Ok(())
    }

    fn abort_countdown(&self) {
        if let Some(handle) = lock_unpoisoned(&self.inner.countdown).take() {
            handle.abort();
        }
    }

    async fn apply_patch(&self, patch: SessionPatch) -> Result<(), ServiceError> {
        let updated = self
            .inner
            .store
            .update_session(&self.inner.pin, patch)
            .await?;
        if !updated {
            return Err(ServiceError::NotFound(format!(
                "session `{}` not found",
                self.inner.pin
            )));
        }
        Ok(())
    }

    fn authorize(&self, session: &Session, caller: Uuid) -> Result<(), ServiceError> {
        if session.host_id != caller {
            return Err(ServiceError::Unauthorized(
                "only the session host may do that".into(),
            ));
        }
        Ok(())
    }

    fn lock_flow(&self) -> MutexGuard<'_, GameFlow> {
        lock_unpoisoned(&self.inner.flow)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::session_store::memory::MemorySessionStore;
    use crate::state::leaderboard;
    use crate::state::session::{AnswerOption, PlayerSession, Question};

    const PIN: &str = "123456";

    fn quiz(question_count: usize) -> Quiz {
        let questions = (0..question_count)
            .map(|index| Question {
                id: Uuid::new_v4(),
                text: format!("question {index}"),
                answers: vec![
                    AnswerOption {
                        text: "right".into(),
                        is_correct: true,
                    },
                    AnswerOption {
                        text: "wrong".into(),
                        is_correct: false,
                    },
                    AnswerOption {
                        text: "also wrong".into(),
                        is_correct: false,
                    },
                ],
                time_limit: 30,
                points: 1000,
            })
            .collect();
        Quiz {
            id: Uuid::new_v4(),
            title: "test quiz".into(),
            questions,
        }
    }

    async fn setup(question_count: usize) -> (SessionCoordinator, Arc<dyn SessionStore>, Uuid) {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        let quiz = quiz(question_count);
        let host_id = Uuid::new_v4();
        let session = Session::new(PIN.into(), quiz.id, host_id, false);
        assert!(store.create_session(session.into()).await.unwrap());

        let coordinator = SessionCoordinator::new(
            PIN.into(),
            quiz,
            Arc::clone(&store),
            Duration::from_secs(1),
            Duration::ZERO,
            16,
        );
        (coordinator, store, host_id)
    }

    async fn join(store: &Arc<dyn SessionStore>, nickname: &str) -> Uuid {
        let player = PlayerSession::new(PIN.into(), nickname.into(), None);
        let player_id = player.player_id;
        assert!(store.create_player(player.into()).await.unwrap());
        player_id
    }

    async fn stored_session(store: &Arc<dyn SessionStore>) -> Session {
        store.find_session(PIN).await.unwrap().unwrap().into()
    }

    async fn stored_player(store: &Arc<dyn SessionStore>, player_id: Uuid) -> PlayerSession {
        store
            .find_player(PIN, player_id)
            .await
            .unwrap()
            .unwrap()
            .into()
    }

    #[tokio::test(start_paused = true)]
    async fn start_question_arms_the_countdown_state() {
        let (coordinator, store, host_id) = setup(2).await;

        let session = coordinator.start_question(host_id, 0, None).await.unwrap();
        assert_eq!(session.phase, Phase::Question);
        assert_eq!(session.current_question_index, Some(0));
        assert!(session.is_active);
        assert!(session.question_start_time.is_some());
        assert_eq!(session.question_duration, 30);
        assert_eq!(session.time_remaining, 30);

        let stored = stored_session(&store).await;
        assert_eq!(stored.phase, Phase::Question);
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn host_commands_reject_other_principals() {
        let (coordinator, _store, host_id) = setup(1).await;
        let imposter = Uuid::new_v4();

        for result in [
            coordinator.start_question(imposter, 0, None).await.err(),
            coordinator.end_question(imposter).await.err(),
            coordinator.next_question(imposter).await.err(),
            coordinator.end_session(imposter).await.err(),
            coordinator.set_locked(imposter, true).await.err(),
        ] {
            assert!(matches!(result, Some(ServiceError::Unauthorized(_))));
        }

        // The real host still works afterwards.
        coordinator.start_question(host_id, 0, None).await.unwrap();
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn start_question_validates_the_index() {
        let (coordinator, _store, host_id) = setup(2).await;

        assert!(matches!(
            coordinator.start_question(host_id, 7, None).await,
            Err(ServiceError::InvalidState(_))
        ));

        coordinator.start_question(host_id, 1, None).await.unwrap();
        coordinator.end_question(host_id).await.unwrap();

        // The index is monotonic; going back to 0 is refused.
        assert!(matches!(
            coordinator.start_question(host_id, 0, None).await,
            Err(ServiceError::InvalidState(_))
        ));
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_and_auto_closes_the_question() {
        let (coordinator, store, host_id) = setup(1).await;
        coordinator
            .start_question(host_id, 0, Some(3))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2200)).await;
        let mid = stored_session(&store).await;
        assert_eq!(mid.phase, Phase::Question);
        assert_eq!(mid.time_remaining, 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let closed = stored_session(&store).await;
        assert_eq!(closed.phase, Phase::Results);
        assert!(!closed.is_active);
        assert_eq!(closed.time_remaining, 0);
        assert!(closed.question_start_time.is_none());
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_a_question_never_leaves_two_countdowns() {
        let (coordinator, store, host_id) = setup(1).await;
        coordinator
            .start_question(host_id, 0, Some(3))
            .await
            .unwrap();
        // Double-click: restart of the same index cancels the first timer.
        coordinator
            .start_question(host_id, 0, Some(3))
            .await
            .unwrap();

        // With a single countdown the question is still open after 2.2s; a
        // leaked second timer would have decremented twice per second and
        // closed it already.
        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(stored_session(&store).await.phase, Phase::Question);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(stored_session(&store).await.phase, Phase::Results);
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn submit_scores_and_tracks_streaks() {
        let (coordinator, store, host_id) = setup(1).await;
        let right = join(&store, "right").await;
        let wrong = join(&store, "wrong").await;

        coordinator.start_question(host_id, 0, None).await.unwrap();

        coordinator.submit_answer(right, Some(0)).await.unwrap();
        coordinator.submit_answer(wrong, Some(1)).await.unwrap();

        let right_player = stored_player(&store, right).await;
        assert!(right_player.score >= 950, "score {}", right_player.score);
        assert!(right_player.score <= 1000);
        assert_eq!(right_player.streak, 1);
        assert!(right_player.answers[&0].is_correct);

        let wrong_player = stored_player(&store, wrong).await;
        assert_eq!(wrong_player.score, 0);
        assert_eq!(wrong_player.streak, 0);
        assert!(!wrong_player.answers[&0].is_correct);
        assert_eq!(wrong_player.answers[&0].points, 0);
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_submission_changes_nothing() {
        let (coordinator, store, host_id) = setup(1).await;
        let player_id = join(&store, "ada").await;

        coordinator.start_question(host_id, 0, None).await.unwrap();
        coordinator.submit_answer(player_id, Some(0)).await.unwrap();

        let before = stored_player(&store, player_id).await;
        let second = coordinator.submit_answer(player_id, Some(1)).await;
        assert!(matches!(second, Err(ServiceError::DuplicateAnswer(_))));

        let after = stored_player(&store, player_id).await;
        assert_eq!(after.score, before.score);
        assert_eq!(after.streak, before.streak);
        assert_eq!(after.answers.len(), 1);
        assert_eq!(
            after.answers[&0].answer_index,
            before.answers[&0].answer_index
        );
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn answers_are_rejected_outside_the_question_phase() {
        let (coordinator, store, host_id) = setup(1).await;
        let player_id = join(&store, "early").await;

        assert!(matches!(
            coordinator.submit_answer(player_id, Some(0)).await,
            Err(ServiceError::InvalidState(_))
        ));

        coordinator.start_question(host_id, 0, None).await.unwrap();
        coordinator.end_question(host_id).await.unwrap();

        assert!(matches!(
            coordinator.submit_answer(player_id, Some(0)).await,
            Err(ServiceError::InvalidState(_))
        ));
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_players_cannot_answer() {
        let (coordinator, _store, host_id) = setup(1).await;
        coordinator.start_question(host_id, 0, None).await.unwrap();

        assert!(matches!(
            coordinator.submit_answer(Uuid::new_v4(), Some(0)).await,
            Err(ServiceError::NotFound(_))
        ));
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn streak_resets_on_a_wrong_answer() {
        let (coordinator, store, host_id) = setup(3).await;
        let player_id = join(&store, "ada").await;

        coordinator.start_question(host_id, 0, None).await.unwrap();
        coordinator.submit_answer(player_id, Some(0)).await.unwrap();
        coordinator.end_question(host_id).await.unwrap();
        coordinator.next_question(host_id).await.unwrap();

        coordinator.start_question(host_id, 1, None).await.unwrap();
        coordinator.submit_answer(player_id, Some(2)).await.unwrap();
        coordinator.end_question(host_id).await.unwrap();
        coordinator.next_question(host_id).await.unwrap();

        let after_miss = stored_player(&store, player_id).await;
        assert_eq!(after_miss.streak, 0);

        coordinator.start_question(host_id, 2, None).await.unwrap();
        coordinator.submit_answer(player_id, Some(0)).await.unwrap();

        let after_recovery = stored_player(&store, player_id).await;
        assert_eq!(after_recovery.streak, 1);
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn score_accumulates_and_matches_the_answer_ledger() {
        let (coordinator, store, host_id) = setup(2).await;
        let player_id = join(&store, "ada").await;

        coordinator.start_question(host_id, 0, None).await.unwrap();
        coordinator.submit_answer(player_id, Some(0)).await.unwrap();
        coordinator.end_question(host_id).await.unwrap();
        coordinator.next_question(host_id).await.unwrap();

        coordinator.start_question(host_id, 1, None).await.unwrap();
        coordinator.submit_answer(player_id, Some(0)).await.unwrap();

        let player = stored_player(&store, player_id).await;
        assert_eq!(player.streak, 2);
        assert!(player.score > 1000, "second answer did not accumulate");
        let ledger_total: u32 = player.answers.values().map(|record| record.points).sum();
        assert_eq!(player.score, ledger_total);
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn next_question_walks_to_the_lobby_then_final() {
        let (coordinator, _store, host_id) = setup(2).await;

        coordinator.start_question(host_id, 0, None).await.unwrap();
        coordinator.end_question(host_id).await.unwrap();

        let lobby = coordinator.next_question(host_id).await.unwrap();
        assert_eq!(lobby.phase, Phase::Waiting);
        assert_eq!(lobby.current_question_index, Some(1));
        assert!(!lobby.is_active);

        coordinator.start_question(host_id, 1, None).await.unwrap();
        coordinator.end_question(host_id).await.unwrap();

        let ended = coordinator.next_question(host_id).await.unwrap();
        assert_eq!(ended.phase, Phase::Final);
        assert!(!ended.is_active);

        assert!(matches!(
            coordinator.next_question(host_id).await,
            Err(ServiceError::InvalidState(_))
        ));
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_terminates_from_any_phase() {
        let (coordinator, store, host_id) = setup(3).await;
        coordinator.start_question(host_id, 0, None).await.unwrap();

        let ended = coordinator.end_session(host_id).await.unwrap();
        assert_eq!(ended.phase, Phase::Final);

        // The cancelled countdown must not flip the session back to results.
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(stored_session(&store).await.phase, Phase::Final);
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_stops_the_countdown_and_is_idempotent() {
        let (coordinator, store, host_id) = setup(1).await;
        coordinator
            .start_question(host_id, 0, Some(3))
            .await
            .unwrap();

        coordinator.cleanup();
        coordinator.cleanup();

        tokio::time::sleep(Duration::from_secs(10)).await;
        // No countdown is left to close the question.
        assert_eq!(stored_session(&store).await.phase, Phase::Question);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_reconciles_stale_countdown_values() {
        let (coordinator, store, host_id) = setup(1).await;

        let mut snapshots = coordinator.subscribe().await.unwrap();
        let primed = snapshots.recv().await.unwrap();
        assert_eq!(primed.phase, Phase::Waiting);

        coordinator.start_question(host_id, 0, None).await.unwrap();
        let live = snapshots.recv().await.unwrap();
        assert_eq!(live.phase, Phase::Question);
        assert!(live.time_remaining > 0);

        // A stale snapshot claiming a full clock for a question that started
        // long ago reconciles to zero remaining seconds.
        let stale_start = SystemTime::now() - Duration::from_secs(120);
        store
            .update_session(PIN, SessionPatch::question_started(0, stale_start, 30))
            .await
            .unwrap();
        let reconciled = snapshots.recv().await.unwrap();
        assert_eq!(reconciled.time_remaining, 0);
        coordinator.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn reference_scenario_one_question_game() {
        let (coordinator, store, host_id) = setup(1).await;
        let winner = join(&store, "winner").await;
        let loser = join(&store, "loser").await;

        coordinator
            .start_question(host_id, 0, Some(30))
            .await
            .unwrap();
        coordinator.submit_answer(winner, Some(0)).await.unwrap();
        coordinator.submit_answer(loser, Some(1)).await.unwrap();

        // Let the countdown run out; the phase closes on its own.
        tokio::time::sleep(Duration::from_secs(32)).await;
        assert_eq!(stored_session(&store).await.phase, Phase::Results);

        let ended = coordinator.next_question(host_id).await.unwrap();
        assert_eq!(ended.phase, Phase::Final);

        let players: Vec<PlayerSession> = store
            .list_players(PIN)
            .await
            .unwrap()
            .into_iter()
            .map(Into::into)
            .collect();
        let ranked = leaderboard::rank(&players);
        assert_eq!(ranked[0].nickname, "winner");
        assert!(ranked[0].score > 0);
        assert_eq!(ranked[1].nickname, "loser");
        assert_eq!(ranked[1].score, 0);
        coordinator.cleanup();
    }
}
