pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::dao::models::{
    AnswerWrite, PlayerSessionEntity, QuizEntity, QuizListItemEntity, SessionEntity, SessionPatch,
};
use crate::dao::storage::StorageResult;

/// Snapshot stream handed out by the subscription methods.
///
/// Delivery is at-least-once: duplicates and stale snapshots are allowed, and
/// subscribers must treat every received snapshot as fully authoritative.
pub type SnapshotStream<T> = BoxStream<'static, T>;

/// Abstraction over the document store that acts as the session message bus.
///
/// Sessions and player records are separate documents with disjoint writers
/// (host coordinator vs. the individual player), so no operation here needs a
/// cross-document transaction. Updates are partial and last-write-wins.
pub trait SessionStore: Send + Sync {
    /// Insert a fresh session document. Returns `false` when the PIN is
    /// already taken (caller picks a new one).
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>>;

    /// Fetch a session document by PIN.
    fn find_session(&self, pin: &str)
    -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;

    /// Apply a partial update to a session document. Returns `false` when the
    /// session does not exist.
    fn update_session(
        &self,
        pin: &str,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Subscribe to full-document snapshots of one session. The stream starts
    /// with the current state (when the document exists) and then follows
    /// every observed change.
    fn watch_session(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<SnapshotStream<SessionEntity>>>;

    /// Insert a fresh player record. Returns `false` when the player id or
    /// nickname already exists within the session.
    fn create_player(
        &self,
        player: PlayerSessionEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Fetch one player record.
    fn find_player(
        &self,
        pin: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerSessionEntity>>>;

    /// List all player records of a session in join order.
    fn list_players(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerSessionEntity>>>;

    /// Record an answer with exactly-once semantics: the write applies only
    /// when no record exists for the question index yet, and returns whether
    /// it applied. Score is incremented atomically inside the same
    /// single-document update.
    fn record_answer(
        &self,
        pin: &str,
        player_id: Uuid,
        write: AnswerWrite,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Subscribe to snapshots of the full player-record set of a session.
    fn watch_players(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<SnapshotStream<Vec<PlayerSessionEntity>>>>;

    /// Upsert a quiz document.
    fn save_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>>;

    /// Fetch a quiz document by id.
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;

    /// List stored quizzes.
    fn list_quizzes(&self) -> BoxFuture<'static, StorageResult<Vec<QuizListItemEntity>>>;

    /// Cheap connectivity probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Attempt to re-establish a dropped backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
