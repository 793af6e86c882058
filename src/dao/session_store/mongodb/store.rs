use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Database,
    bson::{Bson, Document, doc, serialize_to_bson as to_bson},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::{RwLock, broadcast};
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

use super::config::MongoConfig;
use super::connection::establish_connection;
use super::error::{MongoDaoError, MongoResult};
use super::models::{
    MongoAnswerDocument, MongoPlayerDocument, MongoQuizDocument, MongoSessionDocument,
};
use crate::dao::models::{
    AnswerWrite, PlayerSessionEntity, QuizEntity, QuizListItemEntity, SessionEntity, SessionPatch,
};
use crate::dao::session_store::{SessionStore, SnapshotStream};
use crate::dao::storage::StorageResult;

const SESSION_COLLECTION: &str = "sessions";
const PLAYER_COLLECTION: &str = "players";
const QUIZ_COLLECTION: &str = "quizzes";
const WATCH_CHANNEL_CAPACITY: usize = 16;

/// MongoDB-backed [`SessionStore`].
///
/// Document subscriptions are served by per-document polling watchers rather
/// than change streams, so the store works against standalone deployments.
/// The resulting delivery contract (at-least-once, possibly stale) is exactly
/// what subscribers are required to tolerate.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
    session_watch: DashMap<String, broadcast::Sender<SessionEntity>>,
    player_watch: DashMap<String, broadcast::Sender<Vec<PlayerSessionEntity>>>,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
            session_watch: DashMap::new(),
            player_watch: DashMap::new(),
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let players = database.collection::<MongoPlayerDocument>(PLAYER_COLLECTION);

        let identity = mongodb::IndexModel::builder()
            .keys(doc! {"pin": 1, "player_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_identity_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        players
            .create_index(identity)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION,
                index: "pin,player_id",
                source,
            })?;

        // Nickname uniqueness is enforced here so concurrent joins cannot
        // slip past the service-level check.
        let nickname = mongodb::IndexModel::builder()
            .keys(doc! {"pin": 1, "nickname": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_nickname_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        players
            .create_index(nickname)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION,
                index: "pin,nickname",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database()
            .await
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database()
            .await
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION)
    }

    async fn quizzes(&self) -> Collection<MongoQuizDocument> {
        self.database()
            .await
            .collection::<MongoQuizDocument>(QUIZ_COLLECTION)
    }

    async fn ping(&self) -> MongoResult<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(
            &self.inner.config.options,
            &self.inner.config.database_name,
        )
        .await?;
        let mut guard = self.inner.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    async fn create_session_inner(&self, session: SessionEntity) -> StorageResult<bool> {
        let pin = session.pin.clone();
        let document = MongoSessionDocument::from(session);
        match self.sessions().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Session { pin, source }.into()),
        }
    }

    async fn find_session_inner(&self, pin: &str) -> StorageResult<Option<SessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(doc! {"_id": pin})
            .await
            .map_err(|source| MongoDaoError::Session {
                pin: pin.to_owned(),
                source,
            })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn update_session_inner(&self, pin: &str, patch: SessionPatch) -> StorageResult<bool> {
        let set = patch_to_set(&patch)?;
        let result = self
            .sessions()
            .await
            .update_one(doc! {"_id": pin}, doc! {"$set": set})
            .await
            .map_err(|source| MongoDaoError::Session {
                pin: pin.to_owned(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn create_player_inner(&self, player: PlayerSessionEntity) -> StorageResult<bool> {
        let pin = player.pin.clone();
        let player_id = player.player_id;
        let document = MongoPlayerDocument::from(player);
        match self.players().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Player {
                pin,
                player_id,
                source,
            }
            .into()),
        }
    }

    async fn find_player_inner(
        &self,
        pin: &str,
        player_id: Uuid,
    ) -> StorageResult<Option<PlayerSessionEntity>> {
        let document = self
            .players()
            .await
            .find_one(doc! {"pin": pin, "player_id": player_id.to_string()})
            .await
            .map_err(|source| MongoDaoError::Player {
                pin: pin.to_owned(),
                player_id,
                source,
            })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn list_players_inner(&self, pin: &str) -> StorageResult<Vec<PlayerSessionEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(doc! {"pin": pin})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(|source| MongoDaoError::ListPlayers {
                pin: pin.to_owned(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPlayers {
                pin: pin.to_owned(),
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_answer_inner(
        &self,
        pin: &str,
        player_id: Uuid,
        write: AnswerWrite,
    ) -> StorageResult<bool> {
        let key = format!("answers.{}", write.question_index);
        let record = to_bson(&MongoAnswerDocument::from(write.record)).map_err(|source| {
            MongoDaoError::Encode {
                what: "answer record",
                source,
            }
        })?;

        // The filter requires the answer slot to still be empty, which makes
        // the write-and-increment a single conditional document update.
        let mut filter = doc! {"pin": pin, "player_id": player_id.to_string()};
        filter.insert(key.clone(), doc! {"$exists": false});

        let mut set = Document::new();
        set.insert(key, record);
        set.insert("streak", i64::from(write.streak));
        let update = doc! {"$set": set, "$inc": {"score": i64::from(write.points_delta)}};

        let result = self
            .players()
            .await
            .update_one(filter, update)
            .await
            .map_err(|source| MongoDaoError::Player {
                pin: pin.to_owned(),
                player_id,
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn save_quiz_inner(&self, quiz: QuizEntity) -> StorageResult<()> {
        let id = quiz.id;
        let document = MongoQuizDocument::from(quiz);
        self.quizzes()
            .await
            .replace_one(doc! {"_id": id.to_string()}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Quiz { id, source })?;
        Ok(())
    }

    async fn find_quiz_inner(&self, id: Uuid) -> StorageResult<Option<QuizEntity>> {
        let document = self
            .quizzes()
            .await
            .find_one(doc! {"_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::Quiz { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn list_quizzes_inner(&self) -> StorageResult<Vec<QuizListItemEntity>> {
        let documents: Vec<MongoQuizDocument> = self
            .quizzes()
            .await
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::ListQuizzes { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListQuizzes { source })?;

        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            let entity: QuizEntity = document.try_into()?;
            items.push(QuizListItemEntity::from(&entity));
        }
        Ok(items)
    }

    fn session_receiver(&self, pin: &str) -> broadcast::Receiver<SessionEntity> {
        match self.inner.session_watch.entry(pin.to_owned()) {
            Entry::Occupied(entry) => entry.get().subscribe(),
            Entry::Vacant(slot) => {
                let (sender, receiver) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
                slot.insert(sender.clone());
                self.spawn_session_watcher(pin.to_owned(), sender);
                receiver
            }
        }
    }

    fn player_receiver(&self, pin: &str) -> broadcast::Receiver<Vec<PlayerSessionEntity>> {
        match self.inner.player_watch.entry(pin.to_owned()) {
            Entry::Occupied(entry) => entry.get().subscribe(),
            Entry::Vacant(slot) => {
                let (sender, receiver) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
                slot.insert(sender.clone());
                self.spawn_player_watcher(pin.to_owned(), sender);
                receiver
            }
        }
    }

    fn spawn_session_watcher(&self, pin: String, sender: broadcast::Sender<SessionEntity>) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(store.inner.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_seen: Option<SystemTime> = None;

            loop {
                ticker.tick().await;

                if sender.receiver_count() == 0
                    && store
                        .inner
                        .session_watch
                        .remove_if(&pin, |_, active| active.receiver_count() == 0)
                        .is_some()
                {
                    break;
                }

                match store.find_session_inner(&pin).await {
                    Ok(Some(session)) => {
                        if last_seen != Some(session.updated_at) {
                            last_seen = Some(session.updated_at);
                            let _ = sender.send(session);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => debug!(pin = %pin, error = %err, "session poll failed"),
                }
            }
        });
    }

    fn spawn_player_watcher(
        &self,
        pin: String,
        sender: broadcast::Sender<Vec<PlayerSessionEntity>>,
    ) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(store.inner.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_seen: Option<Vec<PlayerSessionEntity>> = None;

            loop {
                ticker.tick().await;

                if sender.receiver_count() == 0
                    && store
                        .inner
                        .player_watch
                        .remove_if(&pin, |_, active| active.receiver_count() == 0)
                        .is_some()
                {
                    break;
                }

                match store.list_players_inner(&pin).await {
                    Ok(roster) => {
                        if last_seen.as_ref() != Some(&roster) {
                            last_seen = Some(roster.clone());
                            let _ = sender.send(roster);
                        }
                    }
                    Err(err) => debug!(pin = %pin, error = %err, "player poll failed"),
                }
            }
        });
    }
}

impl SessionStore for MongoSessionStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.create_session_inner(session).await })
    }

    fn find_session(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move { store.find_session_inner(&pin).await })
    }

    fn update_session(
        &self,
        pin: &str,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move { store.update_session_inner(&pin, patch).await })
    }

    fn watch_session(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<SnapshotStream<SessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move {
            let receiver = store.session_receiver(&pin);
            let current = store.find_session_inner(&pin).await?;
            let live = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });
            Ok(futures::stream::iter(current).chain(live).boxed())
        })
    }

    fn create_player(
        &self,
        player: PlayerSessionEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.create_player_inner(player).await })
    }

    fn find_player(
        &self,
        pin: &str,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerSessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move { store.find_player_inner(&pin, player_id).await })
    }

    fn list_players(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerSessionEntity>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move { store.list_players_inner(&pin).await })
    }

    fn record_answer(
        &self,
        pin: &str,
        player_id: Uuid,
        write: AnswerWrite,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move { store.record_answer_inner(&pin, player_id, write).await })
    }

    fn watch_players(
        &self,
        pin: &str,
    ) -> BoxFuture<'static, StorageResult<SnapshotStream<Vec<PlayerSessionEntity>>>> {
        let store = self.clone();
        let pin = pin.to_owned();
        Box::pin(async move {
            let receiver = store.player_receiver(&pin);
            let current = store.list_players_inner(&pin).await?;
            let live = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });
            Ok(futures::stream::iter(Some(current)).chain(live).boxed())
        })
    }

    fn save_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_quiz_inner(quiz).await })
    }

    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz_inner(id).await })
    }

    fn list_quizzes(&self) -> BoxFuture<'static, StorageResult<Vec<QuizListItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_quizzes_inner().await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reconnect().await.map_err(Into::into) })
    }
}

/// Translate a [`SessionPatch`] into a `$set` document. The store stamps
/// `updated_at` on every applied patch.
fn patch_to_set(patch: &SessionPatch) -> StorageResult<Document> {
    let mut set = doc! {"updated_at": mongodb::bson::DateTime::now()};

    if let Some(phase) = patch.phase {
        let phase = to_bson(&phase).map_err(|source| MongoDaoError::Encode {
            what: "session phase",
            source,
        })?;
        set.insert("phase", phase);
    }
    if let Some(index) = patch.current_question_index {
        set.insert("current_question_index", index as i64);
    }
    if let Some(start) = patch.question_start_time {
        match start {
            Some(instant) => set.insert(
                "question_start_time",
                mongodb::bson::DateTime::from_system_time(instant),
            ),
            None => set.insert("question_start_time", Bson::Null),
        };
    }
    if let Some(duration) = patch.question_duration {
        set.insert("question_duration", i64::from(duration));
    }
    if let Some(remaining) = patch.time_remaining {
        set.insert("time_remaining", i64::from(remaining));
    }
    if let Some(active) = patch.is_active {
        set.insert("is_active", active);
    }
    if let Some(locked) = patch.locked {
        set.insert("locked", locked);
    }

    Ok(set)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}
