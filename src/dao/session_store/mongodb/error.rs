use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB store operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Errors surfaced by the MongoDB session store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The configured URI could not be parsed.
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        /// URI as provided by configuration.
        uri: String,
        /// Parse failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// The driver refused the client options.
    #[error("failed to construct MongoDB client")]
    ClientConstruction {
        /// Construction failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// The deployment never answered the bootstrap ping.
    #[error("MongoDB did not answer ping after {attempts} attempts")]
    InitialPing {
        /// Number of ping attempts made.
        attempts: u32,
        /// Last ping failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A health-check ping failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        /// Ping failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// Index creation failed during bootstrap.
    #[error("failed to ensure index `{index}` on `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index description.
        index: &'static str,
        /// Failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// A session document operation failed.
    #[error("session `{pin}` operation failed")]
    Session {
        /// PIN of the session involved.
        pin: String,
        /// Failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// A player document operation failed.
    #[error("player `{player_id}` in session `{pin}` operation failed")]
    Player {
        /// PIN of the session involved.
        pin: String,
        /// Player the operation targeted.
        player_id: Uuid,
        /// Failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// Listing the player records of a session failed.
    #[error("listing players of session `{pin}` failed")]
    ListPlayers {
        /// PIN of the session involved.
        pin: String,
        /// Failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// A quiz document operation failed.
    #[error("quiz `{id}` operation failed")]
    Quiz {
        /// Quiz the operation targeted.
        id: Uuid,
        /// Failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// Listing quizzes failed.
    #[error("listing quizzes failed")]
    ListQuizzes {
        /// Failure reported by the driver.
        #[source]
        source: mongodb::error::Error,
    },
    /// Serializing an entity into BSON failed.
    #[error("failed to encode {what} as BSON")]
    Encode {
        /// What was being encoded.
        what: &'static str,
        /// Serializer failure.
        #[source]
        source: mongodb::bson::error::Error,
    },
}
