use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "quizpin";

/// Connection settings for the MongoDB session store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed client options for the target deployment.
    pub options: ClientOptions,
    /// Database holding the session, player, and quiz collections.
    pub database_name: String,
    /// Interval between polls of watched documents.
    pub poll_interval: Duration,
}

impl MongoConfig {
    /// Parse a MongoDB URI into a store configuration.
    pub async fn from_uri(
        uri: &str,
        db_name: Option<&str>,
        poll_interval: Duration,
    ) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
            poll_interval,
        })
    }
}
