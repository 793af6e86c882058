//! Quizpin backend binary entrypoint wiring REST, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizpin_back::{
    config::AppConfig,
    dao::session_store::memory::MemorySessionStore,
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    bootstrap_storage(&app_state).await;

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the storage backend: MongoDB via the background supervisor when a
/// URI is configured (and the feature is compiled in), the in-memory store
/// otherwise.
async fn bootstrap_storage(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        use quizpin_back::dao::session_store::SessionStore;
        use quizpin_back::dao::session_store::mongodb::{MongoConfig, MongoSessionStore};
        use quizpin_back::dao::storage::StorageError;
        use quizpin_back::services::storage_supervisor;

        if let Ok(uri) = env::var("MONGO_URI") {
            let db_name = env::var("MONGO_DB").ok();
            let poll_interval = state.config().store_poll();
            info!("using MongoDB session store");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, db_name.as_deref(), poll_interval)
                        .await
                        .map_err(StorageError::from)?;
                    let store = MongoSessionStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok(Arc::new(store) as Arc<dyn SessionStore>)
                }
            }));
            return;
        }
    }

    info!("no MONGO_URI configured; using in-memory session store");
    let capacity = state.config().snapshot_capacity();
    state
        .install_session_store(Arc::new(MemorySessionStore::new(capacity)))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
