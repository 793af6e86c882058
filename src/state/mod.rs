pub mod coordinator;
pub mod flow;
pub mod leaderboard;
pub mod scoring;
pub mod session;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::config::AppConfig;
use crate::dao::session_store::SessionStore;
use crate::error::ServiceError;
use crate::state::coordinator::SessionCoordinator;

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing the installed store backend and the
/// per-session coordinators.
pub struct AppState {
    config: AppConfig,
    store: RwLock<Option<Arc<dyn SessionStore>>>,
    coordinators: DashMap<String, SessionCoordinator>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            store: RwLock::new(None),
            coordinators: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the session store or fail with a degraded-mode error.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag.
    pub async fn update_degraded(&self, value: bool) {
        let _ = self.degraded.send_replace(value);
    }

    /// Register the coordinator of a freshly created session.
    pub fn register_coordinator(&self, coordinator: SessionCoordinator) {
        self.coordinators
            .insert(coordinator.pin().to_owned(), coordinator);
    }

    /// Look up the coordinator running a session.
    pub fn coordinator(&self, pin: &str) -> Result<SessionCoordinator, ServiceError> {
        self.coordinators
            .get(pin)
            .map(|entry| entry.clone())
            .ok_or_else(|| ServiceError::NotFound(format!("session `{pin}` not found")))
    }

    /// Whether a PIN currently has a live coordinator.
    pub fn pin_in_use(&self, pin: &str) -> bool {
        self.coordinators.contains_key(pin)
    }

    /// Remove a session's coordinator and cancel its tasks.
    pub fn remove_coordinator(&self, pin: &str) -> Option<SessionCoordinator> {
        let (_, coordinator) = self.coordinators.remove(pin)?;
        coordinator.cleanup();
        Some(coordinator)
    }
}
