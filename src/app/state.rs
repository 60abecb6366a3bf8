//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::SessionRegistry;
use crate::history::{History, LocalHistory, RelayError, RemoteHistoryClient};
use crate::store::{SessionStore, StoreError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session_store: SessionStore,
    pub local_history: Arc<LocalHistory>,
    pub remote_history: Option<RemoteHistoryClient>,
    pub session_registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StateError> {
        let session_store = SessionStore::open(&config.database_path)?;
        Self::with_store(config, session_store)
    }

    /// State over an already opened store
    pub fn with_store(config: Config, session_store: SessionStore) -> Result<Self, StateError> {
        let config = Arc::new(config);

        let local_history = Arc::new(LocalHistory::new(config.history_dir.clone()));

        let remote_history = config
            .remote_history_url
            .as_deref()
            .map(RemoteHistoryClient::new)
            .transpose()?;

        Ok(Self {
            config,
            session_store,
            local_history,
            remote_history,
            session_registry: Arc::new(SessionRegistry::new()),
        })
    }

    /// Fresh history for one connection; the player binding is per connection
    pub fn history_for_connection(&self) -> Arc<History> {
        Arc::new(History::new(
            self.local_history.clone(),
            self.remote_history.clone(),
        ))
    }
}

/// Startup errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}
