use crate::abuse::AbuseConfig;
use crate::auth::AuthConfig;
use crate::config::GameConfig;
use crate::store::{DocumentStore, MemoryStore};
use std::sync::Arc;

/// Shared state of the store host
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<GameConfig>,
    pub auth: Arc<AuthConfig>,
    pub abuse: Arc<AbuseConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: GameConfig,
        auth: AuthConfig,
        abuse: AbuseConfig,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            auth: Arc::new(auth),
            abuse: Arc::new(abuse),
        }
    }

    /// In-memory store with auth and abuse protection disabled
    pub fn in_memory(config: GameConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            config,
            AuthConfig::disabled(),
            AbuseConfig::disabled(),
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(GameConfig::default())
    }
}
