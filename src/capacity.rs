//! Global concurrent-user governor backed by `global/capacity`

use crate::config::GameConfig;
use crate::store::{DocumentStore, StoreEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct CapacityGovernor {
    store: Arc<dyn DocumentStore>,
    max_users: i64,
    warning_threshold: i64,
}

impl CapacityGovernor {
    pub fn new(store: Arc<dyn DocumentStore>, config: &GameConfig) -> Self {
        Self {
            store,
            max_users: config.max_concurrent_users,
            warning_threshold: config.capacity_warning_threshold(),
        }
    }

    /// Whether a new user may enter. Fails open when the store is unreachable.
    pub async fn check_capacity(&self) -> bool {
        match self.store.get_capacity().await {
            Ok(doc) => doc.active_users < self.max_users,
            Err(e) => {
                tracing::warn!("Capacity check failed, allowing user: {}", e);
                true
            }
        }
    }

    pub async fn active_user_count(&self) -> i64 {
        match self.store.get_capacity().await {
            Ok(doc) => doc.active_users,
            Err(e) => {
                tracing::warn!("Failed to read active user count: {}", e);
                0
            }
        }
    }

    pub async fn increment_users(&self) {
        if let Err(e) = self.store.increment_capacity(1).await {
            tracing::warn!("Failed to increment active users: {}", e);
        }
    }

    pub async fn decrement_users(&self) {
        if let Err(e) = self.store.increment_capacity(-1).await {
            tracing::warn!("Failed to decrement active users: {}", e);
        }
    }

    /// At or above 90% of the ceiling
    pub async fn is_approaching_capacity(&self) -> bool {
        self.active_user_count().await >= self.warning_threshold
    }

    pub fn is_at_capacity(&self, active_users: i64) -> bool {
        active_users >= self.max_users
    }

    /// Call `callback(active_users, at_capacity)` now and on every change.
    /// The subscription ends when the returned handle is dropped.
    pub fn subscribe_to_capacity<F>(&self, callback: F) -> CapacitySubscription
    where
        F: Fn(i64, bool) + Send + Sync + 'static,
    {
        let governor = self.clone();
        let mut rx = self.store.subscribe();

        let task = tokio::spawn(async move {
            let initial = governor.active_user_count().await;
            callback(initial, governor.is_at_capacity(initial));

            loop {
                match rx.recv().await {
                    Ok(StoreEvent::CapacityChanged { capacity }) => {
                        let count = capacity.active_users;
                        callback(count, governor.is_at_capacity(count));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Capacity subscriber lagged by {} events", skipped);
                        let count = governor.active_user_count().await;
                        callback(count, governor.is_at_capacity(count));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        CapacitySubscription { task }
    }
}

/// Live capacity subscription; dropping it unsubscribes
pub struct CapacitySubscription {
    task: JoinHandle<()>,
}

impl Drop for CapacitySubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
