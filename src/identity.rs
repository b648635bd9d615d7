//! Pseudonymous player identity.
//!
//! A player is an `anon_` id generated once per device plus a chosen display
//! name. When the backing storage fails the player still gets a `temp_` id that
//! lives only as long as the provider.

use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::types::PlayerId;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const ID_SUFFIX_LEN: usize = 16;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable id for this device; never fails
    async fn anonymous_id(&self) -> PlayerId;

    async fn player_name(&self) -> Option<String>;

    /// Validate and remember a display name, returning the trimmed name
    async fn set_player_name(&self, name: &str) -> GameResult<String>;
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

pub fn generate_anonymous_id() -> PlayerId {
    format!("anon_{}", random_suffix())
}

pub fn generate_session_id() -> PlayerId {
    format!("temp_{}", random_suffix())
}

/// Whether `id` only lives for the current session
pub fn is_session_only(id: &str) -> bool {
    id.starts_with("temp_")
}

/// Trim and length-check a display name
pub fn validate_display_name(name: &str, config: &GameConfig) -> GameResult<String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(GameError::validation("Please enter your name to continue"));
    }
    if len < config.display_name_min_chars {
        return Err(GameError::validation(format!(
            "Please enter at least {} characters",
            config.display_name_min_chars
        )));
    }
    if len > config.display_name_max_chars {
        return Err(GameError::validation(format!(
            "Please keep your name under {} characters",
            config.display_name_max_chars
        )));
    }
    Ok(trimmed.to_string())
}

/// Random two-word name offered before the player picks one
pub fn suggested_name() -> String {
    petname::petname(2, " ")
        .map(|name| {
            name.split(' ')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|name| name.chars().count() <= 15)
        .unwrap_or_else(|| "Mystery Guest".to_string())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRecord {
    anonymous_id: Option<PlayerId>,
    player_name: Option<String>,
}

/// Identity persisted as a small JSON file
pub struct FileIdentityStore {
    path: PathBuf,
    config: GameConfig,
    record: Mutex<Option<IdentityRecord>>,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>, config: GameConfig) -> Self {
        Self {
            path: path.into(),
            config,
            record: Mutex::new(None),
        }
    }

    async fn load(&self) -> IdentityRecord {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt identity file {:?}: {}", self.path, e);
                IdentityRecord::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IdentityRecord::default(),
            Err(e) => {
                tracing::warn!("Failed to read identity file {:?}: {}", self.path, e);
                IdentityRecord::default()
            }
        }
    }

    async fn persist(&self, record: &IdentityRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, raw).await
    }

    /// Forget the stored id and name
    pub async fn clear(&self) {
        *self.record.lock().await = Some(IdentityRecord::default());
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to clear identity file {:?}: {}", self.path, e);
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for FileIdentityStore {
    async fn anonymous_id(&self) -> PlayerId {
        let mut guard = self.record.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let record = guard.get_or_insert_with(IdentityRecord::default);
        if let Some(id) = &record.anonymous_id {
            return id.clone();
        }

        let mut updated = record.clone();
        updated.anonymous_id = Some(generate_anonymous_id());
        let id = match self.persist(&updated).await {
            Ok(()) => updated.anonymous_id.clone().unwrap_or_else(generate_session_id),
            Err(e) => {
                tracing::warn!("Failed to persist identity, using session id: {}", e);
                generate_session_id()
            }
        };
        record.anonymous_id = Some(id.clone());
        id
    }

    async fn player_name(&self) -> Option<String> {
        let mut guard = self.record.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        guard.as_ref().and_then(|r| r.player_name.clone())
    }

    async fn set_player_name(&self, name: &str) -> GameResult<String> {
        let name = validate_display_name(name, &self.config)?;

        let mut guard = self.record.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let record = guard.get_or_insert_with(IdentityRecord::default);
        record.player_name = Some(name.clone());

        let mut on_disk = record.clone();
        // Session ids are never written out
        if on_disk
            .anonymous_id
            .as_deref()
            .is_some_and(is_session_only)
        {
            on_disk.anonymous_id = None;
        }
        if let Err(e) = self.persist(&on_disk).await {
            tracing::warn!("Failed to persist player name: {}", e);
        }
        Ok(name)
    }
}

/// Identity kept only in memory
pub struct MemoryIdentity {
    id: PlayerId,
    config: GameConfig,
    name: Mutex<Option<String>>,
}

impl MemoryIdentity {
    pub fn new(config: GameConfig) -> Self {
        Self::with_id(generate_anonymous_id(), config)
    }

    pub fn with_id(id: impl Into<PlayerId>, config: GameConfig) -> Self {
        Self {
            id: id.into(),
            config,
            name: Mutex::new(None),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn anonymous_id(&self) -> PlayerId {
        self.id.clone()
    }

    async fn player_name(&self) -> Option<String> {
        self.name.lock().await.clone()
    }

    async fn set_player_name(&self, name: &str) -> GameResult<String> {
        let name = validate_display_name(name, &self.config)?;
        *self.name.lock().await = Some(name.clone());
        Ok(name)
    }
}
