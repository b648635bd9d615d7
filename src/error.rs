//! Error types for the game engine and the document store

use crate::types::GameMode;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    /// The document exists but the write would break a document invariant
    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection,
            id: id.into(),
        }
    }
}

/// Errors surfaced to the acting player
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Round not found")]
    RoundNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Game has already started")]
    GameInProgress,

    #[error("No more prompts available for {mode}")]
    PromptsExhausted { mode: GameMode },

    #[error("{0}")]
    ValidationFailed(String),

    /// Host-only action attempted by someone else. Only enforced by clients.
    #[error("Only the host can {0}")]
    PermissionImplicit(&'static str),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Need at least {needed} players to start (have {have})")]
    NotEnoughPlayers { needed: usize, have: usize },

    #[error("Server is at capacity, try again shortly")]
    AtCapacity,

    #[error("Drop It mode has already been used in this game")]
    DropItAlreadyUsed,

    #[error("Player is not in this room")]
    NotInRoom,

    #[error("Round is not accepting this action while {0}")]
    RoundClosed(&'static str),

    #[error("Failed to generate unique room code after {attempts} attempts")]
    CodeGenerationFailed { attempts: usize },
}

impl GameError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RoomNotFound => "ROOM_NOT_FOUND",
            GameError::RoundNotFound => "ROUND_NOT_FOUND",
            GameError::RoomFull => "ROOM_FULL",
            GameError::GameInProgress => "GAME_IN_PROGRESS",
            GameError::PromptsExhausted { .. } => "PROMPTS_EXHAUSTED",
            GameError::ValidationFailed(_) => "VALIDATION_FAILED",
            GameError::PermissionImplicit(_) => "PERMISSION_IMPLICIT",
            GameError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            GameError::NotEnoughPlayers { .. } => "NOT_ENOUGH_PLAYERS",
            GameError::AtCapacity => "AT_CAPACITY",
            GameError::DropItAlreadyUsed => "DROP_IT_ALREADY_USED",
            GameError::NotInRoom => "NOT_IN_ROOM",
            GameError::RoundClosed(_) => "ROUND_CLOSED",
            GameError::CodeGenerationFailed { .. } => "CODE_GENERATION_FAILED",
        }
    }

    /// Whether the UI should offer a retry that keeps the player's input
    pub fn is_retryable(&self) -> bool {
        matches!(self, GameError::StoreUnavailable(_) | GameError::AtCapacity)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GameError::ValidationFailed(msg.into())
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                collection: "rooms", ..
            } => GameError::RoomNotFound,
            StoreError::NotFound {
                collection: "rounds",
                ..
            } => GameError::RoundNotFound,
            StoreError::NotFound { collection, id } => {
                GameError::StoreUnavailable(format!("{collection}/{id} missing"))
            }
            StoreError::Unavailable(msg) => GameError::StoreUnavailable(msg),
            StoreError::Rejected(msg) => GameError::ValidationFailed(msg),
            StoreError::Serialization(e) => GameError::StoreUnavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: GameError = StoreError::not_found("rooms", "ABCDEF").into();
        assert!(matches!(err, GameError::RoomNotFound));

        let err: GameError = StoreError::not_found("rounds", "01H").into();
        assert!(matches!(err, GameError::RoundNotFound));

        let err: GameError = StoreError::Unavailable("offline".to_string()).into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = GameError::validation("Maximum 60 characters");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Maximum 60 characters");
    }
}
