use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque ID types
pub type PlayerId = String;
pub type RoundId = String;
pub type ReportId = String;

/// Server-assigned store time
pub type Timestamp = DateTime<Utc>;

/// Player id → cumulative (or per-round) correct guesses
pub type PlayerScores = HashMap<PlayerId, u32>;

/// Emoji → count
pub type ReactionCounts = HashMap<String, u32>;

pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Six uppercase ASCII letters identifying a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Parse user input; lowercase letters are accepted and uppercased
    pub fn parse(value: &str) -> Result<Self, RoomCodeError> {
        let value = value.trim().to_ascii_uppercase();
        let found = value.chars().count();
        if found != ROOM_CODE_LEN {
            return Err(RoomCodeError::InvalidLength { found });
        }
        if let Some((index, ch)) = value
            .chars()
            .enumerate()
            .find(|(_, ch)| !ch.is_ascii_uppercase())
        {
            return Err(RoomCodeError::InvalidCharacter { ch, index });
        }
        Ok(Self(value))
    }

    /// Draw a random code (no collision check)
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomCodeError {
    #[error("room code must be 6 letters, got {found}")]
    InvalidLength { found: usize },
    #[error("invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Finish the sentence (short text)
    Sentence,
    /// Drop It (image), usable once per game
    Drop,
    /// No Context (single word or emoji)
    Context,
}

impl GameMode {
    pub const ALL: [GameMode; 3] = [GameMode::Sentence, GameMode::Drop, GameMode::Context];

    /// Modes that may only be played once per game
    pub fn is_single_use(self) -> bool {
        matches!(self, GameMode::Drop)
    }

    pub fn is_image(self) -> bool {
        matches!(self, GameMode::Drop)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Sentence => "sentence",
            GameMode::Drop => "drop",
            GameMode::Context => "context",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Ended,
}

/// Room document: `rooms/{code}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: RoomCode,
    pub host_id: PlayerId,
    pub players: Vec<PlayerId>,
    #[serde(default)]
    pub player_names: HashMap<PlayerId, String>,
    pub max_players: usize,
    pub min_players: usize,
    pub status: RoomStatus,
    pub current_mode: Option<GameMode>,
    pub current_round: u32,
    pub has_used_drop_it: bool,
    #[serde(default)]
    pub scores: PlayerScores,
    /// Rounds whose deltas are already in `scores`
    #[serde(default)]
    pub scored_rounds: Vec<RoundId>,
    pub created_at: Timestamp,
    pub last_activity: Timestamp,
}

impl Room {
    pub fn is_member(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p == player_id)
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host_id == player_id
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn has_enough_players(&self) -> bool {
        self.players.len() >= self.min_players
    }

    /// Display name, falling back to "Player N" by join order
    pub fn display_name(&self, player_id: &str) -> String {
        if let Some(name) = self.player_names.get(player_id) {
            return name.clone();
        }
        match self.players.iter().position(|p| p == player_id) {
            Some(index) => format!("Player {}", index + 1),
            None => "Unknown player".to_string(),
        }
    }

    pub fn score_of(&self, player_id: &str) -> u32 {
        self.scores.get(player_id).copied().unwrap_or(0)
    }

    pub fn is_round_scored(&self, round_id: &str) -> bool {
        self.scored_rounds.iter().any(|r| r == round_id)
    }
}

/// One player's answer in a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Text, or the uploaded image URL
    pub content: String,
    pub is_image: bool,
    pub submitted_at: Timestamp,
    /// Set by the auto-hide job once enough players reported it
    #[serde(default)]
    pub hidden: bool,
    /// Image content removed by the cleanup job
    #[serde(default)]
    pub purged: bool,
}

/// Where a round is in its lifecycle, derived from its sentinel timestamps
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Submitting,
    Guessing,
    Results,
    /// The game moved past this round
    Finished,
}

/// Round document: `rooms/{code}/rounds/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: RoundId,
    pub prompt_index: usize,
    pub mode: GameMode,
    #[serde(default)]
    pub submissions: HashMap<PlayerId, Submission>,
    /// Submission owner → emoji counts
    #[serde(default)]
    pub reactions: HashMap<PlayerId, ReactionCounts>,
    /// Guesser → (submission owner → guessed player)
    #[serde(default)]
    pub guesses: HashMap<PlayerId, HashMap<PlayerId, PlayerId>>,
    #[serde(default)]
    pub guesses_locked_by: Vec<PlayerId>,
    pub created_at: Timestamp,
    pub revealed_at: Option<Timestamp>,
    pub results_started_at: Option<Timestamp>,
    #[serde(default)]
    pub advanced_at: Option<Timestamp>,
}

impl Round {
    pub fn phase(&self) -> RoundPhase {
        if self.advanced_at.is_some() {
            RoundPhase::Finished
        } else if self.results_started_at.is_some() {
            RoundPhase::Results
        } else if self.revealed_at.is_some() {
            RoundPhase::Guessing
        } else {
            RoundPhase::Submitting
        }
    }

    pub fn has_submitted(&self, player_id: &str) -> bool {
        self.submissions.contains_key(player_id)
    }

    pub fn has_locked(&self, player_id: &str) -> bool {
        self.guesses_locked_by.iter().any(|p| p == player_id)
    }

    /// Guesses made by one player (owner → guessed)
    pub fn guesses_of(&self, player_id: &str) -> Option<&HashMap<PlayerId, PlayerId>> {
        self.guesses.get(player_id)
    }

    pub fn reactions_for(&self, owner: &str) -> Option<&ReactionCounts> {
        self.reactions.get(owner)
    }
}

/// Fields of a round the creator supplies; the store fills in id and timestamps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewRound {
    pub prompt_index: usize,
    pub mode: GameMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Inappropriate,
    Harassment,
    Spam,
    OffensiveLanguage,
    Other,
}

/// Report document: `reports/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub room_code: RoomCode,
    pub round_id: RoundId,
    /// Owner of the reported submission
    pub submission_owner: PlayerId,
    pub reported_by: PlayerId,
    pub reason: ReportReason,
    pub reported_at: Timestamp,
    /// Snapshot of the reported content
    pub content: String,
    pub report_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub room_code: RoomCode,
    pub round_id: RoundId,
    pub submission_owner: PlayerId,
    pub reported_by: PlayerId,
    pub reason: ReportReason,
    pub content: String,
}

/// Capacity document: `global/capacity`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalCapacity {
    pub active_users: i64,
    pub last_updated: Timestamp,
}

/// Emojis offered for reactions
pub const REACTION_EMOJIS: &[&str] = &["😭", "👀", "😬", "🤯", "😂"];
