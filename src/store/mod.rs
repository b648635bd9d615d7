//! Shared document store.
//!
//! Every client coordinates through this store. It offers only single-document
//! atomic operations: a batch of updates to one document applies all-or-nothing,
//! terminal timestamps are claimed with a compare-and-set on a still-null field,
//! and every committed write is published on the change feed.

mod memory;

pub use memory::MemoryStore;

use crate::error::{StoreError, StoreResult};
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Change feed capacity per subscriber before it starts lagging
pub const EVENT_BUFFER: usize = 256;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current store time
    fn now(&self) -> Timestamp;

    async fn get_room(&self, code: &RoomCode) -> StoreResult<Option<Room>>;

    /// Set-if-absent; returns false when the code is already taken
    async fn create_room(&self, room: Room) -> StoreResult<bool>;

    /// Apply a batch atomically and return the committed document
    async fn update_room(&self, code: &RoomCode, updates: Vec<RoomUpdate>) -> StoreResult<Room>;

    /// Delete a room together with its rounds
    async fn delete_room(&self, code: &RoomCode) -> StoreResult<()>;

    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;

    /// Create a round with a store-assigned id and `createdAt`
    async fn add_round(&self, code: &RoomCode, round: NewRound) -> StoreResult<Round>;

    async fn get_round(&self, code: &RoomCode, round_id: &str) -> StoreResult<Option<Round>>;

    /// All rounds of a room in creation order
    async fn list_rounds(&self, code: &RoomCode) -> StoreResult<Vec<Round>>;

    async fn update_round(
        &self,
        code: &RoomCode,
        round_id: &str,
        updates: Vec<RoundUpdate>,
    ) -> StoreResult<Round>;

    /// Compare-and-set a still-null sentinel timestamp to store time
    async fn claim_round_marker(
        &self,
        code: &RoomCode,
        round_id: &str,
        marker: RoundMarker,
    ) -> StoreResult<Claim>;

    async fn delete_round(&self, code: &RoomCode, round_id: &str) -> StoreResult<()>;

    /// Append-only
    async fn add_report(&self, report: NewReport) -> StoreResult<Report>;

    async fn list_reports(&self) -> StoreResult<Vec<Report>>;

    /// Capacity document, zero when it was never written
    async fn get_capacity(&self) -> StoreResult<GlobalCapacity>;

    /// Additive increment, creating the document when absent
    async fn increment_capacity(&self, delta: i64) -> StoreResult<GlobalCapacity>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Field-level writes to a room document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RoomUpdate {
    /// Precondition: reject the whole batch unless the room has this status
    ExpectStatus { status: RoomStatus },
    SetStatus { status: RoomStatus },
    SetHost { player: PlayerId },
    /// Set-union; rejected when the room is full and the player is new
    AddPlayer {
        player: PlayerId,
        name: Option<String>,
    },
    RemovePlayer { player: PlayerId },
    /// Move to `ended` once nobody is left
    EndIfEmpty,
    /// Hand the host role to the first member when the host is gone
    ReassignHostIfMissing,
    SetPlayerName { player: PlayerId, name: String },
    SetMode { mode: Option<GameMode> },
    /// Raise the round counter, never lowering it
    AdvanceRound { round: u32 },
    /// Zero the round counter and forget which rounds were scored
    ResetRound,
    MarkDropItUsed,
    ClearDropIt,
    IncrementScore { player: PlayerId, delta: u32 },
    /// Add a round's deltas unless that round was already scored
    ApplyRoundScores {
        round_id: RoundId,
        scores: PlayerScores,
    },
    ClearScores,
    Touch,
}

impl RoomUpdate {
    pub fn apply(&self, room: &mut Room, now: Timestamp) -> StoreResult<()> {
        match self {
            RoomUpdate::ExpectStatus { status } => {
                if room.status != *status {
                    return Err(StoreError::Rejected(format!(
                        "room {} is {:?}, expected {:?}",
                        room.code, room.status, status
                    )));
                }
            }
            RoomUpdate::SetStatus { status } => room.status = *status,
            RoomUpdate::SetHost { player } => room.host_id = player.clone(),
            RoomUpdate::AddPlayer { player, name } => {
                if !room.is_member(player) {
                    if room.is_full() {
                        return Err(StoreError::Rejected(format!("room {} is full", room.code)));
                    }
                    room.players.push(player.clone());
                }
                if let Some(name) = name {
                    room.player_names.insert(player.clone(), name.clone());
                }
            }
            RoomUpdate::RemovePlayer { player } => {
                room.players.retain(|p| p != player);
                room.player_names.remove(player);
            }
            RoomUpdate::EndIfEmpty => {
                if room.players.is_empty() {
                    room.status = RoomStatus::Ended;
                }
            }
            RoomUpdate::ReassignHostIfMissing => {
                if !room.is_member(&room.host_id) {
                    if let Some(first) = room.players.first() {
                        room.host_id = first.clone();
                    }
                }
            }
            RoomUpdate::SetPlayerName { player, name } => {
                room.player_names.insert(player.clone(), name.clone());
            }
            RoomUpdate::SetMode { mode } => room.current_mode = *mode,
            RoomUpdate::AdvanceRound { round } => {
                room.current_round = room.current_round.max(*round);
            }
            RoomUpdate::ResetRound => {
                room.current_round = 0;
                room.scored_rounds.clear();
            }
            RoomUpdate::MarkDropItUsed => room.has_used_drop_it = true,
            RoomUpdate::ClearDropIt => room.has_used_drop_it = false,
            RoomUpdate::IncrementScore { player, delta } => {
                let score = room.scores.entry(player.clone()).or_insert(0);
                *score = score.saturating_add(*delta);
            }
            RoomUpdate::ApplyRoundScores { round_id, scores } => {
                if !room.is_round_scored(round_id) {
                    for (player, delta) in scores {
                        let score = room.scores.entry(player.clone()).or_insert(0);
                        *score = score.saturating_add(*delta);
                    }
                    room.scored_rounds.push(round_id.clone());
                }
            }
            RoomUpdate::ClearScores => room.scores.clear(),
            RoomUpdate::Touch => room.last_activity = now,
        }
        Ok(())
    }
}

/// Field-level writes to a round document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RoundUpdate {
    /// Last write wins; the store stamps `submittedAt`
    PutSubmission {
        player: PlayerId,
        content: String,
        is_image: bool,
    },
    IncrementReaction { owner: PlayerId, emoji: String },
    PutGuess {
        guesser: PlayerId,
        owner: PlayerId,
        guessed: PlayerId,
    },
    /// Set-union
    LockGuesses { player: PlayerId },
    HideSubmission { owner: PlayerId },
    /// Drop image content from every image submission
    PurgeImages,
}

impl RoundUpdate {
    pub fn apply(&self, round: &mut Round, now: Timestamp) -> StoreResult<()> {
        match self {
            RoundUpdate::PutSubmission {
                player,
                content,
                is_image,
            } => {
                if round.revealed_at.is_some() {
                    return Err(StoreError::Rejected(format!(
                        "round {} is revealed, submissions are closed",
                        round.id
                    )));
                }
                round.submissions.insert(
                    player.clone(),
                    Submission {
                        content: content.clone(),
                        is_image: *is_image,
                        submitted_at: now,
                        hidden: false,
                        purged: false,
                    },
                );
            }
            RoundUpdate::IncrementReaction { owner, emoji } => {
                *round
                    .reactions
                    .entry(owner.clone())
                    .or_default()
                    .entry(emoji.clone())
                    .or_insert(0) += 1;
            }
            RoundUpdate::PutGuess {
                guesser,
                owner,
                guessed,
            } => {
                if guesser == owner {
                    return Err(StoreError::Rejected("self-guess".to_string()));
                }
                if round.results_started_at.is_some() {
                    return Err(StoreError::Rejected("guessing is over".to_string()));
                }
                if round.has_locked(guesser) {
                    return Err(StoreError::Rejected(format!(
                        "{guesser} already locked their guesses"
                    )));
                }
                round
                    .guesses
                    .entry(guesser.clone())
                    .or_default()
                    .insert(owner.clone(), guessed.clone());
            }
            RoundUpdate::LockGuesses { player } => {
                if !round.has_locked(player) {
                    round.guesses_locked_by.push(player.clone());
                }
            }
            RoundUpdate::HideSubmission { owner } => {
                if let Some(submission) = round.submissions.get_mut(owner) {
                    submission.hidden = true;
                }
            }
            RoundUpdate::PurgeImages => {
                for submission in round.submissions.values_mut() {
                    if submission.is_image && !submission.purged {
                        submission.content.clear();
                        submission.purged = true;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Set-once sentinel timestamps on a round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoundMarker {
    Revealed,
    ResultsStarted,
    Advanced,
}

impl RoundMarker {
    pub fn get(self, round: &Round) -> Option<Timestamp> {
        match self {
            RoundMarker::Revealed => round.revealed_at,
            RoundMarker::ResultsStarted => round.results_started_at,
            RoundMarker::Advanced => round.advanced_at,
        }
    }

    /// Marker that must already be set before this one may be claimed
    pub fn requires(self) -> Option<RoundMarker> {
        match self {
            RoundMarker::Revealed => None,
            RoundMarker::ResultsStarted => Some(RoundMarker::Revealed),
            RoundMarker::Advanced => Some(RoundMarker::ResultsStarted),
        }
    }

    /// Compare-and-set against an in-memory document
    pub fn claim(self, round: &mut Round, now: Timestamp) -> StoreResult<Claim> {
        if let Some(existing) = self.get(round) {
            return Ok(Claim::Lost(existing));
        }
        if let Some(required) = self.requires() {
            if required.get(round).is_none() {
                return Err(StoreError::Rejected(format!(
                    "cannot claim {self:?} before {required:?}"
                )));
            }
        }
        let slot = match self {
            RoundMarker::Revealed => &mut round.revealed_at,
            RoundMarker::ResultsStarted => &mut round.results_started_at,
            RoundMarker::Advanced => &mut round.advanced_at,
        };
        *slot = Some(now);
        Ok(Claim::Won(now))
    }
}

/// Outcome of a compare-and-set claim
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "at", rename_all = "snake_case")]
pub enum Claim {
    /// This caller set the marker
    Won(Timestamp),
    /// Someone else got there first; carries their timestamp
    Lost(Timestamp),
}

impl Claim {
    pub fn is_won(&self) -> bool {
        matches!(self, Claim::Won(_))
    }

    /// The authoritative timestamp, whoever set it
    pub fn at(&self) -> Timestamp {
        match self {
            Claim::Won(at) | Claim::Lost(at) => *at,
        }
    }
}

/// Change notification published after every committed write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    RoomChanged { room: Room },
    RoomDeleted { code: RoomCode },
    RoundChanged { code: RoomCode, round: Round },
    RoundDeleted { code: RoomCode, round_id: RoundId },
    ReportAdded { report: Report },
    CapacityChanged { capacity: GlobalCapacity },
}

impl StoreEvent {
    /// Room the event belongs to, if any
    pub fn room_code(&self) -> Option<&RoomCode> {
        match self {
            StoreEvent::RoomChanged { room } => Some(&room.code),
            StoreEvent::RoomDeleted { code }
            | StoreEvent::RoundChanged { code, .. }
            | StoreEvent::RoundDeleted { code, .. } => Some(code),
            StoreEvent::ReportAdded { report } => Some(&report.room_code),
            StoreEvent::CapacityChanged { .. } => None,
        }
    }
}
