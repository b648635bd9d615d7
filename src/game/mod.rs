//! Round lifecycle and scoring engine.
//!
//! Every operation reads the shared documents, validates locally and writes
//! single-document atomic updates. Nothing here holds a lock across clients:
//! duplicate transition attempts converge through set-once claims, set-union
//! membership and idempotent score commits.

mod guess;
mod report;
mod room;
mod round;
mod score;
mod submission;
mod summary;

pub use round::{display_order, Advance};
pub use score::{calculate_round_scores, leaderboard, LeaderboardEntry, ResultsOutcome};
pub use submission::{
    all_submitted, waiting_player_count, Answer, SubmitOutcome, SKIP_ANSWER, TIMEOUT_ANSWER,
};
pub use guess::{all_guesses_locked, guessable_owners, waiting_guess_count};
pub use summary::{summarize, GameSummary};

use crate::capacity::CapacityGovernor;
use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::moderation::{AllowAll, TextClassifier};
use crate::store::{DocumentStore, RoomUpdate};
use crate::types::*;
use std::sync::Arc;

/// Game operations as performed by one client
#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn DocumentStore>,
    config: Arc<GameConfig>,
    classifier: Arc<dyn TextClassifier>,
    capacity: CapacityGovernor,
}

impl GameService {
    pub fn new(store: Arc<dyn DocumentStore>, config: GameConfig) -> Self {
        let capacity = CapacityGovernor::new(store.clone(), &config);
        Self {
            store,
            config: Arc::new(config),
            classifier: Arc::new(AllowAll),
            capacity,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TextClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn capacity(&self) -> &CapacityGovernor {
        &self.capacity
    }

    pub fn now(&self) -> Timestamp {
        self.store.now()
    }

    async fn load_room(&self, code: &RoomCode) -> GameResult<Room> {
        self.store
            .get_room(code)
            .await?
            .ok_or(GameError::RoomNotFound)
    }

    async fn load_round(&self, code: &RoomCode, round_id: &str) -> GameResult<Round> {
        self.store
            .get_round(code, round_id)
            .await?
            .ok_or(GameError::RoundNotFound)
    }

    async fn load_member_round(
        &self,
        code: &RoomCode,
        round_id: &str,
        player: &str,
    ) -> GameResult<(Room, Round)> {
        let room = self.load_room(code).await?;
        if !room.is_member(player) {
            return Err(GameError::NotInRoom);
        }
        let round = self.load_round(code, round_id).await?;
        Ok((room, round))
    }

    /// Refresh `lastActivity`; failures are logged and swallowed
    pub async fn touch_activity(&self, code: &RoomCode) {
        if let Err(e) = self.store.update_room(code, vec![RoomUpdate::Touch]).await {
            tracing::warn!("Failed to refresh activity for room {}: {}", code, e);
        }
    }
}

/// Human label for a phase, used in `RoundClosed`
pub(crate) fn phase_label(phase: RoundPhase) -> &'static str {
    match phase {
        RoundPhase::Submitting => "collecting answers",
        RoundPhase::Guessing => "guessing",
        RoundPhase::Results => "showing results",
        RoundPhase::Finished => "finished",
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    pub struct Fixture {
        pub clock: Arc<ManualClock>,
        pub store: Arc<MemoryStore>,
        pub game: GameService,
    }

    pub fn fixture() -> Fixture {
        fixture_with(GameConfig::default())
    }

    pub fn fixture_with(config: GameConfig) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let game = GameService::new(store.clone(), config);
        Fixture { clock, store, game }
    }

    /// Room hosted by "host" with the given extra players joined
    pub async fn room_with(game: &GameService, others: &[&str]) -> Room {
        let room = game.create_room("host", "Host").await.unwrap();
        for (i, player) in others.iter().enumerate() {
            game.join_room(room.code.as_str(), player, &format!("Player{i}"))
                .await
                .unwrap();
        }
        game.get_room(&room.code).await.unwrap()
    }

    /// Started game with everyone's guesses revealed and open
    pub async fn guessing_round(game: &GameService, others: &[&str]) -> (Room, Round) {
        let room = room_with(game, others).await;
        let round = game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();
        let room = game.get_room(&room.code).await.unwrap();
        for player in &room.players {
            game.submit_answer(
                &room.code,
                &round.id,
                player,
                Answer::Text(format!("answer from {player}")),
            )
            .await
            .unwrap();
        }
        game.reveal_answers(&room.code, &round.id).await.unwrap();
        let round = game.get_round(&room.code, &round.id).await.unwrap();
        (room, round)
    }
}
