use super::{phase_label, GameService};
use crate::catalog;
use crate::error::{GameError, GameResult};
use crate::store::{Claim, RoomUpdate, RoundMarker};
use crate::types::*;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Outcome of moving the game past a finished results phase
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    NextRound {
        round: Round,
        /// An interstitial is due before this round
        show_interstitial: bool,
    },
    GameEnded,
    /// Another client already moved the game on
    AlreadyAdvanced,
}

impl GameService {
    /// Prompt indexes already played in `mode` during the current game
    pub async fn used_prompt_indexes(
        &self,
        code: &RoomCode,
        mode: GameMode,
    ) -> GameResult<HashSet<usize>> {
        Ok(self
            .store
            .list_rounds(code)
            .await?
            .iter()
            .filter(|r| r.mode == mode)
            .map(|r| r.prompt_index)
            .collect())
    }

    /// Open a new round in `mode` bound to an unused prompt
    pub async fn create_round(&self, code: &RoomCode, mode: GameMode) -> GameResult<Round> {
        let room = self.load_room(code).await?;
        let used = self.used_prompt_indexes(code, mode).await?;
        self.open_round(&room, mode, &used).await
    }

    pub(super) async fn open_round(
        &self,
        room: &Room,
        mode: GameMode,
        used: &HashSet<usize>,
    ) -> GameResult<Round> {
        if mode.is_single_use() && room.has_used_drop_it {
            return Err(GameError::DropItAlreadyUsed);
        }
        let prompt_index =
            catalog::unused_prompt_index(mode, used).ok_or(GameError::PromptsExhausted { mode })?;

        let round = self
            .store
            .add_round(&room.code, NewRound { prompt_index, mode })
            .await?;
        let number =
            u32::try_from(self.store.list_rounds(&room.code).await?.len()).unwrap_or(u32::MAX);

        let mut updates = vec![
            RoomUpdate::AdvanceRound { round: number },
            RoomUpdate::SetMode { mode: Some(mode) },
        ];
        if mode.is_single_use() {
            updates.push(RoomUpdate::MarkDropItUsed);
        }
        updates.push(RoomUpdate::Touch);
        self.store.update_room(&room.code, updates).await?;

        tracing::info!(
            "Round {} ({}) opened in room {} with prompt {}",
            number,
            round.id,
            room.code,
            prompt_index
        );
        Ok(round)
    }

    /// Most recently created round, if the game has one
    pub async fn current_round(&self, code: &RoomCode) -> GameResult<Option<Round>> {
        Ok(self.store.list_rounds(code).await?.pop())
    }

    pub async fn get_round(&self, code: &RoomCode, round_id: &str) -> GameResult<Round> {
        self.load_round(code, round_id).await
    }

    pub async fn list_rounds(&self, code: &RoomCode) -> GameResult<Vec<Round>> {
        Ok(self.store.list_rounds(code).await?)
    }

    /// Reveal the answers; the first caller fixes `revealedAt`
    pub async fn reveal_answers(&self, code: &RoomCode, round_id: &str) -> GameResult<Claim> {
        let claim = self
            .store
            .claim_round_marker(code, round_id, RoundMarker::Revealed)
            .await?;
        match claim {
            Claim::Won(at) => {
                tracing::info!("Round {} in room {} revealed at {}", round_id, code, at);
                self.touch_activity(code).await;
            }
            Claim::Lost(at) => {
                tracing::debug!("Round {} was already revealed at {}", round_id, at);
            }
        }
        Ok(claim)
    }

    /// Move past the results of `from_round_id`: next round in the same mode,
    /// or the end of the game once that mode has no prompts left
    pub async fn advance(&self, code: &RoomCode, from_round_id: &str) -> GameResult<Advance> {
        let room = self.load_room(code).await?;
        let round = self.load_round(code, from_round_id).await?;
        if round.results_started_at.is_none() {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }
        if room.status != RoomStatus::Playing {
            return Ok(Advance::GameEnded);
        }

        let rounds = self.store.list_rounds(code).await?;
        if rounds.last().map(|r| r.id.as_str()) != Some(from_round_id) {
            return Ok(Advance::AlreadyAdvanced);
        }

        match self
            .store
            .claim_round_marker(code, from_round_id, RoundMarker::Advanced)
            .await?
        {
            Claim::Won(_) => {}
            Claim::Lost(at) => {
                let waited = self.now() - at;
                if waited.to_std().unwrap_or_default() < self.config.fallback_margin {
                    tracing::debug!("Round {} already being advanced", from_round_id);
                    return Ok(Advance::AlreadyAdvanced);
                }
                // The claimant never produced a successor
                tracing::warn!(
                    "Round {} advanced at {} without a successor, taking over",
                    from_round_id,
                    at
                );
            }
        }

        if round.mode.is_single_use() {
            tracing::info!("Single-use mode finished in room {}, ending game", code);
            self.end_game(code).await?;
            return Ok(Advance::GameEnded);
        }

        let used: HashSet<usize> = rounds
            .iter()
            .filter(|r| r.mode == round.mode)
            .map(|r| r.prompt_index)
            .collect();

        let played = u32::try_from(rounds.len()).unwrap_or(u32::MAX);
        match self.open_round(&room, round.mode, &used).await {
            Ok(next) => Ok(Advance::NextRound {
                round: next,
                show_interstitial: self.config.interstitial_due(played),
            }),
            Err(GameError::PromptsExhausted { mode }) => {
                tracing::info!("No {} prompts left in room {}, ending game", mode, code);
                self.end_game(code).await?;
                Ok(Advance::GameEnded)
            }
            Err(e) => Err(e),
        }
    }
}

/// Display order of a round's submissions, identical on every client
pub fn display_order(round: &Round) -> Vec<PlayerId> {
    let mut keyed: Vec<(Vec<u8>, &PlayerId)> = round
        .submissions
        .keys()
        .map(|player| {
            let digest = Sha256::digest(format!("{}-{}", round.id, player).as_bytes());
            (digest.to_vec(), player)
        })
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, player)| player.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Answer, ResultsOutcome};
    use super::*;
    use crate::config::GameConfig;
    use crate::store::DocumentStore;

    async fn results_round(fx: &Fixture, mode: GameMode) -> (Room, Round) {
        let room = room_with(&fx.game, &["p2"]).await;
        let round = fx.game.start_game(&room.code, "host", mode).await.unwrap();
        finish_round(fx, &room, &round).await;
        (room, round)
    }

    async fn finish_round(fx: &Fixture, room: &Room, round: &Round) -> ResultsOutcome {
        fx.game.reveal_answers(&room.code, &round.id).await.unwrap();
        fx.game.start_results(&room.code, &round.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_prompts_never_repeat_until_exhausted() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.game
            .start_game(&room.code, "host", GameMode::Context)
            .await
            .unwrap();

        let total = catalog::prompt_count(GameMode::Context);
        for _ in 1..total {
            fx.game
                .create_round(&room.code, GameMode::Context)
                .await
                .unwrap();
        }
        let used = fx
            .game
            .used_prompt_indexes(&room.code, GameMode::Context)
            .await
            .unwrap();
        assert_eq!(used.len(), total);

        let err = fx
            .game
            .create_round(&room.code, GameMode::Context)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::PromptsExhausted {
                mode: GameMode::Context
            }
        ));
    }

    #[tokio::test]
    async fn test_prompt_usage_is_tracked_per_mode() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();

        let used = fx
            .game
            .used_prompt_indexes(&room.code, GameMode::Context)
            .await
            .unwrap();
        assert!(used.is_empty());
    }

    #[tokio::test]
    async fn test_drop_it_is_single_use() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.game
            .start_game(&room.code, "host", GameMode::Drop)
            .await
            .unwrap();
        assert!(fx.game.get_room(&room.code).await.unwrap().has_used_drop_it);

        let err = fx
            .game
            .create_round(&room.code, GameMode::Drop)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::DropItAlreadyUsed));
    }

    #[tokio::test]
    async fn test_round_counter_follows_rounds() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();
        let second = fx
            .game
            .create_round(&room.code, GameMode::Sentence)
            .await
            .unwrap();

        let room = fx.game.get_room(&room.code).await.unwrap();
        assert_eq!(room.current_round, 2);
        assert_eq!(
            fx.game.current_round(&room.code).await.unwrap().unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn test_reveal_twice_keeps_first_time() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        let round = fx
            .game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();

        let first = fx.game.reveal_answers(&room.code, &round.id).await.unwrap();
        fx.clock.advance_secs(3);
        let second = fx.game.reveal_answers(&room.code, &round.id).await.unwrap();

        assert!(first.is_won());
        assert!(!second.is_won());
        let stored = fx.game.get_round(&room.code, &round.id).await.unwrap();
        assert_eq!(stored.revealed_at, Some(first.at()));
    }

    #[tokio::test]
    async fn test_display_order_is_deterministic() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2", "p3", "p4"]).await;
        let round = fx
            .game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();
        for player in ["p4", "host", "p3", "p2"] {
            fx.game
                .submit_answer(&room.code, &round.id, player, Answer::Text("hi".into()))
                .await
                .unwrap();
        }

        let round = fx.game.get_round(&room.code, &round.id).await.unwrap();
        let order = display_order(&round);
        assert_eq!(order.len(), 4);
        for _ in 0..5 {
            assert_eq!(display_order(&round.clone()), order);
        }

        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["host", "p2", "p3", "p4"]);
    }

    #[tokio::test]
    async fn test_advance_opens_next_round_with_new_prompt() {
        let fx = fixture();
        let (room, first) = results_round(&fx, GameMode::Sentence).await;

        let Advance::NextRound {
            round: second,
            show_interstitial,
        } = fx.game.advance(&room.code, &first.id).await.unwrap()
        else {
            panic!("expected next round");
        };
        assert_eq!(second.mode, GameMode::Sentence);
        assert_ne!(second.prompt_index, first.prompt_index);
        assert!(!show_interstitial);

        let again = fx.game.advance(&room.code, &first.id).await.unwrap();
        assert_eq!(again, Advance::AlreadyAdvanced);
    }

    #[tokio::test]
    async fn test_advance_requires_results() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        let round = fx
            .game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();
        let err = fx.game.advance(&room.code, &round.id).await.unwrap_err();
        assert!(matches!(err, GameError::RoundClosed(_)));
    }

    #[tokio::test]
    async fn test_advance_ends_game_when_prompts_run_out() {
        let fx = fixture();
        let (room, _) = results_round(&fx, GameMode::Context).await;

        let total = catalog::prompt_count(GameMode::Context);
        for _ in 1..total {
            fx.game
                .create_round(&room.code, GameMode::Context)
                .await
                .unwrap();
        }
        let last = fx.game.current_round(&room.code).await.unwrap().unwrap();
        finish_round(&fx, &room, &last).await;

        assert_eq!(
            fx.game.advance(&room.code, &last.id).await.unwrap(),
            Advance::GameEnded
        );
        let room = fx.game.get_room(&room.code).await.unwrap();
        assert_eq!(room.status, RoomStatus::Ended);
    }

    #[tokio::test]
    async fn test_advance_after_drop_it_ends_game() {
        let fx = fixture();
        let (room, round) = results_round(&fx, GameMode::Drop).await;
        assert_eq!(
            fx.game.advance(&room.code, &round.id).await.unwrap(),
            Advance::GameEnded
        );
    }

    #[tokio::test]
    async fn test_interstitial_follows_ad_frequency() {
        let fx = fixture_with(GameConfig {
            ad_frequency_rounds: 2,
            ..GameConfig::default()
        });
        let (room, first) = results_round(&fx, GameMode::Sentence).await;

        let Advance::NextRound {
            round: second,
            show_interstitial,
        } = fx.game.advance(&room.code, &first.id).await.unwrap()
        else {
            panic!("expected round 2");
        };
        assert!(!show_interstitial);

        finish_round(&fx, &room, &second).await;
        let Advance::NextRound {
            show_interstitial, ..
        } = fx.game.advance(&room.code, &second.id).await.unwrap()
        else {
            panic!("expected round 3");
        };
        assert!(show_interstitial);
    }

    #[tokio::test]
    async fn test_stalled_advance_is_taken_over_after_margin() {
        let fx = fixture();
        let (room, round) = results_round(&fx, GameMode::Sentence).await;

        // A client claims the advance and disappears
        fx.store
            .claim_round_marker(&room.code, &round.id, RoundMarker::Advanced)
            .await
            .unwrap();
        assert_eq!(
            fx.game.advance(&room.code, &round.id).await.unwrap(),
            Advance::AlreadyAdvanced
        );

        fx.clock.advance_secs(6);
        assert!(matches!(
            fx.game.advance(&room.code, &round.id).await.unwrap(),
            Advance::NextRound { .. }
        ));
    }

    #[tokio::test]
    async fn test_advance_after_host_ended_game() {
        let fx = fixture();
        let (room, round) = results_round(&fx, GameMode::Sentence).await;
        fx.game.end_game(&room.code).await.unwrap();
        assert_eq!(
            fx.game.advance(&room.code, &round.id).await.unwrap(),
            Advance::GameEnded
        );
    }
}
