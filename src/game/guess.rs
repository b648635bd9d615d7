use super::{display_order, phase_label, GameService};
use crate::error::{GameError, GameResult};
use crate::store::RoundUpdate;
use crate::types::*;

/// Every current member has locked their guesses
pub fn all_guesses_locked(room: &Room, round: &Round) -> bool {
    room.players.iter().all(|p| round.has_locked(p))
}

pub fn waiting_guess_count(room: &Room, round: &Round) -> usize {
    room.players.iter().filter(|p| !round.has_locked(p)).count()
}

/// Submissions `guesser` may guess on, in display order
pub fn guessable_owners(round: &Round, guesser: &str) -> Vec<PlayerId> {
    display_order(round)
        .into_iter()
        .filter(|owner| owner != guesser)
        .collect()
}

impl GameService {
    /// Record who `guesser` thinks wrote `owner`'s answer
    pub async fn add_guess(
        &self,
        code: &RoomCode,
        round_id: &str,
        guesser: &str,
        owner: &str,
        guessed: &str,
    ) -> GameResult<Round> {
        let (room, round) = self.load_member_round(code, round_id, guesser).await?;
        if round.phase() != RoundPhase::Guessing {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }
        if guesser == owner {
            return Err(GameError::validation("You can't guess your own answer"));
        }
        if !round.has_submitted(owner) {
            return Err(GameError::validation("No such answer"));
        }
        if !room.is_member(guessed) && !round.has_submitted(guessed) {
            return Err(GameError::validation("That player isn't in this game"));
        }
        if round.has_locked(guesser) {
            return Err(GameError::validation("Your guesses are locked"));
        }

        let round = self
            .store
            .update_round(
                code,
                round_id,
                vec![RoundUpdate::PutGuess {
                    guesser: guesser.to_string(),
                    owner: owner.to_string(),
                    guessed: guessed.to_string(),
                }],
            )
            .await?;
        self.touch_activity(code).await;
        Ok(round)
    }

    /// Finalize a player's guesses; locking twice is a no-op
    pub async fn lock_guesses(
        &self,
        code: &RoomCode,
        round_id: &str,
        player_id: &str,
    ) -> GameResult<Round> {
        let (_, round) = self.load_member_round(code, round_id, player_id).await?;
        if round.has_locked(player_id) {
            return Ok(round);
        }
        if round.phase() != RoundPhase::Guessing {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }

        let round = self
            .store
            .update_round(
                code,
                round_id,
                vec![RoundUpdate::LockGuesses {
                    player: player_id.to_string(),
                }],
            )
            .await?;
        tracing::debug!("Player {} locked guesses in round {}", player_id, round_id);
        self.touch_activity(code).await;
        Ok(round)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Answer;
    use super::*;

    #[tokio::test]
    async fn test_no_self_guess() {
        let fx = fixture();
        let (room, round) = guessing_round(&fx.game, &["p2"]).await;
        let err = fx
            .game
            .add_guess(&room.code, &round.id, "p2", "p2", "host")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_guess_for_missing_owner_rejected() {
        let fx = fixture();
        let (room, round) = guessing_round(&fx.game, &["p2"]).await;
        let err = fx
            .game
            .add_guess(&room.code, &round.id, "p2", "ghost", "host")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_guessed_player_must_exist() {
        let fx = fixture();
        let (room, round) = guessing_round(&fx.game, &["p2"]).await;
        assert!(fx
            .game
            .add_guess(&room.code, &round.id, "p2", "host", "nobody")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_guess_changes_until_locked() {
        let fx = fixture();
        let (room, round) = guessing_round(&fx.game, &["p2", "p3"]).await;

        fx.game
            .add_guess(&room.code, &round.id, "p2", "host", "p3")
            .await
            .unwrap();
        let round = fx
            .game
            .add_guess(&room.code, &round.id, "p2", "host", "host")
            .await
            .unwrap();
        assert_eq!(round.guesses_of("p2").unwrap()["host"], "host");

        fx.game
            .lock_guesses(&room.code, &round.id, "p2")
            .await
            .unwrap();
        let err = fx
            .game
            .add_guess(&room.code, &round.id, "p2", "host", "p3")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let fx = fixture();
        let (room, round) = guessing_round(&fx.game, &["p2"]).await;
        fx.game
            .lock_guesses(&room.code, &round.id, "p2")
            .await
            .unwrap();
        let round = fx
            .game
            .lock_guesses(&room.code, &round.id, "p2")
            .await
            .unwrap();
        assert_eq!(round.guesses_locked_by, vec!["p2".to_string()]);
        assert_eq!(waiting_guess_count(&room, &round), 1);
        assert!(!all_guesses_locked(&room, &round));
    }

    #[tokio::test]
    async fn test_guessing_closed_before_reveal() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        let round = fx
            .game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();
        fx.game
            .submit_answer(&room.code, &round.id, "host", Answer::Text("hi".into()))
            .await
            .unwrap();

        let err = fx
            .game
            .add_guess(&room.code, &round.id, "p2", "host", "host")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::RoundClosed(_)));
        assert!(matches!(
            fx.game.lock_guesses(&room.code, &round.id, "p2").await,
            Err(GameError::RoundClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_guessable_owners_excludes_self() {
        let fx = fixture();
        let (_, round) = guessing_round(&fx.game, &["p2", "p3"]).await;
        let owners = guessable_owners(&round, "p2");
        assert_eq!(owners.len(), 2);
        assert!(!owners.contains(&"p2".to_string()));
    }
}
