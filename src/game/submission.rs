use super::{phase_label, GameService};
use crate::error::{GameError, GameResult, StoreError};
use crate::moderation::{content_address, validate_answer, validate_image};
use crate::store::{Claim, RoundUpdate};
use crate::types::*;

/// Answer recorded for a player whose submission budget ran out
pub const TIMEOUT_ANSWER: &str = "⏱️ Time's up!";

/// Answer recorded when a player passes on the prompt
pub const SKIP_ANSWER: &str = "⏭️ Skipped";

/// A player's answer as handed to [`GameService::submit_answer`]
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Text(String),
    /// URL of an image already uploaded to [`GameService::image_path`]
    Image(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub round: Round,
    /// Set when this submission completed the round and triggered the reveal
    pub reveal: Option<Claim>,
}

/// Every current member has submitted
pub fn all_submitted(room: &Room, round: &Round) -> bool {
    room.players.iter().all(|p| round.has_submitted(p))
}

pub fn waiting_player_count(room: &Room, round: &Round) -> usize {
    room.players
        .iter()
        .filter(|p| !round.has_submitted(p))
        .count()
}

impl GameService {
    /// Validate a compressed Drop It image and return its storage path
    pub fn image_path(&self, code: &RoomCode, bytes: &[u8]) -> GameResult<String> {
        validate_image(bytes, &self.config)?;
        Ok(content_address(code, bytes))
    }

    /// Record (or overwrite) a player's answer while the round is open
    pub async fn submit_answer(
        &self,
        code: &RoomCode,
        round_id: &str,
        player_id: &str,
        answer: Answer,
    ) -> GameResult<Round> {
        let (_, round) = self.load_member_round(code, round_id, player_id).await?;
        if round.revealed_at.is_some() {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }

        let (content, is_image) = match (round.mode, answer) {
            (GameMode::Drop, Answer::Image(url)) => {
                if url.trim().is_empty() {
                    return Err(GameError::validation("Please select an image"));
                }
                (url, true)
            }
            (GameMode::Drop, Answer::Text(_)) => {
                return Err(GameError::validation("This round needs an image"))
            }
            (_, Answer::Image(_)) => {
                return Err(GameError::validation("This round needs a text answer"))
            }
            (mode, Answer::Text(text)) => (
                validate_answer(mode, &text, &self.config, self.classifier.as_ref())?,
                false,
            ),
        };

        let round = self
            .put_submission(code, round_id, player_id, content, is_image)
            .await?;
        tracing::debug!("Player {} submitted in round {}", player_id, round_id);
        self.touch_activity(code).await;
        Ok(round)
    }

    /// Submit the timeout marker unless the player already answered
    pub async fn auto_submit_timeout(
        &self,
        code: &RoomCode,
        round_id: &str,
        player_id: &str,
    ) -> GameResult<Round> {
        let (_, round) = self.load_member_round(code, round_id, player_id).await?;
        if round.has_submitted(player_id) {
            return Ok(round);
        }
        if round.revealed_at.is_some() {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }

        let round = self
            .put_submission(code, round_id, player_id, TIMEOUT_ANSWER.to_string(), false)
            .await?;
        tracing::info!("Player {} timed out in round {}", player_id, round_id);
        self.touch_activity(code).await;
        Ok(round)
    }

    /// Pass on the prompt with the skip marker, then reveal if that was the last answer
    pub async fn skip_submission(
        &self,
        code: &RoomCode,
        round_id: &str,
        player_id: &str,
    ) -> GameResult<SubmitOutcome> {
        let (_, round) = self.load_member_round(code, round_id, player_id).await?;
        if round.revealed_at.is_some() {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }

        let round = self
            .put_submission(code, round_id, player_id, SKIP_ANSWER.to_string(), false)
            .await?;
        tracing::info!("Player {} skipped round {}", player_id, round_id);
        self.touch_activity(code).await;
        let reveal = self.reveal_if_complete(code, round_id).await?;
        Ok(SubmitOutcome { round, reveal })
    }

    /// The store refuses submissions once the round is revealed
    async fn put_submission(
        &self,
        code: &RoomCode,
        round_id: &str,
        player_id: &str,
        content: String,
        is_image: bool,
    ) -> GameResult<Round> {
        let update = RoundUpdate::PutSubmission {
            player: player_id.to_string(),
            content,
            is_image,
        };
        self.store
            .update_round(code, round_id, vec![update])
            .await
            .map_err(|e| match e {
                StoreError::Rejected(_) => GameError::RoundClosed(phase_label(RoundPhase::Guessing)),
                e => e.into(),
            })
    }

    /// Reveal if everyone has answered; safe to call from every client
    pub async fn reveal_if_complete(
        &self,
        code: &RoomCode,
        round_id: &str,
    ) -> GameResult<Option<Claim>> {
        let room = self.load_room(code).await?;
        let round = self.load_round(code, round_id).await?;
        if round.revealed_at.is_some() || !all_submitted(&room, &round) {
            return Ok(None);
        }
        Ok(Some(self.reveal_answers(code, round_id).await?))
    }

    /// Submit, then trigger the reveal when this was the last answer
    pub async fn submit_and_maybe_reveal(
        &self,
        code: &RoomCode,
        round_id: &str,
        player_id: &str,
        answer: Answer,
    ) -> GameResult<SubmitOutcome> {
        let round = self
            .submit_answer(code, round_id, player_id, answer)
            .await?;
        let reveal = self.reveal_if_complete(code, round_id).await?;
        Ok(SubmitOutcome { round, reveal })
    }

    /// Count an emoji reaction against a revealed submission
    pub async fn add_reaction(
        &self,
        code: &RoomCode,
        round_id: &str,
        owner: &str,
        emoji: &str,
    ) -> GameResult<Round> {
        if !REACTION_EMOJIS.contains(&emoji) {
            return Err(GameError::validation("Unsupported reaction"));
        }
        let round = self.load_round(code, round_id).await?;
        if round.revealed_at.is_none() {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }
        if !round.has_submitted(owner) {
            return Err(GameError::validation("No such answer"));
        }

        let round = self
            .store
            .update_round(
                code,
                round_id,
                vec![RoundUpdate::IncrementReaction {
                    owner: owner.to_string(),
                    emoji: emoji.to_string(),
                }],
            )
            .await?;
        self.touch_activity(code).await;
        Ok(round)
    }
}
