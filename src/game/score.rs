use super::{phase_label, GameService};
use crate::error::{GameError, GameResult};
use crate::store::{Claim, RoomUpdate, RoundMarker};
use crate::types::*;

/// One point per guess naming the actual author, summed per guesser
pub fn calculate_round_scores(round: &Round) -> PlayerScores {
    round
        .guesses
        .iter()
        .map(|(guesser, guesses)| {
            let correct = guesses
                .iter()
                .filter(|(owner, guessed)| owner != &guesser && owner == guessed)
                .count();
            (guesser.clone(), u32::try_from(correct).unwrap_or(u32::MAX))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsOutcome {
    pub claim: Claim,
    /// Points earned this round
    pub round_scores: PlayerScores,
    /// Room after the scores were committed
    pub room: Room,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
}

/// Members by cumulative score, ties in join order
pub fn leaderboard(room: &Room) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = room
        .players
        .iter()
        .map(|player| LeaderboardEntry {
            player_id: player.clone(),
            name: room.display_name(player),
            score: room.score_of(player),
        })
        .collect();
    // Stable sort keeps join order among equal scores
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

impl GameService {
    /// Close guessing and commit this round's scores.
    ///
    /// The results-start claim freezes the guesses, so every caller computes
    /// the same deltas, and the commit itself is keyed by round id.
    pub async fn start_results(&self, code: &RoomCode, round_id: &str) -> GameResult<ResultsOutcome> {
        let round = self.load_round(code, round_id).await?;
        if round.revealed_at.is_none() {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }

        let claim = self
            .store
            .claim_round_marker(code, round_id, RoundMarker::ResultsStarted)
            .await?;
        match claim {
            Claim::Won(at) => {
                tracing::info!("Results started for round {} in room {} at {}", round_id, code, at)
            }
            Claim::Lost(at) => {
                tracing::debug!("Results for round {} already started at {}", round_id, at)
            }
        }

        let (round_scores, room) = self.commit_round_scores(code, round_id).await?;
        Ok(ResultsOutcome {
            claim,
            round_scores,
            room,
        })
    }

    /// Add a round's scores to the room unless they are already there
    pub async fn commit_round_scores(
        &self,
        code: &RoomCode,
        round_id: &str,
    ) -> GameResult<(PlayerScores, Room)> {
        let round = self.load_round(code, round_id).await?;
        if round.results_started_at.is_none() {
            return Err(GameError::RoundClosed(phase_label(round.phase())));
        }
        let round_scores = calculate_round_scores(&round);

        let room = self.load_room(code).await?;
        if room.is_round_scored(round_id) {
            return Ok((round_scores, room));
        }

        let room = self
            .store
            .update_room(
                code,
                vec![
                    RoomUpdate::ApplyRoundScores {
                        round_id: round_id.to_string(),
                        scores: round_scores.clone(),
                    },
                    RoomUpdate::Touch,
                ],
            )
            .await?;
        tracing::info!(
            "Committed scores for round {} in room {}: {:?}",
            round_id,
            code,
            round_scores
        );
        Ok((round_scores, room))
    }
}
