use super::score::{leaderboard, LeaderboardEntry};
use super::GameService;
use crate::error::GameResult;
use crate::types::*;
use std::collections::HashMap;

/// Post-game statistics for the final screen
#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    pub total_rounds: usize,
    pub total_reactions: u32,
    /// Most used emoji and its count; ties go to the smallest emoji string
    pub most_reacted_emoji: Option<(String, u32)>,
    pub used_drop_it: bool,
    pub leaderboard: Vec<LeaderboardEntry>,
}

pub fn summarize(room: &Room, rounds: &[Round]) -> GameSummary {
    let mut per_emoji: HashMap<&str, u32> = HashMap::new();
    for counts in rounds.iter().flat_map(|r| r.reactions.values()) {
        for (emoji, count) in counts {
            *per_emoji.entry(emoji.as_str()).or_insert(0) += count;
        }
    }

    let total_reactions = per_emoji.values().sum();
    let most_reacted_emoji = per_emoji
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .max_by(|(ea, ca), (eb, cb)| ca.cmp(cb).then_with(|| eb.cmp(ea)))
        .map(|(emoji, count)| (emoji.to_string(), count));

    GameSummary {
        total_rounds: rounds.len(),
        total_reactions,
        most_reacted_emoji,
        used_drop_it: room.has_used_drop_it || rounds.iter().any(|r| r.mode == GameMode::Drop),
        leaderboard: leaderboard(room),
    }
}

impl GameService {
    pub async fn generate_summary(&self, code: &RoomCode) -> GameResult<GameSummary> {
        let room = self.load_room(code).await?;
        let rounds = self.store.list_rounds(code).await?;
        Ok(summarize(&room, &rounds))
    }
}
