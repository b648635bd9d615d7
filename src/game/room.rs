use super::GameService;
use crate::error::{GameError, GameResult, StoreError};
use crate::identity::validate_display_name;
use crate::store::RoomUpdate;
use crate::types::*;
use std::collections::{HashMap, HashSet};

impl GameService {
    /// Create a room hosted by `host_id` under a fresh code
    pub async fn create_room(&self, host_id: &str, host_name: &str) -> GameResult<Room> {
        let host_name = validate_display_name(host_name, &self.config)?;
        if !self.capacity.check_capacity().await {
            return Err(GameError::AtCapacity);
        }

        let attempts = self.config.room_code_attempts;
        for attempt in 1..=attempts {
            let now = self.now();
            let room = Room {
                code: RoomCode::random(),
                host_id: host_id.to_string(),
                players: vec![host_id.to_string()],
                player_names: HashMap::from([(host_id.to_string(), host_name.clone())]),
                max_players: self.config.max_players,
                min_players: self.config.min_players,
                status: RoomStatus::Waiting,
                current_mode: None,
                current_round: 0,
                has_used_drop_it: false,
                scores: HashMap::new(),
                scored_rounds: Vec::new(),
                created_at: now,
                last_activity: now,
            };

            if self.store.create_room(room.clone()).await? {
                tracing::info!("Room {} created by {}", room.code, host_id);
                self.capacity.increment_users().await;
                return Ok(room);
            }
            tracing::debug!("Room code {} taken (attempt {})", room.code, attempt);
        }

        Err(GameError::CodeGenerationFailed { attempts })
    }

    /// Join by user-entered code; joining a room you are already in is a no-op
    pub async fn join_room(&self, code: &str, player_id: &str, name: &str) -> GameResult<Room> {
        let code = RoomCode::parse(code).map_err(|_| GameError::RoomNotFound)?;
        let name = validate_display_name(name, &self.config)?;
        let room = self.load_room(&code).await?;

        if room.is_member(player_id) {
            return Ok(room);
        }
        if room.is_full() {
            return Err(GameError::RoomFull);
        }
        if room.status == RoomStatus::Playing {
            return Err(GameError::GameInProgress);
        }
        if !self.capacity.check_capacity().await {
            return Err(GameError::AtCapacity);
        }

        let room = self
            .store
            .update_room(
                &code,
                vec![
                    RoomUpdate::AddPlayer {
                        player: player_id.to_string(),
                        name: Some(name),
                    },
                    RoomUpdate::Touch,
                ],
            )
            .await
            .map_err(|e| match e {
                StoreError::Rejected(_) => GameError::RoomFull,
                other => other.into(),
            })?;

        tracing::info!("Player {} joined room {}", player_id, code);
        self.capacity.increment_users().await;
        Ok(room)
    }

    /// Leave a room; the first remaining member inherits the host role
    pub async fn leave_room(&self, code: &RoomCode, player_id: &str) -> GameResult<()> {
        let Some(room) = self.store.get_room(code).await? else {
            return Ok(());
        };
        if !room.is_member(player_id) {
            return Ok(());
        }

        let room = self
            .store
            .update_room(
                code,
                vec![
                    RoomUpdate::RemovePlayer {
                        player: player_id.to_string(),
                    },
                    RoomUpdate::ReassignHostIfMissing,
                    RoomUpdate::EndIfEmpty,
                    RoomUpdate::Touch,
                ],
            )
            .await?;

        if room.players.is_empty() {
            tracing::info!("Last player left room {}, room ended", code);
        } else {
            tracing::info!(
                "Player {} left room {} (host: {})",
                player_id,
                code,
                room.host_id
            );
        }
        self.capacity.decrement_users().await;
        Ok(())
    }

    pub async fn set_display_name(
        &self,
        code: &RoomCode,
        player_id: &str,
        name: &str,
    ) -> GameResult<Room> {
        let name = validate_display_name(name, &self.config)?;
        let room = self.load_room(code).await?;
        if !room.is_member(player_id) {
            return Err(GameError::NotInRoom);
        }
        Ok(self
            .store
            .update_room(
                code,
                vec![
                    RoomUpdate::SetPlayerName {
                        player: player_id.to_string(),
                        name,
                    },
                    RoomUpdate::Touch,
                ],
            )
            .await?)
    }

    /// Host starts a new game: previous rounds are wiped and round 1 opens
    pub async fn start_game(
        &self,
        code: &RoomCode,
        requester: &str,
        mode: GameMode,
    ) -> GameResult<Round> {
        let room = self.load_room(code).await?;
        if !room.is_host(requester) {
            return Err(GameError::PermissionImplicit("start the game"));
        }

        match room.status {
            RoomStatus::Waiting => {}
            RoomStatus::Playing => {
                // A start whose round creation failed can be retried
                if self.store.list_rounds(code).await?.is_empty() {
                    tracing::info!("Retrying first round for room {}", code);
                    return self.open_round(&room, mode, &HashSet::new()).await;
                }
                return Err(GameError::GameInProgress);
            }
            RoomStatus::Ended => {
                return Err(GameError::validation(
                    "Reset the room before starting a new game",
                ))
            }
        }

        if !room.has_enough_players() {
            return Err(GameError::NotEnoughPlayers {
                needed: room.min_players,
                have: room.players.len(),
            });
        }

        let old_rounds = self.store.list_rounds(code).await?;
        for round in &old_rounds {
            self.store.delete_round(code, &round.id).await?;
        }
        if !old_rounds.is_empty() {
            tracing::debug!("Deleted {} old rounds for room {}", old_rounds.len(), code);
        }

        let room = self
            .store
            .update_room(
                code,
                vec![
                    RoomUpdate::ExpectStatus {
                        status: RoomStatus::Waiting,
                    },
                    RoomUpdate::SetStatus {
                        status: RoomStatus::Playing,
                    },
                    RoomUpdate::ResetRound,
                    RoomUpdate::ClearDropIt,
                    RoomUpdate::Touch,
                ],
            )
            .await
            .map_err(|e| match e {
                StoreError::Rejected(_) => GameError::GameInProgress,
                other => other.into(),
            })?;

        tracing::info!("Game started in room {} ({} mode)", code, mode);
        self.open_round(&room, mode, &HashSet::new()).await
    }

    pub async fn end_game(&self, code: &RoomCode) -> GameResult<Room> {
        let room = self
            .store
            .update_room(
                code,
                vec![
                    RoomUpdate::SetStatus {
                        status: RoomStatus::Ended,
                    },
                    RoomUpdate::Touch,
                ],
            )
            .await?;
        tracing::info!("Game ended in room {}", code);
        Ok(room)
    }

    /// Back to the lobby for another game; membership is kept
    pub async fn reset_room(
        &self,
        code: &RoomCode,
        requester: &str,
        clear_scores: bool,
    ) -> GameResult<Room> {
        let room = self.load_room(code).await?;
        if !room.is_host(requester) {
            return Err(GameError::PermissionImplicit("reset the room"));
        }

        let mut updates = vec![
            RoomUpdate::SetStatus {
                status: RoomStatus::Waiting,
            },
            RoomUpdate::SetMode { mode: None },
            RoomUpdate::ResetRound,
            RoomUpdate::ClearDropIt,
        ];
        if clear_scores {
            updates.push(RoomUpdate::ClearScores);
        }
        updates.push(RoomUpdate::Touch);

        let room = self.store.update_room(code, updates).await?;
        tracing::info!("Room {} reset (scores cleared: {})", code, clear_scores);
        Ok(room)
    }

    pub async fn get_room(&self, code: &RoomCode) -> GameResult<Room> {
        self.load_room(code).await
    }

    pub async fn is_host(&self, code: &RoomCode, player_id: &str) -> GameResult<bool> {
        Ok(self.load_room(code).await?.is_host(player_id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::GameConfig;
    use crate::store::DocumentStore;

    #[tokio::test]
    async fn test_create_room() {
        let fx = fixture();
        let room = fx.game.create_room("host", " Hosty ").await.unwrap();

        assert_eq!(room.host_id, "host");
        assert_eq!(room.players, vec!["host".to_string()]);
        assert_eq!(room.display_name("host"), "Hosty");
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.max_players, 12);
        assert_eq!(fx.game.capacity().active_user_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_room_rejects_bad_name() {
        let fx = fixture();
        let err = fx.game.create_room("host", "x").await.unwrap_err();
        assert!(matches!(err, GameError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_join_room_accepts_lowercase_code() {
        let fx = fixture();
        let room = fx.game.create_room("host", "Host").await.unwrap();
        let joined = fx
            .game
            .join_room(&room.code.as_str().to_lowercase(), "p2", "Second")
            .await
            .unwrap();
        assert_eq!(joined.players.len(), 2);
        assert_eq!(joined.display_name("p2"), "Second");
    }

    #[tokio::test]
    async fn test_join_twice_is_noop() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        let again = fx
            .game
            .join_room(room.code.as_str(), "p2", "Second")
            .await
            .unwrap();
        assert_eq!(again.players.len(), 2);
        assert_eq!(fx.game.capacity().active_user_count().await, 2);
    }

    #[tokio::test]
    async fn test_join_unknown_or_malformed_code() {
        let fx = fixture();
        assert!(matches!(
            fx.game.join_room("ZZZZZZ", "p", "Name").await,
            Err(GameError::RoomNotFound)
        ));
        assert!(matches!(
            fx.game.join_room("12", "p", "Name").await,
            Err(GameError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_join_full_room() {
        let fx = fixture_with(GameConfig {
            max_players: 2,
            ..GameConfig::default()
        });
        let room = room_with(&fx.game, &["p2"]).await;
        let err = fx
            .game
            .join_room(room.code.as_str(), "p3", "Third")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::RoomFull));
    }

    #[tokio::test]
    async fn test_join_while_playing() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap();

        let err = fx
            .game
            .join_room(room.code.as_str(), "late", "Late")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::GameInProgress));
    }

    #[tokio::test]
    async fn test_host_leaving_transfers_host() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2", "p3"]).await;
        fx.game.leave_room(&room.code, "host").await.unwrap();

        let room = fx.game.get_room(&room.code).await.unwrap();
        assert_eq!(room.host_id, "p2");
        assert!(!room.is_member("host"));
        assert_eq!(room.players.len(), 2);
    }

    #[tokio::test]
    async fn test_last_leaver_ends_room() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.game.leave_room(&room.code, "host").await.unwrap();
        fx.game.leave_room(&room.code, "p2").await.unwrap();

        let room = fx.game.get_room(&room.code).await.unwrap();
        assert_eq!(room.status, RoomStatus::Ended);
        assert_eq!(fx.game.capacity().active_user_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_unknown_room_is_ok() {
        let fx = fixture();
        let code = RoomCode::parse("NOROOM").unwrap();
        assert!(fx.game.leave_room(&code, "p").await.is_ok());
    }

    #[tokio::test]
    async fn test_start_requires_host_and_players() {
        let fx = fixture();
        let room = room_with(&fx.game, &[]).await;

        let err = fx
            .game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::NotEnoughPlayers { needed: 2, have: 1 }
        ));

        fx.game
            .join_room(room.code.as_str(), "p2", "Second")
            .await
            .unwrap();
        let err = fx
            .game
            .start_game(&room.code, "p2", GameMode::Sentence)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::PermissionImplicit(_)));
    }

    #[tokio::test]
    async fn test_start_opens_first_round() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        let round = fx
            .game
            .start_game(&room.code, "host", GameMode::Context)
            .await
            .unwrap();

        let room = fx.game.get_room(&room.code).await.unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert_eq!(room.current_round, 1);
        assert_eq!(room.current_mode, Some(GameMode::Context));
        assert_eq!(round.mode, GameMode::Context);
        assert!(round.revealed_at.is_none());

        let err = fx
            .game
            .start_game(&room.code, "host", GameMode::Context)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::GameInProgress));
    }

    #[tokio::test]
    async fn test_reset_then_replay_wipes_rounds() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.game
            .start_game(&room.code, "host", GameMode::Drop)
            .await
            .unwrap();
        fx.game.end_game(&room.code).await.unwrap();

        let reset = fx.game.reset_room(&room.code, "host", false).await.unwrap();
        assert_eq!(reset.status, RoomStatus::Waiting);
        assert_eq!(reset.current_mode, None);
        assert_eq!(reset.current_round, 0);
        assert!(!reset.has_used_drop_it);
        assert_eq!(reset.players.len(), 2);

        fx.game
            .start_game(&room.code, "host", GameMode::Drop)
            .await
            .unwrap();
        assert_eq!(fx.store.list_rounds(&room.code).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_can_clear_scores() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.store
            .update_room(
                &room.code,
                vec![RoomUpdate::IncrementScore {
                    player: "p2".to_string(),
                    delta: 3,
                }],
            )
            .await
            .unwrap();

        let kept = fx.game.reset_room(&room.code, "host", false).await.unwrap();
        assert_eq!(kept.score_of("p2"), 3);
        let cleared = fx.game.reset_room(&room.code, "host", true).await.unwrap();
        assert_eq!(cleared.score_of("p2"), 0);
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_retryable() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        fx.store.set_available(false);

        let err = fx
            .game
            .start_game(&room.code, "host", GameMode::Sentence)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Activity refresh never fails the caller
        fx.game.touch_activity(&room.code).await;
    }

    #[tokio::test]
    async fn test_is_host() {
        let fx = fixture();
        let room = room_with(&fx.game, &["p2"]).await;
        assert!(fx.game.is_host(&room.code, "host").await.unwrap());
        assert!(!fx.game.is_host(&room.code, "p2").await.unwrap());
    }
}
