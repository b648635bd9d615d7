//! Per-client phase driver.
//!
//! Each client runs one [`PlayerSession`] per room. It recomputes every phase
//! budget from the persisted store timestamps and fires the transitions that
//! are due: the host drives, everybody else follows after a safety margin.
//! Transitions are idempotent, so several sessions firing the same one is fine.

use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::game::{all_guesses_locked, all_submitted, Advance, GameService};
use crate::types::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_CHANNEL_SIZE: usize = 64;

/// Transition a session may perform on the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseAction {
    AutoSubmit,
    Reveal,
    LockGuesses,
    StartResults,
    /// Recover a results start whose score commit never landed
    CommitScores,
    Advance,
}

/// Time elapsed since a store timestamp, zero if it lies in the future
fn elapsed_since(at: Timestamp, now: Timestamp) -> Duration {
    (now - at).to_std().unwrap_or_default()
}

/// The transition `player_id` should attempt right now, if any.
/// `round` is the room's current round.
pub fn next_action(
    room: &Room,
    round: &Round,
    player_id: &str,
    now: Timestamp,
    config: &GameConfig,
) -> Option<PhaseAction> {
    if room.status != RoomStatus::Playing {
        return None;
    }
    let is_host = room.is_host(player_id);
    let is_member = room.is_member(player_id);

    match round.phase() {
        RoundPhase::Submitting => {
            let elapsed = elapsed_since(round.created_at, now);
            if is_member && !round.has_submitted(player_id) && elapsed >= config.submission_time {
                Some(PhaseAction::AutoSubmit)
            } else if all_submitted(room, round)
                || elapsed >= config.submission_time + config.fallback_margin
            {
                Some(PhaseAction::Reveal)
            } else {
                None
            }
        }
        RoundPhase::Guessing => {
            let elapsed = elapsed_since(round.revealed_at?, now);
            if is_member && !round.has_locked(player_id) && elapsed >= config.guessing_time {
                return Some(PhaseAction::LockGuesses);
            }
            let due = if is_host {
                all_guesses_locked(room, round) || elapsed >= config.guessing_time
            } else {
                elapsed >= config.guessing_time + config.fallback_margin
            };
            due.then_some(PhaseAction::StartResults)
        }
        RoundPhase::Results => {
            let elapsed = elapsed_since(round.results_started_at?, now);
            let margin = if is_host {
                Duration::ZERO
            } else {
                config.fallback_margin
            };
            if !room.is_round_scored(&round.id) && elapsed >= margin {
                Some(PhaseAction::CommitScores)
            } else if elapsed >= config.results_time + margin {
                Some(PhaseAction::Advance)
            } else {
                None
            }
        }
        // Someone claimed the advance; a claim older than the margin is taken over
        RoundPhase::Finished => {
            let elapsed = elapsed_since(round.advanced_at?, now);
            (elapsed >= config.fallback_margin).then_some(PhaseAction::Advance)
        }
    }
}

/// Time left in the round's current phase
pub fn countdown(round: &Round, now: Timestamp, config: &GameConfig) -> Option<Duration> {
    let (since, budget) = match round.phase() {
        RoundPhase::Submitting => (round.created_at, config.submission_time),
        RoundPhase::Guessing => (round.revealed_at?, config.guessing_time),
        RoundPhase::Results => (round.results_started_at?, config.results_time),
        RoundPhase::Finished => return None,
    };
    Some(budget.saturating_sub(elapsed_since(since, now)))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A round this session has not seen before became current
    RoundStarted { round: Round },
    ActionTaken { action: PhaseAction },
    /// The action failed and will be retried on a later tick
    ActionFailed { action: PhaseAction, error: String },
    GameEnded,
    RoomClosed,
}

/// One client's view of one room
pub struct PlayerSession {
    game: GameService,
    code: RoomCode,
    player_id: PlayerId,
    round_id: Option<RoundId>,
    attempted: HashSet<PhaseAction>,
    game_ended: bool,
}

impl PlayerSession {
    pub fn new(game: GameService, code: RoomCode, player_id: impl Into<PlayerId>) -> Self {
        Self {
            game,
            code,
            player_id: player_id.into(),
            round_id: None,
            attempted: HashSet::new(),
            game_ended: false,
        }
    }

    pub fn round_id(&self) -> Option<&str> {
        self.round_id.as_deref()
    }

    /// Re-read the room and fire whatever transition is due
    pub async fn tick(&mut self) -> GameResult<Vec<SessionEvent>> {
        let mut events = Vec::new();

        let room = match self.game.get_room(&self.code).await {
            Ok(room) => room,
            Err(GameError::RoomNotFound) => {
                events.push(SessionEvent::RoomClosed);
                return Ok(events);
            }
            Err(e) => return Err(e),
        };

        match room.status {
            RoomStatus::Ended => {
                if !self.game_ended {
                    self.game_ended = true;
                    events.push(SessionEvent::GameEnded);
                }
                return Ok(events);
            }
            RoomStatus::Waiting => return Ok(events),
            RoomStatus::Playing => self.game_ended = false,
        }

        let Some(round) = self.game.current_round(&self.code).await? else {
            return Ok(events);
        };
        if self.round_id.as_deref() != Some(round.id.as_str()) {
            tracing::debug!("Session {} picked up round {}", self.player_id, round.id);
            self.round_id = Some(round.id.clone());
            self.attempted.clear();
            events.push(SessionEvent::RoundStarted {
                round: round.clone(),
            });
        }

        let now = self.game.now();
        let Some(action) = next_action(&room, &round, &self.player_id, now, self.game.config())
        else {
            return Ok(events);
        };
        if !self.attempted.insert(action) {
            return Ok(events);
        }

        match self.perform(action, &round).await {
            Ok(true) => events.push(SessionEvent::ActionTaken { action }),
            Ok(false) => {
                self.attempted.remove(&action);
            }
            Err(GameError::RoundClosed(phase)) => {
                tracing::debug!("{:?} superseded, round is {}", action, phase);
            }
            Err(e) => {
                tracing::warn!("{:?} failed for {} in room {}: {}", action, self.player_id, self.code, e);
                self.attempted.remove(&action);
                events.push(SessionEvent::ActionFailed {
                    action,
                    error: e.to_string(),
                });
            }
        }
        Ok(events)
    }

    /// False when another client holds the transition and it should be retried later
    async fn perform(&self, action: PhaseAction, round: &Round) -> GameResult<bool> {
        let code = &self.code;
        match action {
            PhaseAction::AutoSubmit => {
                self.game
                    .auto_submit_timeout(code, &round.id, &self.player_id)
                    .await?;
            }
            PhaseAction::Reveal => {
                self.game.reveal_answers(code, &round.id).await?;
            }
            PhaseAction::LockGuesses => {
                self.game
                    .lock_guesses(code, &round.id, &self.player_id)
                    .await?;
            }
            PhaseAction::StartResults => {
                self.game.start_results(code, &round.id).await?;
            }
            PhaseAction::CommitScores => {
                self.game.commit_round_scores(code, &round.id).await?;
            }
            PhaseAction::Advance => {
                let outcome = self.game.advance(code, &round.id).await?;
                tracing::debug!("Advance from round {}: {:?}", round.id, outcome);
                return Ok(outcome != Advance::AlreadyAdvanced);
            }
        }
        Ok(true)
    }

    /// Run the session on its own task until the handle is dropped or shut down
    pub fn spawn(mut self) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let resume = Arc::new(Notify::new());
        let resumed = resume.clone();
        let mut feed = self.game.store().subscribe();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    event = feed.recv() => match event {
                        Ok(event) if event.room_code() == Some(&self.code) => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!("Session feed lagged by {} events", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = resumed.notified() => {
                        tracing::debug!("Session {} resumed", self.player_id);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }

                match self.tick().await {
                    Ok(events) => {
                        let closed = events.contains(&SessionEvent::RoomClosed);
                        for event in events {
                            if events_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        if closed {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Session tick failed in room {}: {}", self.code, e);
                    }
                }
            }
            tracing::debug!("Session {} in room {} stopped", self.player_id, self.code);
        });

        let handle = SessionHandle {
            shutdown: shutdown_tx,
            resume,
            task,
        };
        (handle, events_rx)
    }
}

/// Running session; dropping it stops the session
pub struct SessionHandle {
    shutdown: watch::Sender<bool>,
    resume: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Recompute timers immediately, e.g. when the app returns to the foreground
    pub fn resume(&self) {
        self.resume.notify_one();
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
