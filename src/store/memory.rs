use super::{Claim, DocumentStore, RoomUpdate, RoundMarker, RoundUpdate, StoreEvent, EVENT_BUFFER};
use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// In-process document store
pub struct MemoryStore {
    rooms: RwLock<HashMap<RoomCode, Room>>,
    /// Rounds per room in creation order
    rounds: RwLock<HashMap<RoomCode, Vec<Round>>>,
    reports: RwLock<Vec<Report>>,
    capacity: RwLock<Option<GlobalCapacity>>,
    events: broadcast::Sender<StoreEvent>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_BUFFER);
        Self {
            rooms: RwLock::new(HashMap::new()),
            rounds: RwLock::new(HashMap::new()),
            reports: RwLock::new(Vec::new()),
            capacity: RwLock::new(None),
            events,
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the connection to the store
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is offline".to_string()))
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find_round<'a>(
    rounds: &'a mut HashMap<RoomCode, Vec<Round>>,
    code: &RoomCode,
    round_id: &str,
) -> StoreResult<&'a mut Round> {
    rounds
        .get_mut(code)
        .and_then(|list| list.iter_mut().find(|r| r.id == round_id))
        .ok_or_else(|| StoreError::not_found("rounds", round_id))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    async fn get_room(&self, code: &RoomCode) -> StoreResult<Option<Room>> {
        self.ensure_available()?;
        Ok(self.rooms.read().await.get(code).cloned())
    }

    async fn create_room(&self, room: Room) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.code) {
            return Ok(false);
        }
        rooms.insert(room.code.clone(), room.clone());
        drop(rooms);

        self.publish(StoreEvent::RoomChanged { room });
        Ok(true)
    }

    async fn update_room(&self, code: &RoomCode, updates: Vec<RoomUpdate>) -> StoreResult<Room> {
        self.ensure_available()?;
        let now = self.now();
        let mut rooms = self.rooms.write().await;
        let stored = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::not_found("rooms", code.as_str()))?;

        let mut next = stored.clone();
        for update in &updates {
            update.apply(&mut next, now)?;
        }
        *stored = next.clone();
        drop(rooms);

        self.publish(StoreEvent::RoomChanged { room: next.clone() });
        Ok(next)
    }

    async fn delete_room(&self, code: &RoomCode) -> StoreResult<()> {
        self.ensure_available()?;
        let removed = self.rooms.write().await.remove(code);
        self.rounds.write().await.remove(code);
        if removed.is_some() {
            self.publish(StoreEvent::RoomDeleted { code: code.clone() });
        }
        Ok(())
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        self.ensure_available()?;
        Ok(self.rooms.read().await.values().cloned().collect())
    }

    async fn add_round(&self, code: &RoomCode, round: NewRound) -> StoreResult<Round> {
        self.ensure_available()?;
        if !self.rooms.read().await.contains_key(code) {
            return Err(StoreError::not_found("rooms", code.as_str()));
        }

        let round = Round {
            id: ulid::Ulid::new().to_string(),
            prompt_index: round.prompt_index,
            mode: round.mode,
            submissions: HashMap::new(),
            reactions: HashMap::new(),
            guesses: HashMap::new(),
            guesses_locked_by: Vec::new(),
            created_at: self.now(),
            revealed_at: None,
            results_started_at: None,
            advanced_at: None,
        };
        self.rounds
            .write()
            .await
            .entry(code.clone())
            .or_default()
            .push(round.clone());

        self.publish(StoreEvent::RoundChanged {
            code: code.clone(),
            round: round.clone(),
        });
        Ok(round)
    }

    async fn get_round(&self, code: &RoomCode, round_id: &str) -> StoreResult<Option<Round>> {
        self.ensure_available()?;
        Ok(self
            .rounds
            .read()
            .await
            .get(code)
            .and_then(|list| list.iter().find(|r| r.id == round_id))
            .cloned())
    }

    async fn list_rounds(&self, code: &RoomCode) -> StoreResult<Vec<Round>> {
        self.ensure_available()?;
        Ok(self
            .rounds
            .read()
            .await
            .get(code)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_round(
        &self,
        code: &RoomCode,
        round_id: &str,
        updates: Vec<RoundUpdate>,
    ) -> StoreResult<Round> {
        self.ensure_available()?;
        let now = self.now();
        let mut rounds = self.rounds.write().await;
        let stored = find_round(&mut rounds, code, round_id)?;

        let mut next = stored.clone();
        for update in &updates {
            update.apply(&mut next, now)?;
        }
        *stored = next.clone();
        drop(rounds);

        self.publish(StoreEvent::RoundChanged {
            code: code.clone(),
            round: next.clone(),
        });
        Ok(next)
    }

    async fn claim_round_marker(
        &self,
        code: &RoomCode,
        round_id: &str,
        marker: RoundMarker,
    ) -> StoreResult<Claim> {
        self.ensure_available()?;
        let now = self.now();
        let mut rounds = self.rounds.write().await;
        let stored = find_round(&mut rounds, code, round_id)?;

        let claim = marker.claim(stored, now)?;
        let snapshot = stored.clone();
        drop(rounds);

        if claim.is_won() {
            self.publish(StoreEvent::RoundChanged {
                code: code.clone(),
                round: snapshot,
            });
        }
        Ok(claim)
    }

    async fn delete_round(&self, code: &RoomCode, round_id: &str) -> StoreResult<()> {
        self.ensure_available()?;
        let mut rounds = self.rounds.write().await;
        let removed = match rounds.get_mut(code) {
            Some(list) => {
                let before = list.len();
                list.retain(|r| r.id != round_id);
                list.len() != before
            }
            None => false,
        };
        drop(rounds);

        if removed {
            self.publish(StoreEvent::RoundDeleted {
                code: code.clone(),
                round_id: round_id.to_string(),
            });
        }
        Ok(())
    }

    async fn add_report(&self, report: NewReport) -> StoreResult<Report> {
        self.ensure_available()?;
        let report = Report {
            id: ulid::Ulid::new().to_string(),
            room_code: report.room_code,
            round_id: report.round_id,
            submission_owner: report.submission_owner,
            reported_by: report.reported_by,
            reason: report.reason,
            reported_at: self.now(),
            content: report.content,
            report_count: 1,
        };
        self.reports.write().await.push(report.clone());

        self.publish(StoreEvent::ReportAdded {
            report: report.clone(),
        });
        Ok(report)
    }

    async fn list_reports(&self) -> StoreResult<Vec<Report>> {
        self.ensure_available()?;
        Ok(self.reports.read().await.clone())
    }

    async fn get_capacity(&self) -> StoreResult<GlobalCapacity> {
        self.ensure_available()?;
        let capacity = self.capacity.read().await.clone();
        Ok(capacity.unwrap_or_else(|| GlobalCapacity {
            active_users: 0,
            last_updated: self.now(),
        }))
    }

    async fn increment_capacity(&self, delta: i64) -> StoreResult<GlobalCapacity> {
        self.ensure_available()?;
        let now = self.now();
        let mut capacity = self.capacity.write().await;
        let doc = capacity.get_or_insert_with(|| GlobalCapacity {
            active_users: 0,
            last_updated: now,
        });
        doc.active_users = doc.active_users.saturating_add(delta).max(0);
        doc.last_updated = now;
        let snapshot = doc.clone();
        drop(capacity);

        self.publish(StoreEvent::CapacityChanged {
            capacity: snapshot.clone(),
        });
        Ok(snapshot)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn code() -> RoomCode {
        RoomCode::parse("QWERTY").unwrap()
    }

    fn room(store: &MemoryStore) -> Room {
        let now = store.now();
        Room {
            code: code(),
            host_id: "host".to_string(),
            players: vec!["host".to_string()],
            player_names: HashMap::new(),
            max_players: 12,
            min_players: 2,
            status: RoomStatus::Waiting,
            current_mode: None,
            current_round: 0,
            has_used_drop_it: false,
            scores: HashMap::new(),
            scored_rounds: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    fn new_round() -> NewRound {
        NewRound {
            prompt_index: 2,
            mode: GameMode::Sentence,
        }
    }

    #[tokio::test]
    async fn test_create_room_is_set_if_absent() {
        let store = MemoryStore::new();
        assert!(store.create_room(room(&store)).await.unwrap());

        let mut other = room(&store);
        other.host_id = "intruder".to_string();
        assert!(!store.create_room(other).await.unwrap());

        let stored = store.get_room(&code()).await.unwrap().unwrap();
        assert_eq!(stored.host_id, "host");
    }

    #[tokio::test]
    async fn test_update_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.create_room(room(&store)).await.unwrap();

        let result = store
            .update_room(
                &code(),
                vec![
                    RoomUpdate::SetMode {
                        mode: Some(GameMode::Drop),
                    },
                    RoomUpdate::ExpectStatus {
                        status: RoomStatus::Playing,
                    },
                ],
            )
            .await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));

        let stored = store.get_room(&code()).await.unwrap().unwrap();
        assert_eq!(stored.current_mode, None);
    }

    #[tokio::test]
    async fn test_update_missing_room() {
        let store = MemoryStore::new();
        let err = store
            .update_room(&code(), vec![RoomUpdate::Touch])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound {
                collection: "rooms",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_rounds_listed_in_creation_order() {
        let store = MemoryStore::new();
        store.create_room(room(&store)).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.add_round(&code(), new_round()).await.unwrap().id);
        }
        let listed: Vec<_> = store
            .list_rounds(&code())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn test_add_round_requires_room() {
        let store = MemoryStore::new();
        assert!(store.add_round(&code(), new_round()).await.is_err());
    }

    #[tokio::test]
    async fn test_claim_keeps_first_timestamp() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryStore::with_clock(clock.clone());
        store.create_room(room(&store)).await.unwrap();
        let round = store.add_round(&code(), new_round()).await.unwrap();

        let first = store
            .claim_round_marker(&code(), &round.id, RoundMarker::Revealed)
            .await
            .unwrap();
        clock.advance_secs(10);
        let second = store
            .claim_round_marker(&code(), &round.id, RoundMarker::Revealed)
            .await
            .unwrap();

        assert!(first.is_won());
        assert_eq!(second, Claim::Lost(first.at()));
        let stored = store.get_round(&code(), &round.id).await.unwrap().unwrap();
        assert_eq!(stored.revealed_at, Some(first.at()));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store.create_room(room(&store)).await.unwrap();
        let round = store.add_round(&code(), new_round()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = round.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_round_marker(&code(), &id, RoundMarker::Revealed)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_won() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_change_feed_publishes_writes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.create_room(room(&store)).await.unwrap();
        let round = store.add_round(&code(), new_round()).await.unwrap();

        match rx.recv().await.unwrap() {
            StoreEvent::RoomChanged { room } => assert_eq!(room.code, code()),
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap() {
            StoreEvent::RoundChanged { round: r, .. } => assert_eq!(r.id, round.id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_fast() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get_room(&code()).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_available(true);
        assert!(store.get_room(&code()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_increments_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.get_capacity().await.unwrap().active_users, 0);
        store.increment_capacity(3).await.unwrap();
        let doc = store.increment_capacity(-1).await.unwrap();
        assert_eq!(doc.active_users, 2);
    }

    #[tokio::test]
    async fn test_capacity_never_goes_negative_or_overflows() {
        let store = MemoryStore::new();
        let doc = store.increment_capacity(-5).await.unwrap();
        assert_eq!(doc.active_users, 0);

        store.increment_capacity(i64::MAX).await.unwrap();
        let doc = store.increment_capacity(10).await.unwrap();
        assert_eq!(doc.active_users, i64::MAX);
        let doc = store.increment_capacity(i64::MIN).await.unwrap();
        assert_eq!(doc.active_users, 0);
    }

    #[tokio::test]
    async fn test_delete_room_drops_rounds() {
        let store = MemoryStore::new();
        store.create_room(room(&store)).await.unwrap();
        store.add_round(&code(), new_round()).await.unwrap();

        store.delete_room(&code()).await.unwrap();
        assert!(store.get_room(&code()).await.unwrap().is_none());
        assert!(store.list_rounds(&code()).await.unwrap().is_empty());
    }
}
