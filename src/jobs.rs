//! Scheduled maintenance run by the store host

use crate::config::GameConfig;
use crate::store::{DocumentStore, RoundUpdate};
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const AUTO_HIDE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub rooms_deleted: usize,
    pub rounds_purged: usize,
}

fn older_than(at: Timestamp, now: Timestamp, age: Duration) -> bool {
    (now - at).to_std().map(|elapsed| elapsed > age).unwrap_or(false)
}

/// Delete inactive rooms and strip expired Drop It images
pub async fn cleanup_stale_data(
    store: &dyn DocumentStore,
    config: &GameConfig,
) -> crate::error::StoreResult<CleanupReport> {
    let now = store.now();
    let mut report = CleanupReport::default();

    for room in store.list_rooms().await? {
        if older_than(room.last_activity, now, config.room_inactivity) {
            tracing::info!("Deleting inactive room {} (last activity {})", room.code, room.last_activity);
            store.delete_room(&room.code).await?;
            report.rooms_deleted += 1;
            // Members of an abandoned room never left through the game
            let members = i64::try_from(room.players.len()).unwrap_or(i64::MAX);
            if members > 0 {
                if let Err(e) = store.increment_capacity(-members).await {
                    tracing::warn!("Failed to release capacity of room {}: {}", room.code, e);
                }
            }
            continue;
        }

        for round in store.list_rounds(&room.code).await? {
            let has_live_image = round
                .submissions
                .values()
                .any(|s| s.is_image && !s.purged);
            if has_live_image && older_than(round.created_at, now, config.drop_it_timeout) {
                store
                    .update_round(&room.code, &round.id, vec![RoundUpdate::PurgeImages])
                    .await?;
                tracing::info!("Purged images of round {} in room {}", round.id, room.code);
                report.rounds_purged += 1;
            }
        }
    }

    Ok(report)
}

/// Hide submissions reported by at least `threshold` distinct players.
/// Returns how many submissions were newly hidden.
pub async fn hide_reported_submissions(
    store: &dyn DocumentStore,
    threshold: usize,
) -> crate::error::StoreResult<usize> {
    let mut reporters: HashMap<(RoomCode, RoundId, PlayerId), HashSet<PlayerId>> = HashMap::new();
    for report in store.list_reports().await? {
        reporters
            .entry((report.room_code, report.round_id, report.submission_owner))
            .or_default()
            .insert(report.reported_by);
    }

    let mut hidden = 0;
    for ((code, round_id, owner), by) in reporters {
        if by.len() < threshold {
            continue;
        }
        let Some(round) = store.get_round(&code, &round_id).await? else {
            continue;
        };
        match round.submissions.get(&owner) {
            Some(submission) if !submission.hidden => {}
            _ => continue,
        }
        store
            .update_round(&code, &round_id, vec![RoundUpdate::HideSubmission { owner: owner.clone() }])
            .await?;
        tracing::info!(
            "Hid submission of {} in round {} ({} reports)",
            owner,
            round_id,
            by.len()
        );
        hidden += 1;
    }
    Ok(hidden)
}

/// Spawn the periodic cleanup task
pub fn spawn_cleanup_job(store: Arc<dyn DocumentStore>, config: Arc<GameConfig>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            match cleanup_stale_data(&*store, &config).await {
                Ok(report) => tracing::debug!("Cleanup finished: {:?}", report),
                Err(e) => tracing::warn!("Cleanup failed: {}", e),
            }
        }
    });
}

/// Spawn the periodic auto-hide task
pub fn spawn_auto_hide_job(store: Arc<dyn DocumentStore>, threshold: usize) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(AUTO_HIDE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = hide_reported_submissions(&*store, threshold).await {
                tracing::warn!("Auto-hide failed: {}", e);
            }
        }
    });
}
