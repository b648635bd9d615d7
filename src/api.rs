//! HTTP API of the shared document store.
//!
//! Clients hold no server session: every route is a single-document read or
//! an atomic write, and every committed write is also pushed on `/ws`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::error::StoreError;
use crate::jobs;
use crate::protocol::*;
use crate::state::AppState;
use crate::store::{Claim, RoomUpdate, RoundUpdate};
use crate::types::*;
use crate::{abuse, auth, ws};

/// Store failures as HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Store(StoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Store(StoreError::Rejected(_)) => (StatusCode::CONFLICT, "REJECTED"),
            ApiError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            ApiError::Store(StoreError::Serialization(_)) => {
                (StatusCode::BAD_REQUEST, "SERIALIZATION")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::warn!("Store request failed: {}", self);
        }
        let body = ErrorBody {
            code: code.to_string(),
            msg: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn room_not_found(code: &RoomCode) -> ApiError {
    StoreError::not_found("rooms", code.as_str()).into()
}

fn round_not_found(round_id: &str) -> ApiError {
    StoreError::not_found("rounds", round_id).into()
}

/// Build the store router with auth and abuse layers applied
pub fn router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/admin/reports", get(admin_list_reports))
        .route("/admin/rooms", get(admin_list_rooms))
        .route("/admin/cleanup", post(admin_cleanup))
        .route("/admin/auto-hide", post(admin_auto_hide))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/time", get(server_time))
        .route(
            "/api/rooms/{code}",
            get(get_room).put(create_room).delete(delete_room),
        )
        .route("/api/rooms/{code}/update", post(update_room))
        .route("/api/rooms/{code}/rounds", get(list_rounds).post(add_round))
        .route(
            "/api/rooms/{code}/rounds/{round_id}",
            get(get_round).delete(delete_round),
        )
        .route(
            "/api/rooms/{code}/rounds/{round_id}/update",
            post(update_round),
        )
        .route("/api/rooms/{code}/rounds/{round_id}/claim", post(claim_marker))
        .route("/api/reports", post(add_report))
        .route("/api/capacity", get(get_capacity))
        .route("/api/capacity/increment", post(increment_capacity))
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            abuse::abuse_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}

/// GET /api/time
pub async fn server_time(State(state): State<Arc<AppState>>) -> Json<ServerTimeResponse> {
    Json(ServerTimeResponse {
        server_now: state.store.now(),
    })
}

/// GET /api/rooms/{code}
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<RoomCode>,
) -> ApiResult<Json<Room>> {
    let room = state
        .store
        .get_room(&code)
        .await?
        .ok_or_else(|| room_not_found(&code))?;
    Ok(Json(room))
}

/// PUT /api/rooms/{code}
///
/// Set-if-absent: 201 when created, 409 when the code is taken.
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<RoomCode>,
    Json(room): Json<Room>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    if room.code != code {
        return Err(ApiError::BadRequest(format!(
            "room code {} does not match path {}",
            room.code, code
        )));
    }
    let created = state.store.create_room(room).await?;
    let status = if created {
        tracing::info!("Room {} created", code);
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(CreatedResponse { created })))
}

/// POST /api/rooms/{code}/update
pub async fn update_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<RoomCode>,
    Json(updates): Json<Vec<RoomUpdate>>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.store.update_room(&code, updates).await?))
}

/// DELETE /api/rooms/{code}
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<RoomCode>,
) -> ApiResult<StatusCode> {
    state.store.delete_room(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/rooms/{code}/rounds
pub async fn list_rounds(
    State(state): State<Arc<AppState>>,
    Path(code): Path<RoomCode>,
) -> ApiResult<Json<Vec<Round>>> {
    Ok(Json(state.store.list_rounds(&code).await?))
}

/// POST /api/rooms/{code}/rounds
pub async fn add_round(
    State(state): State<Arc<AppState>>,
    Path(code): Path<RoomCode>,
    Json(round): Json<NewRound>,
) -> ApiResult<(StatusCode, Json<Round>)> {
    let round = state.store.add_round(&code, round).await?;
    Ok((StatusCode::CREATED, Json(round)))
}

/// GET /api/rooms/{code}/rounds/{round_id}
pub async fn get_round(
    State(state): State<Arc<AppState>>,
    Path((code, round_id)): Path<(RoomCode, RoundId)>,
) -> ApiResult<Json<Round>> {
    let round = state
        .store
        .get_round(&code, &round_id)
        .await?
        .ok_or_else(|| round_not_found(&round_id))?;
    Ok(Json(round))
}

/// DELETE /api/rooms/{code}/rounds/{round_id}
pub async fn delete_round(
    State(state): State<Arc<AppState>>,
    Path((code, round_id)): Path<(RoomCode, RoundId)>,
) -> ApiResult<StatusCode> {
    state.store.delete_round(&code, &round_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/rooms/{code}/rounds/{round_id}/update
pub async fn update_round(
    State(state): State<Arc<AppState>>,
    Path((code, round_id)): Path<(RoomCode, RoundId)>,
    Json(updates): Json<Vec<RoundUpdate>>,
) -> ApiResult<Json<Round>> {
    Ok(Json(state.store.update_round(&code, &round_id, updates).await?))
}

/// POST /api/rooms/{code}/rounds/{round_id}/claim
pub async fn claim_marker(
    State(state): State<Arc<AppState>>,
    Path((code, round_id)): Path<(RoomCode, RoundId)>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<Json<Claim>> {
    let claim = state
        .store
        .claim_round_marker(&code, &round_id, request.marker)
        .await?;
    Ok(Json(claim))
}

/// POST /api/reports
pub async fn add_report(
    State(state): State<Arc<AppState>>,
    Json(report): Json<NewReport>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let report = state.store.add_report(report).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/capacity
pub async fn get_capacity(State(state): State<Arc<AppState>>) -> ApiResult<Json<GlobalCapacity>> {
    Ok(Json(state.store.get_capacity().await?))
}

/// POST /api/capacity/increment
pub async fn increment_capacity(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IncrementRequest>,
) -> ApiResult<Json<GlobalCapacity>> {
    if request.delta.unsigned_abs() > 1 {
        return Err(ApiError::BadRequest("delta must be -1, 0 or 1".to_string()));
    }
    Ok(Json(state.store.increment_capacity(request.delta).await?))
}

/// GET /admin/reports
pub async fn admin_list_reports(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(state.store.list_reports().await?))
}

/// GET /admin/rooms
pub async fn admin_list_rooms(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Room>>> {
    Ok(Json(state.store.list_rooms().await?))
}

/// POST /admin/cleanup
pub async fn admin_cleanup(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<jobs::CleanupReport>> {
    let report = jobs::cleanup_stale_data(state.store.as_ref(), &state.config).await?;
    tracing::info!("Manual cleanup: {:?}", report);
    Ok(Json(report))
}

/// POST /admin/auto-hide
pub async fn admin_auto_hide(State(state): State<Arc<AppState>>) -> ApiResult<Json<AutoHideResponse>> {
    let hidden = jobs::hide_reported_submissions(
        state.store.as_ref(),
        state.config.auto_hide_report_threshold,
    )
    .await?;
    Ok(Json(AutoHideResponse { hidden }))
}
