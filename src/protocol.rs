//! Wire messages of the store host: HTTP bodies and the change-feed socket

use crate::store::{RoundMarker, StoreEvent};
use crate::types::*;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

/// Messages a change-feed client may send
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Switch the room filter; `None` receives every event
    Subscribe { room: Option<String> },
    Ping,
}

/// Messages pushed to change-feed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        room: Option<RoomCode>,
        /// Store time, so clients can correct their clock skew
        server_now: Timestamp,
    },
    Event {
        event: StoreEvent,
    },
    /// Events were dropped; the client should re-read its documents
    Resync {
        skipped: u64,
    },
    Pong {
        server_now: Timestamp,
    },
    Error {
        code: String,
        msg: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimRequest {
    pub marker: RoundMarker,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncrementRequest {
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedResponse {
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerTimeResponse {
    pub server_now: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoHideResponse {
    pub hidden: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}
