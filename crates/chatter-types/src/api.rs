use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;
use crate::models::{Attributes, Event, Me, Room};

/// Body of every failed response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by both register and login.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Id,
    pub token: String,
    #[serde(rename = "userID")]
    pub user_id: Id,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub attributes: Option<Attributes>,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub attributes: Option<Attributes>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRoomsQuery {
    /// Case-insensitive substring of the room name.
    pub query: Option<String>,
    #[serde(rename = "ownerID")]
    pub owner_id: Option<Id>,
    /// Cursor: only rooms with an ID below this one.
    pub before: Option<Id>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ListRoomsResponse {
    pub rooms: Vec<Room>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

// -- Events --

#[derive(Debug, Default, Deserialize)]
pub struct RoomEventsQuery {
    pub before: Option<Id>,
    pub limit: Option<u32>,
}

// -- Sync --

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    /// Watermark from the previous sync; absent on first sync. Parsed by the
    /// handler so a malformed value gets its own error message.
    #[serde(rename = "lastAck")]
    pub last_ack: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// Watermark to send as `lastAck` next time.
    pub ack: Id,
    pub me: Me,
    /// Room ID -> events newer than `lastAck`, newest first.
    pub events: BTreeMap<Id, Vec<Event>>,
}
