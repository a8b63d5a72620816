//! The sync engine.
//!
//! A sync window is `(lastAck, ack]` where `ack` is a boundary ID for the
//! current millisecond, taken before any event is read. Events stamped in
//! that same millisecond sort above `ack` and are left for the next sync, so
//! an event is delivered late rather than twice or never.
//!
//! Each room contributes at most [`SYNC_EVENT_LIMIT`] events per call, newest
//! first. A room that received more than that since `lastAck` only yields its
//! newest slice; the older remainder is reachable through room history.

use std::collections::{BTreeMap, BTreeSet};

use chatter_db::{Database, DbError, events, members, users};
use chatter_types::Id;
use chatter_types::api::SyncResponse;
use chatter_types::models::Me;
use rusqlite::Connection;
use thiserror::Error;
use tracing::debug;

use crate::convert::{ConvertError, convert_event, convert_room, convert_user};

/// Per-room cap on events returned by one sync call.
pub const SYNC_EVENT_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("malformed lastAck {0:?}")]
    MalformedAck(String),

    /// The session outlived its user. Not something the client can fix.
    #[error("user {0} no longer exists")]
    UnknownUser(Id),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Parse the client's `lastAck`. Absent or empty means "never synced".
pub fn parse_watermark(raw: Option<&str>) -> Result<Option<Id>, SyncError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| SyncError::MalformedAck(s.to_string())),
    }
}

pub fn sync(db: &Database, user_id: Id, last_ack: Option<Id>) -> Result<SyncResponse, SyncError> {
    let ack = db.watermark()?;
    let response = db.with_conn(|conn| collect(conn, user_id, last_ack, ack))?;

    debug!(
        "Synced user {} over ({}, {}]: {} rooms, {} events",
        user_id,
        last_ack.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
        ack,
        response.events.len(),
        response.events.values().map(Vec::len).sum::<usize>()
    );
    Ok(response)
}

/// Build the response from a single read transaction so the room scope and
/// the events agree with each other.
fn collect(
    conn: &Connection,
    user_id: Id,
    last_ack: Option<Id>,
    ack: Id,
) -> Result<SyncResponse, SyncError> {
    let tx = conn.unchecked_transaction().map_err(DbError::from)?;

    let me = users::get_user_by_id(&tx, user_id)?.ok_or(SyncError::UnknownUser(user_id))?;
    let owned = members::rooms_owned_by(&tx, user_id)?;
    let joined = members::rooms_joined_by(&tx, user_id)?;

    // Owners always hold a membership row, but the union costs nothing.
    let scope: BTreeSet<Id> = owned
        .iter()
        .chain(joined.iter())
        .map(|(room, _)| room.id)
        .collect();

    let mut room_events = BTreeMap::new();
    for room_id in scope {
        let rows = events::query_range(&tx, room_id, last_ack, ack, SYNC_EVENT_LIMIT)?;
        let converted = rows
            .into_iter()
            .map(|(event, author)| convert_event(event, author))
            .collect::<Result<Vec<_>, _>>()?;
        room_events.insert(room_id, converted);
    }

    let owns_rooms = owned
        .into_iter()
        .map(|(room, owner)| convert_room(room, owner))
        .collect::<Result<Vec<_>, _>>()?;
    let joined_rooms = joined
        .into_iter()
        .map(|(room, owner)| convert_room(room, owner))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SyncResponse {
        ack,
        me: Me {
            user: convert_user(me),
            owns_rooms,
            joined_rooms,
        },
        events: room_events,
    })
}
