//! Append-only room event log.
//!
//! Rows are never updated or deleted individually; edits and deletions are
//! themselves new events. Rows only disappear when their room is deleted.

use chatter_types::Id;
use chatter_types::events::EventContent;
use rusqlite::Connection;

use crate::models::{EVENT_COLUMNS, EventRow, USER_COLUMNS, UserRow, event_from_row, user_from_row};
use crate::rooms::room_exists;
use crate::{Database, DbError, Result};

impl Database {
    pub fn append_event(
        &self,
        room_id: Id,
        author_id: Id,
        content: &EventContent,
    ) -> Result<EventRow> {
        self.with_conn_mut(|conn| append(conn, room_id, author_id, content))
    }

    pub fn query_range(
        &self,
        room_id: Id,
        after: Option<Id>,
        until: Id,
        limit: u32,
    ) -> Result<Vec<(EventRow, UserRow)>> {
        self.with_conn(|conn| query_range(conn, room_id, after, until, limit))
    }

    pub fn query_by_room(
        &self,
        room_id: Id,
        before: Option<Id>,
        limit: u32,
    ) -> Result<Vec<(EventRow, UserRow)>> {
        self.with_conn(|conn| query_by_room(conn, room_id, before, limit))
    }
}

/// Store a new event with a freshly generated ID. Must run on the writer.
pub fn append(
    conn: &Connection,
    room_id: Id,
    author_id: Id,
    content: &EventContent,
) -> Result<EventRow> {
    if !room_exists(conn, room_id)? {
        return Err(DbError::NotFound("room"));
    }

    let event = EventRow {
        id: Id::generate(),
        room_id,
        author_id,
        kind: content.kind().as_str().to_string(),
        content: content.body()?,
    };

    conn.execute(
        "INSERT INTO events (id, room_id, author_id, type, content) VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            event.id.as_i64(),
            room_id.as_i64(),
            author_id.as_i64(),
            &event.kind,
            serde_json::to_string(&event.content)?,
        ),
    )?;

    Ok(event)
}

/// Events with `after < id <= until`, newest first, at most `limit`, each
/// paired with its author. `after = None` means from the beginning.
pub fn query_range(
    conn: &Connection,
    room_id: Id,
    after: Option<Id>,
    until: Id,
    limit: u32,
) -> Result<Vec<(EventRow, UserRow)>> {
    if !room_exists(conn, room_id)? {
        return Err(DbError::NotFound("room"));
    }

    let sql = format!(
        "SELECT {}, {}
         FROM events e
         JOIN users u ON u.id = e.author_id
         WHERE e.room_id = ?1 AND e.id > ?2 AND e.id <= ?3
         ORDER BY e.id DESC
         LIMIT ?4",
        EVENT_COLUMNS, USER_COLUMNS
    );
    let after = after.unwrap_or(Id::zero());

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(
            (room_id.as_i64(), after.as_i64(), until.as_i64(), limit),
            |row| Ok((event_from_row(row, 0)?, user_from_row(row, 5)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// History page: events with `id < before` (or the newest if `None`),
/// newest first, at most `limit`.
pub fn query_by_room(
    conn: &Connection,
    room_id: Id,
    before: Option<Id>,
    limit: u32,
) -> Result<Vec<(EventRow, UserRow)>> {
    if !room_exists(conn, room_id)? {
        return Err(DbError::NotFound("room"));
    }

    let sql = format!(
        "SELECT {}, {}
         FROM events e
         JOIN users u ON u.id = e.author_id
         WHERE e.room_id = ?1 AND e.id < ?2
         ORDER BY e.id DESC
         LIMIT ?3",
        EVENT_COLUMNS, USER_COLUMNS
    );
    let before = before.map(|id| id.as_i64()).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map((room_id.as_i64(), before, limit), |row| {
            Ok((event_from_row(row, 0)?, user_from_row(row, 5)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
