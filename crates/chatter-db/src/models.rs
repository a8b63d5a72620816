//! Database row types, mapped directly from SQLite rows.
//! Distinct from the chatter-types wire models.

use chatter_types::Id;
use chatter_types::models::Attributes;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: Id,
    pub username: String,
    pub password: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub id: Id,
    pub token: String,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomRow {
    pub id: Id,
    pub name: String,
    pub owner_id: Id,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: Id,
    pub room_id: Id,
    pub author_id: Id,
    pub kind: String,
    pub content: Value,
}

pub(crate) const USER_COLUMNS: &str = "u.id, u.username, u.password, u.attributes";
pub(crate) const ROOM_COLUMNS: &str = "r.id, r.name, r.owner_id, r.attributes";
pub(crate) const EVENT_COLUMNS: &str = "e.id, e.room_id, e.author_id, e.type, e.content";

pub(crate) fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Id> {
    row.get::<_, i64>(idx).map(Id::from_i64)
}

fn json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn attributes_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Attributes> {
    match json_at(row, idx)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Attributes::new()),
    }
}

pub(crate) fn millis_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

/// Map `USER_COLUMNS` starting at column `at`.
pub(crate) fn user_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: id_at(row, at)?,
        username: row.get(at + 1)?,
        password: row.get(at + 2)?,
        attributes: attributes_at(row, at + 3)?,
    })
}

/// Map `ROOM_COLUMNS` starting at column `at`.
pub(crate) fn room_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: id_at(row, at)?,
        name: row.get(at + 1)?,
        owner_id: id_at(row, at + 2)?,
        attributes: attributes_at(row, at + 3)?,
    })
}

/// Map `EVENT_COLUMNS` starting at column `at`.
pub(crate) fn event_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: id_at(row, at)?,
        room_id: id_at(row, at + 1)?,
        author_id: id_at(row, at + 2)?,
        kind: row.get(at + 3)?,
        content: json_at(row, at + 4)?,
    })
}
