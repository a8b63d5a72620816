use chatter_types::Id;
use chatter_types::events::{EventContent, RoomUpdate};
use chatter_types::models::{Attributes, merge_attributes};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::events::append;
use crate::members::add_member;
use crate::models::{ROOM_COLUMNS, RoomRow, USER_COLUMNS, UserRow, room_from_row, user_from_row};
use crate::{Database, DbError, Result};

/// Filters for room listing. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub query: Option<String>,
    pub owner_id: Option<Id>,
    pub before: Option<Id>,
    pub limit: u32,
}

impl Database {
    /// Create a room owned by `owner_id`, together with the owner's
    /// membership and join event.
    pub fn create_room(&self, owner_id: Id, name: &str, attributes: Attributes) -> Result<RoomRow> {
        let room = self.with_conn_mut(|conn| create_room(conn, owner_id, name, attributes))?;
        info!("Created room {} ({}) for user {}", room.name, room.id, owner_id);
        Ok(room)
    }

    pub fn get_room(&self, id: Id) -> Result<Option<(RoomRow, UserRow)>> {
        self.with_conn(|conn| get_room(conn, id))
    }

    pub fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<(RoomRow, UserRow)>> {
        self.with_conn(|conn| list_rooms(conn, filter))
    }

    pub fn update_room(
        &self,
        id: Id,
        actor_id: Id,
        name: Option<&str>,
        attributes: Option<Attributes>,
    ) -> Result<RoomRow> {
        self.with_conn_mut(|conn| update_room(conn, id, actor_id, name, attributes))
    }

    pub fn delete_room(&self, id: Id, actor_id: Id) -> Result<()> {
        self.with_conn_mut(|conn| delete_room(conn, id, actor_id))?;
        info!("Deleted room {} by user {}", id, actor_id);
        Ok(())
    }
}

pub fn create_room(
    conn: &Connection,
    owner_id: Id,
    name: &str,
    attributes: Attributes,
) -> Result<RoomRow> {
    let tx = conn.unchecked_transaction()?;

    let room = RoomRow {
        id: Id::generate(),
        name: name.to_string(),
        owner_id,
        attributes,
    };
    tx.execute(
        "INSERT INTO rooms (id, name, owner_id, attributes) VALUES (?1, ?2, ?3, ?4)",
        (
            room.id.as_i64(),
            &room.name,
            owner_id.as_i64(),
            serde_json::to_string(&room.attributes)?,
        ),
    )?;
    add_member(&tx, room.id, owner_id)?;

    tx.commit()?;
    Ok(room)
}

pub fn room_exists(conn: &Connection, id: Id) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM rooms WHERE id = ?1", [id.as_i64()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub fn get_room_row(conn: &Connection, id: Id) -> Result<Option<RoomRow>> {
    let sql = format!("SELECT {} FROM rooms r WHERE r.id = ?1", ROOM_COLUMNS);
    let row = conn
        .query_row(&sql, [id.as_i64()], |row| room_from_row(row, 0))
        .optional()?;
    Ok(row)
}

pub fn get_room(conn: &Connection, id: Id) -> Result<Option<(RoomRow, UserRow)>> {
    let sql = format!(
        "SELECT {}, {} FROM rooms r JOIN users u ON u.id = r.owner_id WHERE r.id = ?1",
        ROOM_COLUMNS, USER_COLUMNS
    );
    let row = conn
        .query_row(&sql, [id.as_i64()], |row| {
            Ok((room_from_row(row, 0)?, user_from_row(row, 4)?))
        })
        .optional()?;
    Ok(row)
}

/// Newest rooms first, narrowed by `filter`.
pub fn list_rooms(conn: &Connection, filter: &RoomFilter) -> Result<Vec<(RoomRow, UserRow)>> {
    let sql = format!(
        "SELECT {}, {}
         FROM rooms r
         JOIN users u ON u.id = r.owner_id
         WHERE (?1 IS NULL OR r.name LIKE '%' || ?1 || '%' ESCAPE '\\')
           AND (?2 IS NULL OR r.owner_id = ?2)
           AND (?3 IS NULL OR r.id < ?3)
         ORDER BY r.id DESC
         LIMIT ?4",
        ROOM_COLUMNS, USER_COLUMNS
    );
    let pattern = filter.query.as_deref().map(escape_like);

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(
            (
                pattern,
                filter.owner_id.map(|id| id.as_i64()),
                filter.before.map(|id| id.as_i64()),
                filter.limit,
            ),
            |row| Ok((room_from_row(row, 0)?, user_from_row(row, 4)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Owner-only rename and attribute merge. Records an `update_room` event
/// carrying the patch in the same transaction.
pub fn update_room(
    conn: &Connection,
    id: Id,
    actor_id: Id,
    name: Option<&str>,
    attributes: Option<Attributes>,
) -> Result<RoomRow> {
    let tx = conn.unchecked_transaction()?;

    let mut room = get_room_row(&tx, id)?.ok_or(DbError::NotFound("room"))?;
    if room.owner_id != actor_id {
        return Err(DbError::Forbidden("only the room owner can change the room"));
    }
    if name.is_none() && attributes.is_none() {
        return Ok(room);
    }

    if let Some(name) = name {
        room.name = name.to_string();
    }
    if let Some(patch) = attributes.clone() {
        merge_attributes(&mut room.attributes, patch);
    }

    tx.execute(
        "UPDATE rooms SET name = ?1, attributes = ?2 WHERE id = ?3",
        (
            &room.name,
            serde_json::to_string(&room.attributes)?,
            id.as_i64(),
        ),
    )?;

    let update = RoomUpdate {
        name: name.map(str::to_string),
        attributes,
    };
    append(&tx, id, actor_id, &EventContent::UpdateRoom(update))?;

    tx.commit()?;
    Ok(room)
}

/// Owner-only. Memberships and events go with the room.
pub fn delete_room(conn: &Connection, id: Id, actor_id: Id) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    let room = get_room_row(&tx, id)?.ok_or(DbError::NotFound("room"))?;
    if room.owner_id != actor_id {
        return Err(DbError::Forbidden("only the room owner can delete the room"));
    }

    tx.execute("DELETE FROM rooms WHERE id = ?1", [id.as_i64()])?;
    tx.commit()?;
    Ok(())
}
