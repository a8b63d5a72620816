//! Membership index: which users belong to which rooms.
//!
//! Joining writes the membership row and its `member_join` event in one
//! transaction, so readers never see one without the other.

use chatter_types::Id;
use chatter_types::events::{EventContent, Membership};
use rusqlite::Connection;
use tracing::info;

use crate::error::is_unique_violation;
use crate::events::append;
use crate::models::{ROOM_COLUMNS, RoomRow, USER_COLUMNS, UserRow, room_from_row, user_from_row};
use crate::rooms::{get_room_row, room_exists};
use crate::{Database, DbError, Result};

impl Database {
    /// Join `user_id` to `room_id` if not already a member. Returns whether a
    /// new membership was created.
    pub fn ensure_member(&self, room_id: Id, user_id: Id) -> Result<bool> {
        let joined = self.with_conn_mut(|conn| ensure_member(conn, room_id, user_id))?;
        if joined {
            info!("User {} joined room {}", user_id, room_id);
        }
        Ok(joined)
    }

    pub fn leave_room(&self, room_id: Id, user_id: Id) -> Result<()> {
        self.with_conn_mut(|conn| leave_room(conn, room_id, user_id))?;
        info!("User {} left room {}", user_id, room_id);
        Ok(())
    }

    pub fn rooms_owned_by(&self, user_id: Id) -> Result<Vec<(RoomRow, UserRow)>> {
        self.with_conn(|conn| rooms_owned_by(conn, user_id))
    }

    pub fn rooms_joined_by(&self, user_id: Id) -> Result<Vec<(RoomRow, UserRow)>> {
        self.with_conn(|conn| rooms_joined_by(conn, user_id))
    }
}

pub fn ensure_member(conn: &Connection, room_id: Id, user_id: Id) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    if !room_exists(&tx, room_id)? {
        return Err(DbError::NotFound("room"));
    }

    let joined = add_member(&tx, room_id, user_id)?;
    if joined {
        tx.commit()?;
    }
    Ok(joined)
}

/// Insert the membership row and its join event on an open transaction.
/// A duplicate row means someone else already joined this user: not an error.
pub(crate) fn add_member(conn: &Connection, room_id: Id, user_id: Id) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO room_members (room_id, user_id) VALUES (?1, ?2)",
        (room_id.as_i64(), user_id.as_i64()),
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Ok(false),
        Err(e) => return Err(e.into()),
    }

    append(conn, room_id, user_id, &EventContent::MemberJoin(Membership {}))?;
    Ok(true)
}

pub fn leave_room(conn: &Connection, room_id: Id, user_id: Id) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    let room = get_room_row(&tx, room_id)?.ok_or(DbError::NotFound("room"))?;
    if room.owner_id == user_id {
        return Err(DbError::Forbidden("the room owner cannot leave the room"));
    }

    let removed = tx.execute(
        "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
        (room_id.as_i64(), user_id.as_i64()),
    )?;
    if removed == 0 {
        return Err(DbError::NotFound("membership"));
    }

    append(&tx, room_id, user_id, &EventContent::MemberLeave(Membership {}))?;
    tx.commit()?;
    Ok(())
}

/// Rooms whose owner is `user_id`, each with its owner.
pub fn rooms_owned_by(conn: &Connection, user_id: Id) -> Result<Vec<(RoomRow, UserRow)>> {
    let sql = format!(
        "SELECT {}, {}
         FROM rooms r
         JOIN users u ON u.id = r.owner_id
         WHERE r.owner_id = ?1
         ORDER BY r.id",
        ROOM_COLUMNS, USER_COLUMNS
    );
    query_rooms(conn, &sql, user_id)
}

/// Rooms with a membership row for `user_id`, each with its owner.
pub fn rooms_joined_by(conn: &Connection, user_id: Id) -> Result<Vec<(RoomRow, UserRow)>> {
    let sql = format!(
        "SELECT {}, {}
         FROM room_members m
         JOIN rooms r ON r.id = m.room_id
         JOIN users u ON u.id = r.owner_id
         WHERE m.user_id = ?1
         ORDER BY r.id",
        ROOM_COLUMNS, USER_COLUMNS
    );
    query_rooms(conn, &sql, user_id)
}

fn query_rooms(conn: &Connection, sql: &str, user_id: Id) -> Result<Vec<(RoomRow, UserRow)>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map([user_id.as_i64()], |row| {
            Ok((room_from_row(row, 0)?, user_from_row(row, 4)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use std::sync::Arc;

    fn is_member(db: &Database, room_id: Id, user_id: Id) -> bool {
        db.rooms_joined_by(user_id)
            .unwrap()
            .iter()
            .any(|(room, _)| room.id == room_id)
    }

    fn count_kind(db: &Database, room_id: Id, kind: &str) -> usize {
        db.query_by_room(room_id, None, 1000)
            .unwrap()
            .iter()
            .filter(|(e, _)| e.kind == kind)
            .count()
    }

    #[test]
    fn owner_is_member_from_creation() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let lobby = room(&db, &alice, "lobby");

        assert!(is_member(&db, lobby.id, alice.id));
        assert_eq!(count_kind(&db, lobby.id, "member_join"), 1);
    }

    #[test]
    fn ensure_member_is_idempotent() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let lobby = room(&db, &alice, "lobby");

        assert!(db.ensure_member(lobby.id, bob.id).unwrap());
        assert!(!db.ensure_member(lobby.id, bob.id).unwrap());
        assert!(!db.ensure_member(lobby.id, alice.id).unwrap());

        // owner join + bob's join
        assert_eq!(count_kind(&db, lobby.id, "member_join"), 2);
    }

    #[test]
    fn concurrent_joins_produce_one_row_and_one_event() {
        let (_dir, db) = temp_db();
        let db = Arc::new(db);
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let lobby = room(&db, &alice, "lobby");
        let (room_id, user_id) = (lobby.id, bob.id);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.ensure_member(room_id, user_id).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|joined| *joined)
            .count();

        assert_eq!(winners, 1);
        let rows: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                    (lobby.id.as_i64(), bob.id.as_i64()),
                    |r| r.get(0),
                )
                .map_err(DbError::from)
            })
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(count_kind(&db, lobby.id, "member_join"), 2);
    }

    #[test]
    fn joining_missing_room_is_not_found() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");

        let err = db.ensure_member(Id::generate(), alice.id).unwrap_err();
        assert!(matches!(err, DbError::NotFound("room")));
    }

    #[test]
    fn owner_cannot_leave() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let lobby = room(&db, &alice, "lobby");

        let err = db.leave_room(lobby.id, alice.id).unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));
        assert!(is_member(&db, lobby.id, alice.id));
        assert!(db.get_room(lobby.id).unwrap().is_some());
    }

    #[test]
    fn leave_removes_membership_and_records_it() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let lobby = room(&db, &alice, "lobby");
        db.ensure_member(lobby.id, bob.id).unwrap();

        db.leave_room(lobby.id, bob.id).unwrap();
        assert!(!is_member(&db, lobby.id, bob.id));
        assert_eq!(count_kind(&db, lobby.id, "member_leave"), 1);

        let err = db.leave_room(lobby.id, bob.id).unwrap_err();
        assert!(matches!(err, DbError::NotFound("membership")));
    }

    #[test]
    fn owned_and_joined_sets() {
        let (_dir, db) = temp_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let mine = room(&db, &alice, "mine");
        let theirs = room(&db, &bob, "theirs");
        db.ensure_member(theirs.id, alice.id).unwrap();

        let owned: Vec<Id> = db.rooms_owned_by(alice.id).unwrap().iter().map(|(r, _)| r.id).collect();
        assert_eq!(owned, vec![mine.id]);

        let joined = db.rooms_joined_by(alice.id).unwrap();
        let ids: Vec<Id> = joined.iter().map(|(r, _)| r.id).collect();
        assert_eq!(ids, vec![mine.id, theirs.id]);
        assert_eq!(joined[1].1.username, "bob");
    }
}
