use chatter_types::Id;
use chatter_types::models::{Attributes, merge_attributes};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::is_unique_violation;
use crate::models::{USER_COLUMNS, UserRow, user_from_row};
use crate::{Database, DbError, Result};

impl Database {
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow> {
        self.with_conn_mut(|conn| create_user(conn, username, password_hash))
    }

    pub fn get_user_by_id(&self, id: Id) -> Result<Option<UserRow>> {
        self.with_conn(|conn| get_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| get_user_by_username(conn, username))
    }

    pub fn update_user(
        &self,
        id: Id,
        username: Option<&str>,
        attributes: Option<Attributes>,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| update_user(conn, id, username, attributes))
    }
}

pub fn create_user(conn: &Connection, username: &str, password_hash: &str) -> Result<UserRow> {
    let user = UserRow {
        id: Id::generate(),
        username: username.to_string(),
        password: password_hash.to_string(),
        attributes: Attributes::new(),
    };

    conn.execute(
        "INSERT INTO users (id, username, password, attributes) VALUES (?1, ?2, ?3, '{}')",
        (user.id.as_i64(), &user.username, &user.password),
    )
    .map_err(|e| username_conflict(e, username))?;

    info!("Created user {} ({})", user.username, user.id);
    Ok(user)
}

pub fn get_user_by_id(conn: &Connection, id: Id) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
    let row = conn
        .query_row(&sql, [id.as_i64()], |row| user_from_row(row, 0))
        .optional()?;
    Ok(row)
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE u.username = ?1", USER_COLUMNS);
    let row = conn
        .query_row(&sql, [username], |row| user_from_row(row, 0))
        .optional()?;
    Ok(row)
}

/// Rename and/or shallow-merge attributes.
pub fn update_user(
    conn: &Connection,
    id: Id,
    username: Option<&str>,
    attributes: Option<Attributes>,
) -> Result<UserRow> {
    let tx = conn.unchecked_transaction()?;

    let mut user = get_user_by_id(&tx, id)?.ok_or(DbError::NotFound("user"))?;
    if let Some(username) = username {
        user.username = username.to_string();
    }
    if let Some(patch) = attributes {
        merge_attributes(&mut user.attributes, patch);
    }

    tx.execute(
        "UPDATE users SET username = ?1, attributes = ?2 WHERE id = ?3",
        (
            &user.username,
            serde_json::to_string(&user.attributes)?,
            id.as_i64(),
        ),
    )
    .map_err(|e| username_conflict(e, &user.username))?;

    tx.commit()?;
    Ok(user)
}

fn username_conflict(err: rusqlite::Error, username: &str) -> DbError {
    if is_unique_violation(&err) {
        DbError::Conflict(format!("username {:?} is already taken", username))
    } else {
        err.into()
    }
}
