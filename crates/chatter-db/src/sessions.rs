//! Session store: opaque bearer tokens with a sliding expiry.
//!
//! A session is renewed only once less than a quarter of its max age is left,
//! so a busy client causes one write per few days rather than one per request.
//! Expired sessions are indistinguishable from missing ones.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chatter_types::Id;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::models::{SessionRow, id_at, millis_at};
use crate::{Database, DbError, Result};

const TOKEN_BYTES: usize = 24;

impl Database {
    pub fn create_session(&self, user_id: Id, max_age: Duration) -> Result<SessionRow> {
        self.with_conn_mut(|conn| create_session(conn, user_id, max_age, Utc::now()))
    }

    /// Resolve a token to a live session, renewing it when due. The lookup
    /// goes through a reader; the writer is only touched on renewal.
    pub fn authorize(
        &self,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRow>> {
        let Some(session) = self.with_conn(|conn| find_live_session(conn, token, now))? else {
            return Ok(None);
        };

        if !needs_renewal(&session, max_age, now) {
            return Ok(Some(session));
        }
        self.with_conn_mut(|conn| renew_session(conn, session, max_age, now))
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            Ok(n > 0)
        })
    }

    pub fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                [now.timestamp_millis()],
            )?;
            Ok(n)
        })
    }
}

pub fn create_session(
    conn: &Connection,
    user_id: Id,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<SessionRow> {
    // stored with millisecond precision
    let now = now.trunc_subsecs(3);
    let session = SessionRow {
        id: Id::generate(),
        token: new_token(),
        user_id,
        created_at: now,
        expires_at: expiry(now, max_age)?,
    };

    conn.execute(
        "INSERT INTO sessions (id, token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            session.id.as_i64(),
            &session.token,
            user_id.as_i64(),
            session.created_at.timestamp_millis(),
            session.expires_at.timestamp_millis(),
        ),
    )?;

    info!("Created session {} for user {}", session.id, user_id);
    Ok(session)
}

pub fn find_live_session(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionRow>> {
    let row = conn
        .query_row(
            "SELECT id, token, user_id, created_at, expires_at
             FROM sessions
             WHERE token = ?1 AND expires_at > ?2",
            (token, now.timestamp_millis()),
            |row| {
                Ok(SessionRow {
                    id: id_at(row, 0)?,
                    token: row.get(1)?,
                    user_id: id_at(row, 2)?,
                    created_at: millis_at(row, 3)?,
                    expires_at: millis_at(row, 4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn needs_renewal(session: &SessionRow, max_age: Duration, now: DateTime<Utc>) -> bool {
    session.expires_at - now < max_age / 4
}

/// Extend a session to `now + max_age`. Returns `None` if it vanished
/// (logout or prune) since it was read.
fn renew_session(
    conn: &Connection,
    mut session: SessionRow,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<Option<SessionRow>> {
    let expires_at = expiry(now.trunc_subsecs(3), max_age)?;
    let n = conn.execute(
        "UPDATE sessions SET expires_at = ?1 WHERE id = ?2 AND expires_at > ?3",
        (
            expires_at.timestamp_millis(),
            session.id.as_i64(),
            now.timestamp_millis(),
        ),
    )?;
    if n == 0 {
        return Ok(None);
    }

    debug!("Renewed session {} until {}", session.id, expires_at);
    session.expires_at = expires_at;
    Ok(Some(session))
}

fn expiry(now: DateTime<Utc>, max_age: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(max_age)
        .ok_or(DbError::ExpiryOutOfRange(max_age))
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    B64.encode(bytes)
}
