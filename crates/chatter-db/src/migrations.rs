use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id          INTEGER PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                attributes  TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE sessions (
                id          INTEGER PRIMARY KEY,
                token       TEXT NOT NULL UNIQUE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  INTEGER NOT NULL,
                expires_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_sessions_expiry ON sessions(expires_at);

            CREATE TABLE rooms (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL,
                owner_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                attributes  TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX idx_rooms_owner ON rooms(owner_id);

            CREATE TABLE room_members (
                room_id     INTEGER NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (room_id, user_id)
            );

            CREATE INDEX idx_room_members_user ON room_members(user_id);

            CREATE TABLE events (
                id          INTEGER PRIMARY KEY,
                room_id     INTEGER NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type        TEXT NOT NULL,
                content     TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX idx_events_room ON events(room_id, id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
