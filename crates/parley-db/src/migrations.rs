use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (messaging schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                receiver_id TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                edited      INTEGER NOT NULL DEFAULT 0,
                edited_by   TEXT REFERENCES users(id),
                parent_id   TEXT REFERENCES messages(id)
            );

            CREATE INDEX idx_messages_receiver ON messages(receiver_id, created_at);
            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_parent ON messages(parent_id, created_at);

            CREATE TABLE message_history (
                id          TEXT PRIMARY KEY,
                message_id  TEXT NOT NULL REFERENCES messages(id),
                old_content TEXT NOT NULL,
                edited_at   TEXT NOT NULL,
                editor_id   TEXT REFERENCES users(id)
            );

            CREATE INDEX idx_history_message ON message_history(message_id, edited_at);

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                message_id  TEXT NOT NULL REFERENCES messages(id),
                created_at  TEXT NOT NULL,
                is_read     INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, is_read);
            CREATE INDEX idx_notifications_message ON notifications(message_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
