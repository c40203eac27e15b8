//! Row mapping between SQLite columns and `parley_types` models.
//!
//! Ids are stored as hyphenated UUID text. Timestamps are stored as
//! fixed-width RFC 3339 UTC strings with microsecond precision, so string
//! order in SQL is chronological order.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use parley_types::models::{Message, MessageHistory, Notification, UnreadMessage, User};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub(crate) const USER_COLUMNS: &str = "id, username, email, created_at";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, created_at, edited, edited_by, parent_id";

pub(crate) const HISTORY_COLUMNS: &str = "id, message_id, old_content, edited_at, editor_id";

pub(crate) const NOTIFICATION_COLUMNS: &str = "id, user_id, message_id, created_at, is_read";

/// Current time truncated to what storage keeps, so a value returned from a
/// write compares equal to the same value read back later.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        // Rows written by SQLite's datetime('now') carry no timezone.
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: timestamp_at(row, 3)?,
    })
}

/// Maps the `MESSAGE_COLUMNS` projection.
pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        receiver_id: uuid_at(row, 2)?,
        content: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
        edited: row.get(5)?,
        edited_by: opt_uuid_at(row, 6)?,
        parent_id: opt_uuid_at(row, 7)?,
    })
}

pub(crate) fn history_from_row(row: &Row<'_>) -> rusqlite::Result<MessageHistory> {
    Ok(MessageHistory {
        id: uuid_at(row, 0)?,
        message_id: uuid_at(row, 1)?,
        old_content: row.get(2)?,
        edited_at: timestamp_at(row, 3)?,
        editor_id: opt_uuid_at(row, 4)?,
    })
}

pub(crate) fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        message_id: uuid_at(row, 2)?,
        created_at: timestamp_at(row, 3)?,
        is_read: row.get(4)?,
    })
}

pub(crate) fn unread_from_row(row: &Row<'_>) -> rusqlite::Result<UnreadMessage> {
    Ok(UnreadMessage {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        content: row.get(2)?,
        created_at: timestamp_at(row, 3)?,
    })
}
