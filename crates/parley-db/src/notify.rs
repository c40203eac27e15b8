//! Notification dispatch and read tracking.

use parley_types::models::{Message, Notification};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{NOTIFICATION_COLUMNS, format_timestamp, notification_from_row};
use crate::Database;

/// Issue the single notification owed to the receiver of a freshly inserted
/// message. Called only from the insert path, inside its transaction; edits
/// never reach here. No deduplication: one call, one row.
pub(crate) fn dispatch_created(conn: &Connection, message: &Message) -> Result<Notification> {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id: message.receiver_id,
        message_id: message.id,
        created_at: message.created_at,
        is_read: false,
    };
    conn.execute(
        "INSERT INTO notifications (id, user_id, message_id, created_at, is_read)
         VALUES (?1, ?2, ?3, ?4, 0)",
        (
            notification.id.to_string(),
            notification.user_id.to_string(),
            notification.message_id.to_string(),
            format_timestamp(&notification.created_at),
        ),
    )
    .map_err(Error::integrity("dispatch notification"))?;

    Ok(notification)
}

impl Database {
    // -- Notifications --

    /// Notifications addressed to `user_id`, newest first.
    pub fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM notifications
                 WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, rowid DESC",
                NOTIFICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((user_id.to_string(), unread_only), notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark one of `user_id`'s notifications read. Marking an already read
    /// notification succeeds without change.
    pub fn mark_notification_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Notification> {
        let notification = self.atomic("mark notification read", |tx| {
            let updated = tx.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                (notification_id.to_string(), user_id.to_string()),
            )?;
            if updated == 0 {
                return Err(Error::not_found("notification", notification_id));
            }
            query_notification(tx, notification_id)?
                .ok_or_else(|| Error::not_found("notification", notification_id))
        })?;

        self.cache().invalidate_unread(user_id);
        debug!(%user_id, %notification_id, "notification marked read");
        Ok(notification)
    }
}

fn query_notification(conn: &Connection, id: Uuid) -> Result<Option<Notification>> {
    let sql = format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS);
    Ok(conn
        .query_row(&sql, [id.to_string()], notification_from_row)
        .optional()?)
}
