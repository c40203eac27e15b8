//! Edit tracking.
//!
//! `intercept_edit` runs inside the edit transaction, after the stored
//! pre-image has been read under the writer lock and before the new content
//! is written. It is the only place history rows are created.

use chrono::{DateTime, Utc};
use parley_types::models::{Message, MessageHistory};
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{HISTORY_COLUMNS, format_timestamp, history_from_row};
use crate::Database;

/// Compare the stored message with the in-flight mutation. When the content
/// differs, mark the mutation edited and append one history row holding the
/// replaced content. Identical content leaves both untouched.
pub(crate) fn intercept_edit(
    conn: &Connection,
    stored: &Message,
    in_flight: &mut Message,
    editor: Uuid,
    at: DateTime<Utc>,
) -> Result<Option<MessageHistory>> {
    if stored.content.as_bytes() == in_flight.content.as_bytes() {
        return Ok(None);
    }

    in_flight.edited = true;
    in_flight.edited_by = Some(editor);

    let entry = MessageHistory {
        id: Uuid::new_v4(),
        message_id: stored.id,
        old_content: stored.content.clone(),
        edited_at: at,
        editor_id: Some(editor),
    };
    conn.execute(
        "INSERT INTO message_history (id, message_id, old_content, edited_at, editor_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            entry.id.to_string(),
            entry.message_id.to_string(),
            &entry.old_content,
            format_timestamp(&entry.edited_at),
            editor.to_string(),
        ),
    )
    .map_err(Error::integrity("append message history"))?;

    Ok(Some(entry))
}

impl Database {
    /// Every content snapshot a message has gone through, oldest first.
    pub fn message_history(&self, message_id: Uuid) -> Result<Vec<MessageHistory>> {
        self.with_conn(|conn| {
            if !crate::messages::message_exists(conn, message_id)? {
                return Err(Error::not_found("message", message_id));
            }
            let sql = format!(
                "SELECT {} FROM message_history WHERE message_id = ?1 ORDER BY edited_at, rowid",
                HISTORY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([message_id.to_string()], history_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use parley_types::api::{EditMessage, SendMessage};

    fn edit(db: &Database, id: Uuid, content: &str, editor: Uuid) -> Message {
        db.edit_message(id, &EditMessage { content: content.into() }, editor)
            .unwrap()
    }

    #[test]
    fn edit_records_replaced_content() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let m1 = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "hi"))
            .unwrap();
        assert!(!m1.edited);
        assert!(db.message_history(m1.id).unwrap().is_empty());

        let edited = edit(&db, m1.id, "hello", a.id);
        assert!(edited.edited);
        assert_eq!(edited.edited_by, Some(a.id));
        assert_eq!(edited.content, "hello");
        assert_eq!(edited.created_at, m1.created_at);

        let history = db.message_history(m1.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_content, "hi");
        assert_eq!(history[0].editor_id, Some(a.id));
    }

    #[test]
    fn history_counts_only_content_changes() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let m = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "v0"))
            .unwrap();

        for content in ["v1", "v1", "v2", "v2", "v2", "v1"] {
            edit(&db, m.id, content, a.id);
        }

        let old: Vec<String> = db
            .message_history(m.id)
            .unwrap()
            .into_iter()
            .map(|h| h.old_content)
            .collect();
        assert_eq!(old, ["v0", "v1", "v2"]);
        assert_eq!(db.get_message(m.id).unwrap().content, "v1");
    }

    #[test]
    fn unchanged_edit_leaves_flag_alone() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let m = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "same"))
            .unwrap();

        let after = edit(&db, m.id, "same", b.id);
        assert!(!after.edited);
        assert_eq!(after.edited_by, None);
        assert!(db.message_history(m.id).unwrap().is_empty());
    }

    #[test]
    fn failed_history_append_rolls_back_edit() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let m = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "original"))
            .unwrap();

        db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_history BEFORE INSERT ON message_history
                 BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = db
            .edit_message(m.id, &EditMessage { content: "changed".into() }, a.id)
            .unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }), "{err}");

        let stored = db.get_message(m.id).unwrap();
        assert_eq!(stored.content, "original");
        assert!(!stored.edited);
    }

    #[test]
    fn history_of_missing_message_is_not_found() {
        let (_dir, db) = testing::open();
        assert!(matches!(
            db.message_history(Uuid::new_v4()),
            Err(Error::NotFound { entity: "message", .. })
        ));
    }
}
