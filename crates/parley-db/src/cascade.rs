use parley_types::models::CascadeReport;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::users::user_exists;
use crate::Database;

const OWNED_MESSAGES: &str = "SELECT id FROM messages WHERE sender_id = ?1 OR receiver_id = ?1";

impl Database {
    /// Remove a user and everything that belongs to them as one atomic unit:
    /// messages they sent or received, the notifications and history of those
    /// messages, and notifications addressed to them. Replies from other
    /// conversations to a removed message become roots of their own threads.
    pub fn delete_user(&self, user_id: Uuid) -> Result<CascadeReport> {
        let report = self.atomic("delete user", |tx| {
            if !user_exists(tx, user_id)? {
                return Err(Error::not_found("user", user_id));
            }
            cascade(tx, user_id).map_err(Error::integrity("delete user"))
        })?;

        self.cache().clear();
        info!(
            %user_id,
            messages = report.messages,
            notifications = report.notifications,
            histories = report.histories,
            "user deleted"
        );
        Ok(report)
    }
}

/// Statements run children-first so foreign keys hold after each one.
fn cascade(conn: &Connection, user_id: Uuid) -> rusqlite::Result<CascadeReport> {
    let id = user_id.to_string();

    let notifications = conn.execute(
        &format!(
            "DELETE FROM notifications WHERE user_id = ?1 OR message_id IN ({})",
            OWNED_MESSAGES
        ),
        [&id],
    )?;

    let histories = conn.execute(
        &format!("DELETE FROM message_history WHERE message_id IN ({})", OWNED_MESSAGES),
        [&id],
    )?;

    // Edits this user made to messages that survive keep their history but
    // lose the editor reference.
    conn.execute(
        "UPDATE message_history SET editor_id = NULL WHERE editor_id = ?1",
        [&id],
    )?;
    conn.execute("UPDATE messages SET edited_by = NULL WHERE edited_by = ?1", [&id])?;

    conn.execute(
        &format!(
            "UPDATE messages SET parent_id = NULL
             WHERE parent_id IN ({}) AND sender_id <> ?1 AND receiver_id <> ?1",
            OWNED_MESSAGES
        ),
        [&id],
    )?;

    let messages = conn.execute(
        "DELETE FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
        [&id],
    )?;

    conn.execute("DELETE FROM users WHERE id = ?1", [&id])?;

    Ok(CascadeReport {
        messages,
        notifications,
        histories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use parley_types::api::{EditMessage, SendMessage};

    #[test]
    fn removes_everything_owned_by_user() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let c = testing::user(&db, "c");

        let m1 = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "hi"))
            .unwrap();
        db.edit_message(m1.id, &EditMessage { content: "hello".into() }, a.id)
            .unwrap();
        let m2 = db
            .create_message(b.id, &SendMessage::new(b.id, a.id, "hey").reply_to(m1.id))
            .unwrap();
        let kept = db
            .create_message(b.id, &SendMessage::new(b.id, c.id, "unrelated"))
            .unwrap();

        let report = db.delete_user(a.id).unwrap();
        assert_eq!(
            report,
            CascadeReport {
                messages: 2,
                notifications: 2,
                histories: 1,
            }
        );

        assert!(matches!(db.get_user(a.id), Err(Error::NotFound { .. })));
        for id in [m1.id, m2.id] {
            assert!(matches!(db.get_message(id), Err(Error::NotFound { .. })));
            assert!(matches!(db.message_history(id), Err(Error::NotFound { .. })));
        }
        assert!(db.list_notifications(a.id, false).unwrap().is_empty());
        assert!(db.list_notifications(b.id, false).unwrap().is_empty());
        assert_eq!(db.list_notifications(c.id, false).unwrap().len(), 1);
        assert_eq!(db.get_message(kept.id).unwrap(), kept);

        let stats = db.stats().unwrap();
        assert_eq!((stats.users, stats.messages, stats.histories, stats.notifications), (2, 1, 0, 1));
    }

    #[test]
    fn foreign_replies_become_roots() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let c = testing::user(&db, "c");

        let root = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "root"))
            .unwrap();
        let foreign = db
            .create_message(b.id, &SendMessage::new(b.id, c.id, "fwd").reply_to(root.id))
            .unwrap();

        db.delete_user(a.id).unwrap();

        let orphan = db.get_message(foreign.id).unwrap();
        assert!(orphan.is_root());
        assert_eq!(db.assemble_thread(foreign.id).unwrap().len(), 1);
    }

    #[test]
    fn editor_reference_is_cleared_on_surviving_messages() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let c = testing::user(&db, "c");

        let m = db
            .create_message(b.id, &SendMessage::new(b.id, c.id, "draft"))
            .unwrap();
        db.edit_message(m.id, &EditMessage { content: "moderated".into() }, a.id)
            .unwrap();

        db.delete_user(a.id).unwrap();

        let survivor = db.get_message(m.id).unwrap();
        assert!(survivor.edited);
        assert_eq!(survivor.edited_by, None);
        let history = db.message_history(m.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].editor_id, None);
    }

    #[test]
    fn failed_cascade_leaves_everything_in_place() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        db.create_message(a.id, &SendMessage::new(a.id, b.id, "hi"))
            .unwrap();

        db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER keep_users BEFORE DELETE ON users
                 BEGIN SELECT RAISE(ABORT, 'users are forever'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let before = db.stats().unwrap();
        let err = db.delete_user(a.id).unwrap_err();
        assert!(matches!(err, Error::Integrity { operation: "delete user", .. }), "{err}");
        assert_eq!(db.stats().unwrap(), before);
    }

    #[test]
    fn deleting_missing_user_is_not_found() {
        let (_dir, db) = testing::open();
        assert!(matches!(
            db.delete_user(Uuid::new_v4()),
            Err(Error::NotFound { entity: "user", .. })
        ));
    }
}
