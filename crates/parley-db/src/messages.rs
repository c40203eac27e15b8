use std::sync::Arc;

use parley_types::api::{EditMessage, PageQuery, SendMessage};
use parley_types::models::{Message, MessageHistory, Notification, UnreadMessage};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::QueryKey;
use crate::error::{Error, Result};
use crate::history::intercept_edit;
use crate::models::{MESSAGE_COLUMNS, format_timestamp, message_from_row, now, unread_from_row};
use crate::notify::dispatch_created;
use crate::users::user_exists;
use crate::Database;

/// A committed send: the new message and the notification issued with it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub notification: Notification,
}

/// A committed edit. `history` is `None` when the content did not change.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub message: Message,
    pub history: Option<MessageHistory>,
}

impl Database {
    // -- Messages --

    pub fn create_message(&self, actor: Uuid, req: &SendMessage) -> Result<Message> {
        self.send_message(actor, req).map(|d| d.message)
    }

    /// Insert a message and its receiver notification as one atomic unit.
    /// `actor` is the already authenticated caller and must be the sender.
    pub fn send_message(&self, actor: Uuid, req: &SendMessage) -> Result<Delivery> {
        if actor != req.sender_id {
            warn!(%actor, sender_id = %req.sender_id, "rejected send on behalf of another user");
            return Err(Error::Permission(format!(
                "user {} cannot send messages as {}",
                actor, req.sender_id
            )));
        }
        validate_content(&req.content)?;

        let delivery = self.atomic("create message", |tx| {
            if !user_exists(tx, req.sender_id)? {
                return Err(Error::reference("sender", req.sender_id));
            }
            if !user_exists(tx, req.receiver_id)? {
                return Err(Error::reference("receiver", req.receiver_id));
            }
            if let Some(parent_id) = req.parent_id {
                if !message_exists(tx, parent_id)? {
                    return Err(Error::reference("parent message", parent_id));
                }
            }

            let message = Message {
                id: Uuid::new_v4(),
                sender_id: req.sender_id,
                receiver_id: req.receiver_id,
                content: req.content.clone(),
                created_at: now(),
                edited: false,
                edited_by: None,
                parent_id: req.parent_id,
            };
            insert_message(tx, &message)?;
            let notification = dispatch_created(tx, &message)?;

            Ok(Delivery { message, notification })
        })?;

        let cache = self.cache();
        cache.invalidate_unread(delivery.message.receiver_id);
        if delivery.message.parent_id.is_some() {
            cache.invalidate_threads();
        }

        debug!(
            message_id = %delivery.message.id,
            sender_id = %delivery.message.sender_id,
            receiver_id = %delivery.message.receiver_id,
            "message created"
        );
        Ok(delivery)
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.with_conn(|conn| query_message(conn, id))?
            .ok_or_else(|| Error::not_found("message", id))
    }

    pub fn edit_message(&self, id: Uuid, req: &EditMessage, editor: Uuid) -> Result<Message> {
        self.apply_edit(id, req, editor).map(|o| o.message)
    }

    /// Replace a message's content. The pre-image is read inside the same
    /// immediate transaction as the write, so concurrent edits of one message
    /// serialize and each one diffs against the content the previous one left.
    pub fn apply_edit(&self, id: Uuid, req: &EditMessage, editor: Uuid) -> Result<EditOutcome> {
        validate_content(&req.content)?;

        let outcome = self.atomic("edit message", |tx| {
            let stored = query_message(tx, id)?.ok_or_else(|| Error::not_found("message", id))?;
            if !user_exists(tx, editor)? {
                return Err(Error::not_found("user", editor));
            }

            let mut in_flight = stored.clone();
            in_flight.content = req.content.clone();

            let history = intercept_edit(tx, &stored, &mut in_flight, editor, now())?;
            if history.is_some() {
                tx.execute(
                    "UPDATE messages SET content = ?1, edited = ?2, edited_by = ?3 WHERE id = ?4",
                    (
                        &in_flight.content,
                        in_flight.edited,
                        in_flight.edited_by.map(|u| u.to_string()),
                        id.to_string(),
                    ),
                )
                .map_err(Error::integrity("edit message"))?;
            }

            Ok(EditOutcome { message: in_flight, history })
        })?;

        if outcome.history.is_some() {
            self.cache().invalidate_unread(outcome.message.receiver_id);
            self.cache().invalidate_threads();
            debug!(message_id = %id, editor_id = %editor, "message edited");
        }
        Ok(outcome)
    }

    /// Messages received by `user_id` whose notification is still unread,
    /// oldest first. Reads only the projected columns.
    pub fn list_unread(&self, user_id: Uuid) -> Result<Arc<Vec<UnreadMessage>>> {
        let key = QueryKey::Unread(user_id);
        if let Some(hit) = self.cache().get_unread(&key) {
            return Ok(hit);
        }

        let generation = self.cache().generation();
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, m.content, m.created_at
                 FROM notifications n
                 JOIN messages m ON m.id = n.message_id
                 WHERE n.user_id = ?1 AND n.is_read = 0 AND m.receiver_id = ?1
                 ORDER BY m.created_at, m.rowid",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], unread_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(self.cache().put_unread(key, rows, generation))
    }

    /// One page of the conversation between two users, newest first.
    pub fn list_conversation(&self, user_a: Uuid, user_b: Uuid, page: &PageQuery) -> Result<Vec<Message>> {
        let before = page.before.as_ref().map(format_timestamp);
        let before_id = page.before_id.map(|id| id.to_string());
        let limit = page.effective_limit();

        // Rows sort by (created_at, rowid), so the cursor compares the same
        // pair. An unknown `before_id` degrades to the timestamp alone.
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))
                   AND (?3 IS NULL OR created_at < ?3
                        OR (created_at = ?3 AND rowid < (SELECT rowid FROM messages WHERE id = ?5)))
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?4",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    (user_a.to_string(), user_b.to_string(), before, limit, before_id),
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("message content must not be blank".into()));
    }
    Ok(())
}

fn insert_message(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, content, created_at, edited, edited_by, parent_id)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6)",
        (
            message.id.to_string(),
            message.sender_id.to_string(),
            message.receiver_id.to_string(),
            &message.content,
            format_timestamp(&message.created_at),
            message.parent_id.map(|p| p.to_string()),
        ),
    )?;
    Ok(())
}

pub(crate) fn query_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    Ok(conn
        .query_row(&sql, [id.to_string()], message_from_row)
        .optional()?)
}

pub(crate) fn message_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM messages WHERE id = ?1", [id.to_string()], |_| Ok(()))
        .optional()?
        .is_some())
}
