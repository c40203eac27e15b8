//! Reply-tree reconstruction.
//!
//! A thread is fetched with one recursive query that also joins the sender
//! and receiver usernames, so the cost is one round trip no matter how many
//! messages or users the thread touches. The tree is then built bottom-up
//! from an id index without recursing on depth.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parley_types::models::{Message, ThreadNode};
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use crate::cache::QueryKey;
use crate::error::{Error, Result};
use crate::models::message_from_row;
use crate::Database;

struct ThreadRow {
    message: Message,
    sender_username: String,
    receiver_username: String,
    depth: usize,
}

impl Database {
    /// Reconstruct the reply tree rooted at `root_id`. Children of every node
    /// are ordered by creation time, oldest first.
    pub fn assemble_thread(&self, root_id: Uuid) -> Result<Arc<ThreadNode>> {
        let key = QueryKey::Thread(root_id);
        if let Some(hit) = self.cache().get_thread(&key) {
            return Ok(hit);
        }

        let limit = self.config().max_thread_depth;
        let generation = self.cache().generation();
        let rows = self.with_conn(|conn| query_thread(conn, root_id, limit))?;

        if rows.is_empty() {
            return Err(Error::not_found("message", root_id));
        }
        if rows.iter().any(|r| r.depth > limit) {
            warn!(%root_id, limit, "thread exceeds depth limit");
            return Err(Error::ThreadTooDeep { root: root_id, limit });
        }

        let tree = build_tree(root_id, rows)?;
        Ok(self.cache().put_thread(key, tree, generation))
    }
}

/// Rows come back ordered by depth, then creation time, so every parent
/// precedes its children and siblings arrive in order. The recursion is cut
/// one level past `limit` so the caller can tell an over-deep thread (or a
/// cycle in a corrupted store) from one that fits.
fn query_thread(conn: &Connection, root_id: Uuid, limit: usize) -> Result<Vec<ThreadRow>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE thread(id, depth) AS (
             SELECT id, 0 FROM messages WHERE id = ?1
             UNION
             SELECT m.id, t.depth + 1
             FROM messages m
             JOIN thread t ON m.parent_id = t.id
             WHERE t.depth <= ?2
         )
         SELECT m.id, m.sender_id, m.receiver_id, m.content, m.created_at,
                m.edited, m.edited_by, m.parent_id,
                s.username, r.username, t.depth
         FROM thread t
         JOIN messages m ON m.id = t.id
         LEFT JOIN users s ON s.id = m.sender_id
         LEFT JOIN users r ON r.id = m.receiver_id
         ORDER BY t.depth, m.created_at, m.rowid",
    )?;

    let rows = stmt
        .query_map((root_id.to_string(), limit as i64), |row| {
            Ok(ThreadRow {
                message: message_from_row(row)?,
                sender_username: row
                    .get::<_, Option<String>>(8)?
                    .unwrap_or_else(|| "unknown".to_string()),
                receiver_username: row
                    .get::<_, Option<String>>(9)?
                    .unwrap_or_else(|| "unknown".to_string()),
                depth: row.get::<_, i64>(10)? as usize,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn build_tree(root_id: Uuid, rows: Vec<ThreadRow>) -> Result<ThreadNode> {
    let mut order: Vec<Uuid> = Vec::with_capacity(rows.len());
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(rows.len());
    let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut pending: HashMap<Uuid, ThreadRow> = HashMap::with_capacity(rows.len());

    for row in rows {
        let id = row.message.id;
        if !seen.insert(id) {
            continue;
        }
        if id != root_id {
            if let Some(parent_id) = row.message.parent_id {
                children_of.entry(parent_id).or_default().push(id);
            }
        }
        order.push(id);
        pending.insert(id, row);
    }

    let mut built: HashMap<Uuid, ThreadNode> = HashMap::with_capacity(order.len());
    for id in order.iter().rev() {
        let Some(row) = pending.remove(id) else { continue };
        let children = children_of
            .remove(id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| built.remove(&child))
            .collect();
        built.insert(
            *id,
            ThreadNode {
                message: row.message,
                sender_username: row.sender_username,
                receiver_username: row.receiver_username,
                children,
            },
        );
    }

    built
        .remove(&root_id)
        .ok_or_else(|| Error::not_found("message", root_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StoreConfig, testing};
    use parley_types::api::{EditMessage, SendMessage};
    use parley_types::models::User;

    fn reply(db: &Database, from: &User, to: &User, parent: Uuid, content: &str) -> Message {
        db.create_message(from.id, &SendMessage::new(from.id, to.id, content).reply_to(parent))
            .unwrap()
    }

    #[test]
    fn children_are_ordered_by_creation() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");

        let m1 = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "hi"))
            .unwrap();
        let m2 = reply(&db, &b, &a, m1.id, "first reply");
        let m3 = reply(&db, &a, &b, m1.id, "second reply");

        let thread = db.assemble_thread(m1.id).unwrap();
        assert_eq!(thread.message, m1);
        assert_eq!(thread.child_ids(), [m2.id, m3.id]);
        assert_eq!(thread.sender_username, "a");
        assert_eq!(thread.receiver_username, "b");
        assert_eq!(thread.children[0].sender_username, "b");
    }

    #[test]
    fn nested_subtrees_are_rebuilt() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let c = testing::user(&db, "c");

        let root = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "root"))
            .unwrap();
        let c1 = reply(&db, &b, &a, root.id, "c1");
        let c2 = reply(&db, &c, &a, root.id, "c2");
        let c1a = reply(&db, &a, &b, c1.id, "c1a");
        let c1b = reply(&db, &c, &b, c1.id, "c1b");
        let c1a_i = reply(&db, &b, &a, c1a.id, "c1a-i");
        let c2a = reply(&db, &a, &c, c2.id, "c2a");

        let thread = db.assemble_thread(root.id).unwrap();
        assert_eq!(thread.len(), 7);
        assert_eq!(thread.child_ids(), [c1.id, c2.id]);

        let n1 = &thread.children[0];
        assert_eq!(n1.child_ids(), [c1a.id, c1b.id]);
        assert_eq!(n1.children[0].child_ids(), [c1a_i.id]);
        assert!(n1.children[1].children.is_empty());
        assert_eq!(thread.children[1].child_ids(), [c2a.id]);

        let sub = db.assemble_thread(c1.id).unwrap();
        assert_eq!(sub.len(), 4);
        assert_eq!(sub.message.id, c1.id);
    }

    #[test]
    fn missing_root_is_not_found() {
        let (_dir, db) = testing::open();
        assert!(matches!(
            db.assemble_thread(Uuid::new_v4()),
            Err(Error::NotFound { entity: "message", .. })
        ));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let (_dir, db) = testing::open_with(StoreConfig {
            max_thread_depth: 2,
            ..StoreConfig::default()
        });
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");

        let root = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "0"))
            .unwrap();
        let d1 = reply(&db, &b, &a, root.id, "1");
        let d2 = reply(&db, &a, &b, d1.id, "2");
        assert_eq!(db.assemble_thread(root.id).unwrap().len(), 3);

        reply(&db, &b, &a, d2.id, "3");
        assert!(matches!(
            db.assemble_thread(root.id),
            Err(Error::ThreadTooDeep { limit: 2, .. })
        ));
        assert_eq!(db.assemble_thread(d1.id).unwrap().len(), 3);
    }

    #[test]
    fn corrupted_cycle_terminates() {
        let (_dir, db) = testing::open_with(StoreConfig {
            max_thread_depth: 16,
            ..StoreConfig::default()
        });
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let root = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "root"))
            .unwrap();
        let child = reply(&db, &b, &a, root.id, "child");

        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET parent_id = ?1 WHERE id = ?2",
                (child.id.to_string(), root.id.to_string()),
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            db.assemble_thread(root.id),
            Err(Error::ThreadTooDeep { .. })
        ));
    }

    #[test]
    fn cached_thread_is_invalidated_by_writes() {
        let (_dir, db) = testing::open();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let root = db
            .create_message(a.id, &SendMessage::new(a.id, b.id, "root"))
            .unwrap();

        let first = db.assemble_thread(root.id).unwrap();
        let again = db.assemble_thread(root.id).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let r = reply(&db, &b, &a, root.id, "reply");
        let refreshed = db.assemble_thread(root.id).unwrap();
        assert_eq!(refreshed.child_ids(), [r.id]);

        db.edit_message(r.id, &EditMessage { content: "edited".into() }, b.id)
            .unwrap();
        let edited = db.assemble_thread(root.id).unwrap();
        assert_eq!(edited.children[0].message.content, "edited");
        assert!(edited.children[0].message.edited);
    }
}
