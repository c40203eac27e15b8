use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A direct message between two users, optionally replying to another message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    /// Set once at creation, never changes afterwards.
    pub created_at: DateTime<Utc>,
    /// Flips to true on the first content-changing edit and never resets.
    pub edited: bool,
    pub edited_by: Option<Uuid>,
    /// `None` means this message is the root of its thread.
    pub parent_id: Option<Uuid>,
}

impl Message {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Write-once snapshot of the content an edit replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHistory {
    pub id: Uuid,
    pub message_id: Uuid,
    pub old_content: String,
    pub edited_at: DateTime<Utc>,
    pub editor_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Narrow projection served to unread listings. Only these four columns are
/// read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One message in an assembled reply tree. Children are ordered by creation
/// time, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub message: Message,
    pub sender_username: String,
    pub receiver_username: String,
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    /// Number of messages in this subtree, including this node.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Always false: a node contains at least itself.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn child_ids(&self) -> Vec<Uuid> {
        self.children.iter().map(|c| c.message.id).collect()
    }
}

/// Row counts removed by a user cascade delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub messages: usize,
    pub notifications: usize,
    pub histories: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub users: u64,
    pub messages: u64,
    pub histories: u64,
    pub notifications: u64,
}
