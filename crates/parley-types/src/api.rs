use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

// -- Users --

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

// -- Messages --

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl SendMessage {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            content: content.into(),
            parent_id: None,
        }
    }

    pub fn reply_to(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessage {
    pub content: String,
}

// -- Pagination --

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Cursor pagination: pass the `created_at` and `id` of the oldest message
/// from the previous page as `before` and `before_id` to fetch older
/// messages. With `before` alone, every message stamped at exactly that
/// instant is skipped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            before: None,
            before_id: None,
        }
    }
}

impl PageQuery {
    /// The page of up to `limit` messages older than `message`.
    pub fn older_than(limit: u32, message: &Message) -> Self {
        Self {
            limit,
            before: Some(message.created_at),
            before_id: Some(message.id),
        }
    }

    /// Requested limit clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}
