use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CascadeReport, Message};

/// Events published after a messaging operation has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessagingEvent {
    /// A new message was stored
    MessageCreated { message: Message },

    /// The receiver of a new message was notified
    NotificationCreated {
        notification_id: Uuid,
        user_id: Uuid,
        message_id: Uuid,
    },

    /// A message's content changed; `old_content` is what the edit replaced
    MessageEdited {
        message: Message,
        old_content: String,
    },

    /// A notification was marked read by its recipient
    NotificationRead {
        notification_id: Uuid,
        user_id: Uuid,
    },

    /// A user and everything they owned was removed
    UserDeleted { user_id: Uuid, report: CascadeReport },
}

impl MessagingEvent {
    /// Returns the user this event is addressed to, if it targets one user.
    /// Events that return `None` concern every participant of a conversation.
    pub fn recipient(&self) -> Option<Uuid> {
        match self {
            Self::NotificationCreated { user_id, .. } => Some(*user_id),
            Self::NotificationRead { user_id, .. } => Some(*user_id),
            Self::MessageCreated { message } => Some(message.receiver_id),
            _ => None,
        }
    }
}
