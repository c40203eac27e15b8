//! Async entry points for hosting collaborators.
//!
//! Every store call may block on disk I/O, so each one runs on tokio's
//! blocking pool. `actor` parameters are the caller's already authenticated
//! identity; nothing here authenticates.

use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::{EditMessage, NewUser, PageQuery, SendMessage};
use parley_types::events::MessagingEvent;
use parley_types::models::{
    CascadeReport, Message, MessageHistory, Notification, StoreStats, ThreadNode, UnreadMessage,
    User,
};

use crate::dispatcher::EventBus;
use crate::error::ServiceResult;

#[derive(Clone)]
pub struct Messenger {
    db: Arc<Database>,
    events: EventBus,
}

impl Messenger {
    pub fn new(db: Database) -> Self {
        Self::with_events(Arc::new(db), EventBus::new())
    }

    pub fn with_events(db: Arc<Database>, events: EventBus) -> Self {
        Self { db, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // Run blocking DB work off the async runtime
    async fn blocking<F, T>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&Database) -> parley_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let value = tokio::task::spawn_blocking(move || f(&db))
            .await
            .inspect_err(|e| error!("spawn_blocking join error: {}", e))??;
        Ok(value)
    }

    // -- Users --

    pub async fn register_user(&self, req: NewUser) -> ServiceResult<User> {
        self.blocking(move |db| db.create_user(&req)).await
    }

    pub async fn user(&self, id: Uuid) -> ServiceResult<User> {
        self.blocking(move |db| db.get_user(id)).await
    }

    pub async fn user_by_username(&self, username: String) -> ServiceResult<Option<User>> {
        self.blocking(move |db| db.get_user_by_username(&username)).await
    }

    /// Delete the acting user's own account and everything it owns.
    pub async fn delete_account(&self, actor: Uuid) -> ServiceResult<CascadeReport> {
        let report = self.blocking(move |db| db.delete_user(actor)).await?;
        self.events.publish(MessagingEvent::UserDeleted {
            user_id: actor,
            report,
        });
        Ok(report)
    }

    // -- Messages --

    pub async fn send(&self, actor: Uuid, req: SendMessage) -> ServiceResult<Message> {
        let delivery = self.blocking(move |db| db.send_message(actor, &req)).await?;

        self.events.publish(MessagingEvent::MessageCreated {
            message: delivery.message.clone(),
        });
        self.events.publish(MessagingEvent::NotificationCreated {
            notification_id: delivery.notification.id,
            user_id: delivery.notification.user_id,
            message_id: delivery.notification.message_id,
        });
        Ok(delivery.message)
    }

    pub async fn message(&self, id: Uuid) -> ServiceResult<Message> {
        self.blocking(move |db| db.get_message(id)).await
    }

    pub async fn edit(&self, actor: Uuid, id: Uuid, req: EditMessage) -> ServiceResult<Message> {
        let outcome = self.blocking(move |db| db.apply_edit(id, &req, actor)).await?;

        if let Some(history) = outcome.history {
            self.events.publish(MessagingEvent::MessageEdited {
                message: outcome.message.clone(),
                old_content: history.old_content,
            });
        }
        Ok(outcome.message)
    }

    pub async fn history(&self, id: Uuid) -> ServiceResult<Vec<MessageHistory>> {
        self.blocking(move |db| db.message_history(id)).await
    }

    pub async fn thread(&self, root_id: Uuid) -> ServiceResult<Arc<ThreadNode>> {
        self.blocking(move |db| db.assemble_thread(root_id)).await
    }

    pub async fn conversation(&self, actor: Uuid, other: Uuid, page: PageQuery) -> ServiceResult<Vec<Message>> {
        self.blocking(move |db| db.list_conversation(actor, other, &page)).await
    }

    // -- Notifications --

    pub async fn unread(&self, actor: Uuid) -> ServiceResult<Arc<Vec<UnreadMessage>>> {
        self.blocking(move |db| db.list_unread(actor)).await
    }

    pub async fn notifications(&self, actor: Uuid, unread_only: bool) -> ServiceResult<Vec<Notification>> {
        self.blocking(move |db| db.list_notifications(actor, unread_only)).await
    }

    pub async fn mark_read(&self, actor: Uuid, notification_id: Uuid) -> ServiceResult<Notification> {
        let notification = self
            .blocking(move |db| db.mark_notification_read(actor, notification_id))
            .await?;
        self.events.publish(MessagingEvent::NotificationRead {
            notification_id,
            user_id: actor,
        });
        Ok(notification)
    }

    pub async fn stats(&self) -> ServiceResult<StoreStats> {
        self.blocking(|db| db.stats()).await
    }
}
