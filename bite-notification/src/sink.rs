use std::collections::HashMap;

use bite_shared::CreateNotificationRequest;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::Notification;

/// Terminal consumer of status-change events. History is never pruned.
pub struct NotificationSink {
    inbox: Mutex<Inbox>,
}

struct Inbox {
    notifications: Vec<Notification>,
    /// Idempotency key -> notification it created
    keys: HashMap<String, u64>,
    next_id: u64,
}

impl Inbox {
    fn for_user(&self, user_id: u64) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl NotificationSink {
    pub fn new() -> Self {
        Self {
            inbox: Mutex::new(Inbox {
                notifications: Vec::new(),
                keys: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    pub async fn create_notification(&self, req: CreateNotificationRequest) -> Notification {
        self.create_notification_with_key(req, None).await
    }

    /// As [`Self::create_notification`], but a key seen before returns the
    /// notification it stored
    pub async fn create_notification_with_key(
        &self,
        req: CreateNotificationRequest,
        idempotency_key: Option<&str>,
    ) -> Notification {
        let mut inbox = self.inbox.lock().await;
        if let Some(existing) = idempotency_key
            .and_then(|key| inbox.keys.get(key))
            .and_then(|id| inbox.notifications.iter().find(|n| n.id == *id))
        {
            return existing.clone();
        }

        let id = inbox.next_id;
        inbox.next_id += 1;

        let notification = Notification {
            id,
            user_id: req.user_id,
            kind: req.kind,
            message: req.message,
            order_id: req.order_id,
            status: req.status,
            read: false,
            created_at: Utc::now(),
        };
        inbox.notifications.push(notification.clone());
        if let Some(key) = idempotency_key {
            inbox.keys.insert(key.to_string(), id);
        }

        tracing::info!("New notification for user {}: {}", notification.user_id, notification.message);
        notification
    }

    pub async fn get_notification(&self, notification_id: u64) -> Result<Notification, NotificationError> {
        let inbox = self.inbox.lock().await;
        inbox
            .notifications
            .iter()
            .find(|notification| notification.id == notification_id)
            .cloned()
            .ok_or(NotificationError::NotFound(notification_id))
    }

    pub async fn list_notifications(&self) -> Vec<Notification> {
        self.inbox.lock().await.notifications.clone()
    }

    pub async fn list_by_user(&self, user_id: u64) -> Vec<Notification> {
        self.inbox.lock().await.for_user(user_id)
    }

    pub async fn list_unread_by_user(&self, user_id: u64) -> Vec<Notification> {
        let inbox = self.inbox.lock().await;
        inbox
            .notifications
            .iter()
            .filter(|notification| notification.user_id == user_id && !notification.read)
            .cloned()
            .collect()
    }

    pub async fn list_by_order(&self, order_id: u64) -> Vec<Notification> {
        let inbox = self.inbox.lock().await;
        inbox
            .notifications
            .iter()
            .filter(|notification| notification.order_id == Some(order_id))
            .cloned()
            .collect()
    }

    pub async fn mark_read(&self, notification_id: u64) -> Result<Notification, NotificationError> {
        let mut inbox = self.inbox.lock().await;
        let notification = inbox
            .notifications
            .iter_mut()
            .find(|notification| notification.id == notification_id)
            .ok_or(NotificationError::NotFound(notification_id))?;
        notification.read = true;
        Ok(notification.clone())
    }

    /// Mark every notification of a user as read and return all of them.
    /// Idempotent.
    pub async fn mark_all_read(&self, user_id: u64) -> Vec<Notification> {
        let mut inbox = self.inbox.lock().await;
        inbox
            .notifications
            .iter_mut()
            .filter(|notification| notification.user_id == user_id)
            .for_each(|notification| notification.read = true);
        inbox.for_user(user_id)
    }
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound(u64),
}
