use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::WorkflowResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserNotification {
    pub user_id: Uuid,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_notification(&self, user_id: Uuid, text: &str) -> WorkflowResult<()>;
}

/// Fans notifications out to in-process subscribers.
pub struct BroadcastNotificationService {
    sender: broadcast::Sender<UserNotification>,
}

impl BroadcastNotificationService {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserNotification> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotificationService {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl NotificationService for BroadcastNotificationService {
    async fn send_notification(&self, user_id: Uuid, text: &str) -> WorkflowResult<()> {
        let notification = UserNotification {
            user_id,
            text: text.to_string(),
            sent_at: Utc::now(),
        };
        if self.sender.send(notification).is_err() {
            debug!(%user_id, "No notification subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_notifications() {
        let service = BroadcastNotificationService::default();
        let mut rx = service.subscribe();
        let user = Uuid::new_v4();

        service.send_notification(user, "Ticket assigned").await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id, user);
        assert_eq!(received.text, "Ticket assigned");
    }

    #[tokio::test]
    async fn test_send_without_subscribers_is_ok() {
        let service = BroadcastNotificationService::new(4);
        assert!(service.send_notification(Uuid::new_v4(), "hello").await.is_ok());
    }
}
