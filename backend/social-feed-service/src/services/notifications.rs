/// Notification service - listing and clearing a user's notifications
use super::posts::summaries_by_id;
use crate::coordinator::Coordinator;
use crate::domain::{Notification, NotificationId, UserId, UserSummary};
use crate::error::Result;
use crate::store::Mutation;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender: Option<UserSummary>,
}

#[derive(Clone)]
pub struct NotificationService {
    coordinator: Coordinator,
}

impl NotificationService {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    pub async fn list(&self, to: UserId) -> Result<Vec<NotificationView>> {
        let store = self.coordinator.store();
        let notifications = store.list_notifications(to).await?;
        let senders = summaries_by_id(store, notifications.iter().map(|n| n.from)).await?;
        Ok(notifications
            .into_iter()
            .map(|notification| NotificationView {
                sender: senders.get(&notification.from).cloned(),
                notification,
            })
            .collect())
    }

    /// Remove one notification addressed to `to`. Returns the number removed,
    /// which is zero when it did not exist or belongs to someone else.
    pub async fn delete_one(&self, to: UserId, id: NotificationId) -> Result<u64> {
        let removed = self
            .coordinator
            .run_atomic("delete_notification", move |unit| {
                Box::pin(async move {
                    Ok(unit
                        .apply(Mutation::DeleteNotification { id, to })
                        .await?
                        .rows())
                })
            })
            .await?;
        info!(user_id = %to, notification_id = %id, removed, "notification deleted");
        Ok(removed)
    }

    pub async fn clear_all(&self, to: UserId) -> Result<u64> {
        let removed = self
            .coordinator
            .run_atomic("clear_notifications", move |unit| {
                Box::pin(async move {
                    Ok(unit.apply(Mutation::DeleteNotificationsTo(to)).await?.rows())
                })
            })
            .await?;
        info!(user_id = %to, removed, "notifications cleared");
        Ok(removed)
    }
}
