//! Notification service: creation and read-state management.

use crate::domain::Notification;
use crate::repository::NotificationRepository;
use bazaar_contracts::{NotificationId, OrderId, UserId};
use bazaar_core::environment::Clock;
use bazaar_core::repository::RepositoryError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by notification operations.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// No notification with this id.
    #[error("notification {0} not found")]
    NotFound(NotificationId),

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The notification service object.
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    /// Wire the service with its collaborators.
    pub fn new(repository: Arc<dyn NotificationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Create one notification record.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn create_notification(
        &self,
        user_id: UserId,
        order_id: OrderId,
        title: &str,
        body: &str,
        kind: &str,
    ) -> Result<Notification, NotificationError> {
        let notification =
            Notification::new(user_id, order_id, title, body, kind, self.clock.now());
        self.repository.add(notification.clone()).await?;
        tracing::info!(
            notification = %notification.id,
            user = %user_id,
            order = %order_id,
            kind,
            "Created notification"
        );
        Ok(notification)
    }

    /// Every notification for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn notifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.repository.get_by_user(user_id).await?)
    }

    /// Unread notifications for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn unread_notifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.repository.get_unread_by_user(user_id).await?)
    }

    /// Set a notification's read flag.
    ///
    /// # Errors
    ///
    /// [`NotificationError::NotFound`] for unknown ids, or a storage error.
    pub async fn mark_read(&self, id: NotificationId) -> Result<(), NotificationError> {
        let mut notification = self
            .repository
            .get(id)
            .await?
            .ok_or(NotificationError::NotFound(id))?;
        notification.mark_read();
        self.repository.update(notification).await?;
        Ok(())
    }
}
