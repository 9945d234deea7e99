//! Notification persistence boundary.

use crate::domain::Notification;
use bazaar_contracts::{NotificationId, UserId};
use bazaar_core::repository::RepositoryError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage interface for notifications.
pub trait NotificationRepository: Send + Sync {
    /// Fetch a notification by id.
    fn get(
        &self,
        id: NotificationId,
    ) -> BoxFuture<'_, Result<Option<Notification>, RepositoryError>>;

    /// Fetch every notification for a user.
    fn get_by_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<Notification>, RepositoryError>>;

    /// Fetch the unread notifications for a user.
    fn get_unread_by_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<Notification>, RepositoryError>>;

    /// Persist a new notification.
    fn add(&self, notification: Notification) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Persist changes to an existing notification.
    fn update(&self, notification: Notification) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Map-backed repository for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryNotificationRepository {
    notifications: Mutex<HashMap<NotificationId, Notification>>,
}

impl InMemoryNotificationRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_notifications<T>(
        &self,
        f: impl FnOnce(&mut HashMap<NotificationId, Notification>) -> T,
    ) -> Result<T, RepositoryError> {
        self.notifications
            .lock()
            .map(|mut notifications| f(&mut notifications))
            .map_err(|_| RepositoryError::Backend("notification store lock poisoned".to_string()))
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn get(
        &self,
        id: NotificationId,
    ) -> BoxFuture<'_, Result<Option<Notification>, RepositoryError>> {
        let result = self.with_notifications(|notifications| notifications.get(&id).cloned());
        Box::pin(async move { result })
    }

    fn get_by_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<Notification>, RepositoryError>> {
        let result = self.with_notifications(|notifications| {
            let mut found: Vec<Notification> = notifications
                .values()
                .filter(|n| n.user_id == user_id)
                .cloned()
                .collect();
            found.sort_by_key(|n| n.created_at);
            found
        });
        Box::pin(async move { result })
    }

    fn get_unread_by_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<Notification>, RepositoryError>> {
        let result = self.with_notifications(|notifications| {
            let mut found: Vec<Notification> = notifications
                .values()
                .filter(|n| n.user_id == user_id && !n.read)
                .cloned()
                .collect();
            found.sort_by_key(|n| n.created_at);
            found
        });
        Box::pin(async move { result })
    }

    fn add(&self, notification: Notification) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_notifications(|notifications| {
            notifications.insert(notification.id, notification);
        });
        Box::pin(async move { result })
    }

    fn update(&self, notification: Notification) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = self.with_notifications(|notifications| {
            notifications.insert(notification.id, notification);
        });
        Box::pin(async move { result })
    }
}
