use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    notification::{NewNotification, NotificationMutation, PendingNotification},
    order::{UserRecord, UserRole},
};

/// Durable queue of pending notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Records with `attempts < max_attempts`, at most `limit` of them.
    async fn fetch_pending(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<PendingNotification>>;

    /// Records left with `attempts >= max_attempts`, which no drain will
    /// fetch again. Only non-zero after the budget was lowered.
    async fn count_over_budget(&self, max_attempts: u32) -> Result<usize>;

    /// Applies every mutation atomically. Mutations naming records that no
    /// longer exist are no-ops.
    async fn commit(&self, mutations: &[NotificationMutation]) -> Result<()>;

    async fn enqueue(&self, notification: NewNotification) -> Result<PendingNotification>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Removes `customerFcmToken` from the order document.
    async fn clear_customer_token(&self, order_id: &str) -> Result<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>>;

    async fn find_by_roles(&self, roles: &[UserRole]) -> Result<Vec<UserRecord>>;
}
