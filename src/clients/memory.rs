use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    clients::store::{NotificationStore, OrderStore, UserDirectory},
    models::{
        notification::{NewNotification, NotificationMutation, PendingNotification},
        order::{OrderSnapshot, UserRecord, UserRole},
    },
};

/// Pending records in insertion order, indexed by id.
#[derive(Default)]
struct PendingQueue {
    records: BTreeMap<u64, PendingNotification>,
    index: HashMap<Uuid, u64>,
}

impl PendingQueue {
    fn insert(&mut self, seq: u64, notification: PendingNotification) {
        if let Some(previous) = self.index.insert(notification.id, seq) {
            self.records.remove(&previous);
        }
        self.records.insert(seq, notification);
    }

    fn get(&self, id: &Uuid) -> Option<&PendingNotification> {
        self.index.get(id).and_then(|seq| self.records.get(seq))
    }

    fn get_mut(&mut self, id: &Uuid) -> Option<&mut PendingNotification> {
        let seq = self.index.get(id)?;
        self.records.get_mut(seq)
    }

    fn remove(&mut self, id: &Uuid) {
        if let Some(seq) = self.index.remove(id) {
            self.records.remove(&seq);
        }
    }
}

/// In-process store backing local runs and tests.
///
/// Pending records are returned in insertion order. A commit takes the write
/// lock once, so every batch is applied atomically with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    pending: RwLock<PendingQueue>,
    users: RwLock<HashMap<String, UserRecord>>,
    orders: RwLock<HashMap<String, OrderSnapshot>>,
    sequence: AtomicUsize,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record as-is, keeping its id and attempt counter.
    pub async fn insert_pending(&self, notification: PendingNotification) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) as u64;
        self.pending.write().await.insert(seq, notification);
    }

    pub async fn pending(&self) -> Vec<PendingNotification> {
        self.pending.read().await.records.values().cloned().collect()
    }

    pub async fn pending_by_id(&self, id: Uuid) -> Option<PendingNotification> {
        self.pending.read().await.get(&id).cloned()
    }

    /// Number of non-empty batches committed so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub async fn insert_user(&self, user: UserRecord) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn insert_order(&self, order_id: &str, order: OrderSnapshot) {
        self.orders.write().await.insert(order_id.to_string(), order);
    }

    pub async fn order(&self, order_id: &str) -> Option<OrderSnapshot> {
        self.orders.read().await.get(order_id).cloned()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn fetch_pending(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<PendingNotification>> {
        Ok(self
            .pending
            .read()
            .await
            .records
            .values()
            .filter(|n| n.attempts < max_attempts)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_over_budget(&self, max_attempts: u32) -> Result<usize> {
        Ok(self
            .pending
            .read()
            .await
            .records
            .values()
            .filter(|n| n.attempts >= max_attempts)
            .count())
    }

    async fn commit(&self, mutations: &[NotificationMutation]) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        let mut pending = self.pending.write().await;
        for mutation in mutations {
            match mutation {
                NotificationMutation::Delete { id } => pending.remove(id),
                NotificationMutation::SetAttempts { id, attempts } => {
                    if let Some(record) = pending.get_mut(id) {
                        record.attempts = *attempts;
                    }
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn enqueue(&self, notification: NewNotification) -> Result<PendingNotification> {
        let pending = notification.into_pending(Uuid::new_v4(), Utc::now());
        self.insert_pending(pending.clone()).await;
        Ok(pending)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn clear_customer_token(&self, order_id: &str) -> Result<()> {
        if let Some(order) = self.orders.write().await.get_mut(order_id) {
            order.customer_fcm_token = None;
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn find_by_roles(&self, roles: &[UserRole]) -> Result<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| roles.contains(&u.role))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}
