use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use order_notify::{
    clients::{
        memory::MemoryStore,
        messaging::{Messaging, PushGateway},
        store::{NotificationStore, OrderStore},
    },
    error::GatewayError,
    models::{
        message::{BatchResponse, MulticastMessage, PushMessage, SendResponse},
        notification::{NewNotification, NotificationMutation, PendingNotification},
        order::{OrderSnapshot, OrderStatus, UserRecord, UserRole},
    },
    services::{
        delivery::{DeliveryEngine, DrainSettings},
        order_events::OrderEventHandler,
    },
};
use serde_json::Map;
use uuid::Uuid;

pub const VALID_TOKEN: &str = "dGVzdC10b2tlbi1hYmNkZWZnaGlqaw:APA91b-valid";
pub const STALE_TOKEN: &str = "c3RhbGUtdG9rZW4tYWJjZGVmZ2hpams:APA91b-stale";
pub const FLAKY_TOKEN: &str = "Zmxha3ktdG9rZW4tYWJjZGVmZ2hpams:APA91b-flaky";

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    InvalidToken,
    Transient,
}

impl Failure {
    fn to_error(self) -> GatewayError {
        match self {
            Failure::InvalidToken => {
                GatewayError::InvalidToken("Requested entity was not found.".to_string())
            }
            Failure::Transient => GatewayError::Rejected {
                code: "UNAVAILABLE".to_string(),
                message: "The service is currently unavailable.".to_string(),
            },
        }
    }
}

/// Gateway double that records every call and fails on demand.
#[derive(Default)]
pub struct ScriptedGateway {
    failures: HashMap<String, Failure>,
    failing_multicast_calls: HashSet<usize>,
    yield_on_send: bool,
    pub sent: Mutex<Vec<PushMessage>>,
    pub multicasts: Mutex<Vec<MulticastMessage>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, token: &str, failure: Failure) -> Self {
        self.failures.insert(token.to_string(), failure);
        self
    }

    pub fn with_failing_multicast_call(mut self, index: usize) -> Self {
        self.failing_multicast_calls.insert(index);
        self
    }

    /// Yield to the scheduler before each send, so concurrent drains interleave.
    pub fn yielding(mut self) -> Self {
        self.yield_on_send = true;
        self
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn multicasts(&self) -> Vec<MulticastMessage> {
        self.multicasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for ScriptedGateway {
    async fn send(&self, message: &PushMessage) -> Result<String, GatewayError> {
        if self.yield_on_send {
            tokio::task::yield_now().await;
        }

        let count = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.clone());
            sent.len()
        };

        match self.failures.get(&message.token) {
            Some(failure) => Err(failure.to_error()),
            None => Ok(format!("projects/test/messages/{}", count)),
        }
    }

    async fn send_multicast(
        &self,
        message: &MulticastMessage,
    ) -> Result<BatchResponse, GatewayError> {
        let index = {
            let mut multicasts = self.multicasts.lock().unwrap();
            multicasts.push(message.clone());
            multicasts.len() - 1
        };

        if self.failing_multicast_calls.contains(&index) {
            return Err(GatewayError::Transport("connection reset by peer".to_string()));
        }

        let responses = message
            .tokens
            .iter()
            .map(|token| SendResponse {
                token: token.clone(),
                result: Ok(format!("projects/test/messages/{}", token)),
            })
            .collect();

        Ok(BatchResponse::from_responses(responses))
    }
}

/// Store double over a `MemoryStore` whose reads or writes fail on demand.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_reads: bool,
    fail_commits: bool,
}

impl FailingStore {
    /// Every read and write fails.
    pub fn unreachable() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_reads: true,
            fail_commits: true,
        }
    }

    /// Reads succeed against `inner`, batch commits fail.
    pub fn failing_commits() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_reads: false,
            fail_commits: true,
        }
    }
}

#[async_trait]
impl NotificationStore for FailingStore {
    async fn fetch_pending(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<PendingNotification>> {
        if self.fail_reads {
            return Err(anyhow!("store unreachable"));
        }
        self.inner.fetch_pending(max_attempts, limit).await
    }

    async fn count_over_budget(&self, max_attempts: u32) -> Result<usize> {
        if self.fail_reads {
            return Err(anyhow!("store unreachable"));
        }
        self.inner.count_over_budget(max_attempts).await
    }

    async fn commit(&self, mutations: &[NotificationMutation]) -> Result<()> {
        if self.fail_commits {
            return Err(anyhow!("batch commit aborted"));
        }
        self.inner.commit(mutations).await
    }

    async fn enqueue(&self, notification: NewNotification) -> Result<PendingNotification> {
        self.inner.enqueue(notification).await
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_reads {
            return Err(anyhow!("store unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for FailingStore {
    async fn clear_customer_token(&self, order_id: &str) -> Result<()> {
        self.inner.clear_customer_token(order_id).await
    }
}

pub fn pending(token: &str, attempts: u32) -> PendingNotification {
    PendingNotification {
        id: Uuid::new_v4(),
        fcm_token: token.to_string(),
        title: "Reminder".to_string(),
        body: "Your gas delivery is scheduled".to_string(),
        data: Map::new(),
        attempts,
        order_id: None,
        created_at: Utc::now(),
    }
}

pub fn order(status: OrderStatus) -> OrderSnapshot {
    OrderSnapshot {
        status,
        customer_id: "customer-1".to_string(),
        customer_fcm_token: None,
        gas_quantity: Some(5.0),
        address: Some("12 Harbor Rd".to_string()),
    }
}

pub fn user(id: &str, role: UserRole, token: Option<&str>) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        role,
        fcm_token: token.map(str::to_string),
    }
}

pub fn engine(store: &Arc<MemoryStore>, gateway: &Arc<ScriptedGateway>) -> DeliveryEngine {
    DeliveryEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(Messaging::ready(gateway.clone())),
        DrainSettings::default(),
    )
}

pub fn handler(store: &Arc<MemoryStore>, gateway: &Arc<ScriptedGateway>) -> OrderEventHandler {
    OrderEventHandler::new(
        store.clone(),
        store.clone(),
        Arc::new(Messaging::ready(gateway.clone())),
    )
}
