use std::sync::{Arc, OnceLock};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tracing::info;

use crate::{
    error::GatewayError,
    models::message::{BatchResponse, MulticastMessage, PushMessage},
};

/// The send capability of the third-party push gateway.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Sends to one token and returns the gateway's message id.
    async fn send(&self, message: &PushMessage) -> Result<String, GatewayError>;

    /// Sends to at most `MULTICAST_LIMIT` tokens. Per-token failures are
    /// reported in the response; `Err` means the call as a whole failed.
    async fn send_multicast(
        &self,
        message: &MulticastMessage,
    ) -> Result<BatchResponse, GatewayError>;
}

/// Process-wide gateway slot, filled once at startup.
///
/// Until `initialize` succeeds every caller gets `GatewayError::Unavailable`.
#[derive(Default)]
pub struct Messaging {
    gateway: OnceLock<Arc<dyn PushGateway>>,
}

impl Messaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(gateway: Arc<dyn PushGateway>) -> Self {
        let messaging = Self::new();
        let _ = messaging.gateway.set(gateway);
        messaging
    }

    pub fn initialize(&self, gateway: Arc<dyn PushGateway>) -> Result<(), Error> {
        self.gateway
            .set(gateway)
            .map_err(|_| anyhow!("Push gateway already initialized"))?;

        info!("Push gateway ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.gateway.get().is_some()
    }

    pub fn gateway(&self) -> Result<Arc<dyn PushGateway>, GatewayError> {
        self.gateway.get().cloned().ok_or(GatewayError::Unavailable)
    }
}
