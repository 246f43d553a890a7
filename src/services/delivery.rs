use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    clients::{
        messaging::{Messaging, PushGateway},
        store::{NotificationStore, OrderStore},
    },
    config::Config,
    error::{GatewayError, TriggerError},
    models::{
        message::PushMessage,
        notification::{DeliveryOutcome, DrainReport, NotificationMutation, PendingNotification},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    pub max_batch: usize,
    pub max_attempts: u32,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            max_batch: 100,
            max_attempts: 3,
        }
    }
}

impl From<&Config> for DrainSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_batch: config.drain_batch_size,
            max_attempts: config.drain_max_attempts,
        }
    }
}

/// Drains the pending-notification queue one bounded batch at a time.
pub struct DeliveryEngine {
    store: Arc<dyn NotificationStore>,
    orders: Arc<dyn OrderStore>,
    messaging: Arc<Messaging>,
    settings: DrainSettings,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        orders: Arc<dyn OrderStore>,
        messaging: Arc<Messaging>,
        settings: DrainSettings,
    ) -> Self {
        Self {
            store,
            orders,
            messaging,
            settings,
        }
    }

    pub fn settings(&self) -> DrainSettings {
        self.settings
    }

    /// Runs one drain cycle.
    ///
    /// Every mutation for the batch is decided first and committed in a
    /// single write afterwards. Per-record gateway failures never abort the
    /// cycle; store failures and an uninitialized gateway do.
    pub async fn drain(&self) -> Result<DrainReport, TriggerError> {
        let gateway = self.messaging.gateway()?;

        let batch = self
            .store
            .fetch_pending(self.settings.max_attempts, self.settings.max_batch)
            .await?;

        let over_budget = self.over_budget().await;

        if batch.is_empty() {
            debug!("No pending notifications to process");
            return Ok(DrainReport {
                over_budget,
                ..DrainReport::default()
            });
        }

        let mut report = DrainReport {
            over_budget,
            ..DrainReport::default()
        };
        let mut mutations = Vec::with_capacity(batch.len());
        let mut stale_orders = Vec::new();

        for record in &batch {
            let outcome = self.attempt(gateway.as_ref(), record).await;
            report.record(outcome);
            mutations.push(mutation_for(record, outcome));

            if outcome == DeliveryOutcome::InvalidToken {
                if let Some(order_id) = &record.order_id {
                    stale_orders.push(order_id.clone());
                }
            }
        }

        self.store.commit(&mutations).await?;

        for order_id in stale_orders {
            if let Err(e) = self.orders.clear_customer_token(&order_id).await {
                warn!(order_id = %order_id, error = %e, "Failed to clear invalid customer token");
            }
        }

        info!(
            processed = report.processed,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            over_budget = report.over_budget,
            "Drain cycle completed"
        );

        Ok(report)
    }

    /// Counted for the summary only; a failed count does not fail the cycle.
    async fn over_budget(&self) -> usize {
        let max_attempts = self.settings.max_attempts;
        match self.store.count_over_budget(max_attempts).await {
            Ok(0) => 0,
            Ok(count) => {
                warn!(
                    count,
                    max_attempts,
                    "Pending notifications exceed the attempt budget and will not be retried"
                );
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to count over-budget notifications");
                0
            }
        }
    }

    async fn attempt(
        &self,
        gateway: &dyn PushGateway,
        record: &PendingNotification,
    ) -> DeliveryOutcome {
        if record.is_unroutable() {
            debug!(notification_id = %record.id, "Dropping notification without token");
            return DeliveryOutcome::Unroutable;
        }

        let message = PushMessage {
            token: record.fcm_token.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            data: record.delivery_data(),
        };

        match gateway.send(&message).await {
            Ok(message_id) => {
                debug!(notification_id = %record.id, message_id = %message_id, "Pending notification sent");
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                let outcome = classify_failure(&e, record.attempts, self.settings.max_attempts);
                warn!(
                    notification_id = %record.id,
                    attempts = record.attempts,
                    outcome = ?outcome,
                    error = %e,
                    "Pending notification send failed"
                );
                outcome
            }
        }
    }
}

/// Retry-budget decision for a failed send of a record that has already
/// been tried `attempts` times.
pub fn classify_failure(error: &GatewayError, attempts: u32, max_attempts: u32) -> DeliveryOutcome {
    if error.is_invalid_token() {
        DeliveryOutcome::InvalidToken
    } else if attempts + 1 >= max_attempts {
        DeliveryOutcome::Exhausted
    } else {
        DeliveryOutcome::Retrying
    }
}

fn mutation_for(record: &PendingNotification, outcome: DeliveryOutcome) -> NotificationMutation {
    match outcome {
        DeliveryOutcome::Retrying => NotificationMutation::SetAttempts {
            id: record.id,
            attempts: record.attempts + 1,
        },
        _ => NotificationMutation::Delete { id: record.id },
    }
}
