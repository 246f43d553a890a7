use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use futures_util::StreamExt;
use tracing::{error, info, warn};

use crate::{
    clients::rbmq::RabbitMqClient,
    models::{message::FailedEvent, order::OrderEvent},
    services::order_events::OrderEventHandler,
};

/// Consumes order events until the broker closes the stream.
///
/// A handled event is acked. A failed or malformed event is parked on the
/// failed-events queue and rejected; if parking fails it is requeued instead.
pub async fn run_event_worker(
    rabbitmq: Arc<RabbitMqClient>,
    handler: Arc<OrderEventHandler>,
    concurrency: usize,
) -> Result<(), Error> {
    let consumer = rabbitmq.create_consumer().await?;

    info!(concurrency, "Order event worker started");

    consumer
        .for_each_concurrent(concurrency, |delivery| {
            let rabbitmq = Arc::clone(&rabbitmq);
            let handler = Arc::clone(&handler);

            async move {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!(error = %e, "Failed to receive order event");
                        return;
                    }
                };

                let tag = delivery.delivery_tag;
                let payload = String::from_utf8_lossy(&delivery.data).into_owned();

                match process_event(&payload, &handler).await {
                    Ok(()) => {
                        if let Err(e) = rabbitmq.acknowledge(tag).await {
                            error!(error = %e, "Failed to acknowledge order event");
                        }
                    }
                    Err(e) => park_failed_event(&rabbitmq, tag, payload, &e).await,
                }
            }
        })
        .await;

    Err(anyhow!("Order event consumer stream ended"))
}

pub async fn process_event(payload: &str, handler: &OrderEventHandler) -> Result<(), Error> {
    let event: OrderEvent =
        serde_json::from_str(payload).map_err(|e| anyhow!("Malformed order event: {}", e))?;

    info!(order_id = %event.order_id(), "Processing order event");

    handler.handle(&event).await?;
    Ok(())
}

async fn park_failed_event(rabbitmq: &RabbitMqClient, tag: u64, payload: String, reason: &Error) {
    warn!(error = %reason, "Order event failed, moving to failed-events queue");

    let failed = FailedEvent {
        original_payload: payload,
        failure_reason: reason.to_string(),
        failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    let requeue = match rabbitmq.publish_failed(&failed).await {
        Ok(()) => false,
        Err(e) => {
            error!(error = %e, "Failed to park order event, requeueing");
            true
        }
    };

    if let Err(e) = rabbitmq.reject(tag, requeue).await {
        error!(error = %e, "Failed to reject order event");
    }
}
