use anyhow::{Error, Result, anyhow};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{debug, info};

use crate::{config::Config, models::message::FailedEvent};

const CONSUMER_TAG: &str = "order_notify_worker";

/// Order-event queue plus the queue failed events are parked on.
pub struct RabbitMqClient {
    channel: Channel,
    order_events_queue: String,
    failed_events_queue: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        for queue in [&config.order_events_queue, &config.failed_events_queue] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;

            debug!(queue = %queue, "Queue declared");
        }

        info!(
            order_events_queue = %config.order_events_queue,
            prefetch_count = config.prefetch_count,
            "RabbitMQ connection established"
        );

        Ok(Self {
            channel,
            order_events_queue: config.order_events_queue.clone(),
            failed_events_queue: config.failed_events_queue.clone(),
        })
    }

    pub async fn create_consumer(&self) -> Result<Consumer, Error> {
        self.channel
            .basic_consume(
                &self.order_events_queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge event: {}", e))
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| anyhow!("Failed to reject event: {}", e))
    }

    pub async fn publish_failed(&self, event: &FailedEvent) -> Result<(), Error> {
        let payload = serde_json::to_vec(event)?;

        self.channel
            .basic_publish(
                "",
                &self.failed_events_queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish failed event: {}", e))?;

        Ok(())
    }
}
