use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub database_url: String,

    pub rabbitmq_url: String,
    #[serde(default = "default_order_events_queue")]
    pub order_events_queue: String,
    #[serde(default = "default_failed_events_queue")]
    pub failed_events_queue: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default)]
    pub fcm_enabled: bool,
    #[serde(default)]
    pub fcm_project_id: Option<String>,
    #[serde(default = "default_fcm_base_url")]
    pub fcm_base_url: String,

    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: usize,
    #[serde(default = "default_drain_max_attempts")]
    pub drain_max_attempts: u32,
    #[serde(default = "default_drain_interval_seconds")]
    pub drain_interval_seconds: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_order_events_queue() -> String {
    "order_events".to_string()
}

fn default_failed_events_queue() -> String {
    "order_events.failed".to_string()
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_fcm_base_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_drain_batch_size() -> usize {
    100
}

fn default_drain_max_attempts() -> u32 {
    3
}

fn default_drain_interval_seconds() -> u64 {
    300
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_server_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.drain_batch_size == 0 {
            return Err(anyhow!("DRAIN_BATCH_SIZE must be greater than zero"));
        }
        if self.drain_max_attempts == 0 {
            return Err(anyhow!("DRAIN_MAX_ATTEMPTS must be greater than zero"));
        }
        if self.drain_interval_seconds == 0 {
            return Err(anyhow!("DRAIN_INTERVAL_SECONDS must be greater than zero"));
        }
        if self.worker_concurrency == 0 {
            return Err(anyhow!("WORKER_CONCURRENCY must be greater than zero"));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_seconds)
    }

    /// The project to send through, when push delivery is switched on.
    pub fn fcm_project(&self) -> Option<&str> {
        if !self.fcm_enabled {
            return None;
        }
        self.fcm_project_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}
