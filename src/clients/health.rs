use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::{
    clients::{messaging::Messaging, store::NotificationStore},
    models::health::{ComponentHealth, HealthCheckResponse, HealthStatus},
};

pub struct HealthChecker {
    store: Arc<dyn NotificationStore>,
    messaging: Arc<Messaging>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn NotificationStore>, messaging: Arc<Messaging>) -> Self {
        Self { store, messaging }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_store().await);
        checks.insert("push_gateway".to_string(), self.check_gateway());

        HealthCheckResponse {
            status: overall_status(&checks),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            checks,
        }
    }

    async fn check_store(&self) -> ComponentHealth {
        let start = Instant::now();

        match self.store.ping().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ComponentHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ComponentHealth::unhealthy(e.to_string())
            }
        }
    }

    fn check_gateway(&self) -> ComponentHealth {
        if self.messaging.is_ready() {
            ComponentHealth::healthy(0)
        } else {
            ComponentHealth::degraded("Push gateway not initialized".to_string())
        }
    }
}

fn overall_status(checks: &HashMap<String, ComponentHealth>) -> HealthStatus {
    if checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy)
    {
        HealthStatus::Unhealthy
    } else if checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
