use std::{sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::services::delivery::DeliveryEngine;

/// Drains the pending queue every `period` until the task is dropped.
pub async fn run_scheduled_drain(engine: Arc<DeliveryEngine>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    info!(period_seconds = period.as_secs(), "Scheduled drain started");

    loop {
        ticker.tick().await;

        match engine.drain().await {
            Ok(report) => info!(
                successful = report.successful,
                "Scheduled processing completed"
            ),
            Err(e) => error!(error = %e, "Scheduled processing failed"),
        }
    }
}
