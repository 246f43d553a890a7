use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use order_notify::{
    api::{AppState, run_api_server},
    clients::{
        database::PostgresStore, fcm::FcmClient, health::HealthChecker, messaging::Messaging,
        rbmq::RabbitMqClient,
    },
    config::Config,
    services::{
        delivery::{DeliveryEngine, DrainSettings},
        order_events::OrderEventHandler,
        scheduler::run_scheduled_drain,
    },
    utils::retry_with_backoff,
    worker::run_event_worker,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Config::load()?;
    let retry_config = config.retry_config();

    let store = Arc::new(
        retry_with_backoff(&retry_config, "database_connect", || {
            PostgresStore::connect(&config.database_url)
        })
        .await?,
    );
    store.ensure_schema().await?;

    let messaging = Arc::new(Messaging::new());
    init_gateway(&config, &messaging).await;

    let engine = Arc::new(DeliveryEngine::new(
        store.clone(),
        store.clone(),
        messaging.clone(),
        DrainSettings::from(&config),
    ));
    let handler = Arc::new(OrderEventHandler::new(
        store.clone(),
        store.clone(),
        messaging.clone(),
    ));

    let rabbitmq = Arc::new(
        retry_with_backoff(&retry_config, "rabbitmq_connect", || {
            RabbitMqClient::connect(&config)
        })
        .await?,
    );

    let state = Arc::new(AppState {
        engine: engine.clone(),
        store: store.clone(),
        messaging: messaging.clone(),
        health_checker: HealthChecker::new(store.clone(), messaging.clone()),
    });

    info!("Order notification service is ready");

    tokio::select! {
        result = run_api_server(config.server_port, state) => {
            result.map_err(|e| anyhow!("HTTP server failed: {}", e))?;
        }
        result = run_event_worker(rabbitmq, handler, config.worker_concurrency) => {
            result?;
        }
        () = run_scheduled_drain(engine, config.drain_interval()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("order_notify=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn init_gateway(config: &Config, messaging: &Messaging) {
    let Some(project_id) = config.fcm_project() else {
        warn!("Push gateway not initialized (FCM_ENABLED=false or FCM_PROJECT_ID unset)");
        return;
    };

    match FcmClient::from_default_credentials(&config.fcm_base_url, project_id).await {
        Ok(client) => {
            if let Err(e) = messaging.initialize(Arc::new(client)) {
                warn!(error = %e, "Push gateway initialization skipped");
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize push gateway, continuing without push delivery");
        }
    }
}
