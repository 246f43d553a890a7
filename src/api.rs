use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    clients::{health::HealthChecker, messaging::Messaging, store::NotificationStore},
    error::ApiError,
    models::{
        health::HealthStatus,
        message::{MulticastMessage, PushMessage},
        notification::{NewNotification, normalize_data},
        response::{
            DrainResponse, SendMultipleRequest, SendMultipleResponseBody, SendRequest,
            SendResponseBody,
        },
        validation::{require_non_blank, validate_fcm_token},
    },
    services::delivery::DeliveryEngine,
};

pub struct AppState {
    pub engine: Arc<DeliveryEngine>,
    pub store: Arc<dyn NotificationStore>,
    pub messaging: Arc<Messaging>,
    pub health_checker: HealthChecker,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/notifications/process-pending",
            post(process_pending_notifications),
        )
        .route("/api/notifications/pending", post(enqueue_notification))
        .route("/api/notifications/send", post(send_notification))
        .route("/api/notifications/send-multiple", post(send_batch_notifications))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    port: u16,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "HTTP server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn process_pending_notifications(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DrainResponse>, ApiError> {
    info!("Processing pending notifications on demand");

    match state.engine.drain().await {
        Ok(report) => Ok(Json(DrainResponse::from(report))),
        Err(e) => {
            error!(error = %e, "Error processing pending notifications");
            Err(e.into())
        }
    }
}

async fn enqueue_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewNotification>,
) -> Result<impl IntoResponse, ApiError> {
    require_non_blank("title", &request.title).map_err(validation)?;
    require_non_blank("body", &request.body).map_err(validation)?;

    let pending = state.store.enqueue(request).await?;
    info!(notification_id = %pending.id, "Pending notification enqueued");

    Ok((StatusCode::CREATED, Json(pending)))
}

async fn send_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponseBody>, ApiError> {
    let gateway = state.messaging.gateway()?;

    validate_fcm_token(&request.fcm_token).map_err(validation)?;
    require_non_blank("title", &request.title).map_err(validation)?;
    require_non_blank("body", &request.body).map_err(validation)?;

    let message = PushMessage {
        token: request.fcm_token,
        title: request.title,
        body: request.body,
        data: normalize_data(&request.data),
    };

    let message_id = gateway.send(&message).await.map_err(|e| {
        error!(error = %e, "Notification sending error");
        ApiError::from(e)
    })?;

    Ok(Json(SendResponseBody {
        success: true,
        message_id,
    }))
}

async fn send_batch_notifications(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendMultipleRequest>,
) -> Result<Json<SendMultipleResponseBody>, ApiError> {
    let gateway = state.messaging.gateway()?;

    if request.fcm_tokens.is_empty() {
        return Err(ApiError::Validation("fcmTokens array required".to_string()));
    }
    require_non_blank("title", &request.title).map_err(validation)?;
    require_non_blank("body", &request.body).map_err(validation)?;

    let message = MulticastMessage {
        tokens: request.fcm_tokens,
        title: request.title,
        body: request.body,
        data: normalize_data(&request.data),
    };

    let mut success_count = 0;
    let mut failure_count = 0;
    for chunk in message.chunks() {
        let response = gateway.send_multicast(&chunk).await.map_err(|e| {
            error!(error = %e, "Batch notification error");
            ApiError::from(e)
        })?;
        success_count += response.success_count;
        failure_count += response.failure_count;
    }

    Ok(Json(SendMultipleResponseBody {
        success: true,
        success_count,
        failure_count,
    }))
}

fn validation(e: anyhow::Error) -> ApiError {
    ApiError::Validation(e.to_string())
}
