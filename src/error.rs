use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::response::ErrorResponse;

/// Classified failure of a push gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("push gateway is not initialized")]
    Unavailable,

    /// The registration token is permanently unusable.
    #[error("invalid or unregistered registration token: {0}")]
    InvalidToken(String),

    #[error("push gateway rejected the message ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("push gateway transport error: {0}")]
    Transport(String),

    #[error("multicast accepts at most {max} tokens, got {got}")]
    TooManyTokens { max: usize, got: usize },
}

impl GatewayError {
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, GatewayError::InvalidToken(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

impl From<gcp_auth::Error> for GatewayError {
    fn from(e: gcp_auth::Error) -> Self {
        GatewayError::Transport(format!("access token unavailable: {}", e))
    }
}

/// Failure of an order-event handler, surfaced to the event infrastructure.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("notification delivery failed: {0}")]
    Delivery(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TriggerError> for ApiError {
    fn from(e: TriggerError) -> Self {
        match e {
            TriggerError::Delivery(gateway) => ApiError::Gateway(gateway),
            TriggerError::Store(store) => ApiError::Internal(store),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Gateway(GatewayError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
