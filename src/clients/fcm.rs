use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::{
    clients::messaging::PushGateway,
    error::GatewayError,
    models::{
        fcm::{FcmErrorResponse, FcmMessage, FcmRequest, FcmResponse},
        message::{BatchResponse, MULTICAST_LIMIT, MulticastMessage, PushMessage, SendResponse},
    },
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

/// Where the OAuth bearer token for FCM comes from.
pub enum FcmAuth {
    Google(Arc<dyn TokenProvider>),
    /// Fixed token, for emulators and tests.
    Static(String),
}

impl FcmAuth {
    async fn bearer(&self) -> Result<String, GatewayError> {
        match self {
            FcmAuth::Google(provider) => {
                let token = provider.token(FCM_SCOPES).await?;
                Ok(token.as_str().to_string())
            }
            FcmAuth::Static(token) => Ok(token.clone()),
        }
    }
}

/// Push Gateway Client speaking the FCM HTTP v1 API.
pub struct FcmClient {
    http_client: Client,
    send_url: String,
    auth: FcmAuth,
}

impl FcmClient {
    pub fn new(base_url: &str, project_id: &str, auth: FcmAuth) -> Self {
        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            base_url.trim_end_matches('/'),
            project_id
        );

        info!(project_id, "FCM client initialized");

        Self {
            http_client: Client::new(),
            send_url,
            auth,
        }
    }

    /// Resolves application default credentials and builds a client.
    pub async fn from_default_credentials(
        base_url: &str,
        project_id: &str,
    ) -> Result<Self, GatewayError> {
        let provider = gcp_auth::provider().await?;
        Ok(Self::new(base_url, project_id, FcmAuth::Google(provider)))
    }

    async fn send_with_bearer(
        &self,
        bearer: &str,
        message: &PushMessage,
    ) -> Result<String, GatewayError> {
        let request = FcmRequest {
            message: FcmMessage::from(message),
        };

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(bearer)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let sent: FcmResponse = response.json().await?;
            debug!(message_name = %sent.name, "FCM push notification accepted");
            Ok(sent.name)
        } else {
            let error_text = response.text().await?;
            Err(classify_error(status, &error_text))
        }
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<String, GatewayError> {
        let bearer = self.auth.bearer().await?;
        self.send_with_bearer(&bearer, message).await
    }

    async fn send_multicast(
        &self,
        message: &MulticastMessage,
    ) -> Result<BatchResponse, GatewayError> {
        if message.tokens.len() > MULTICAST_LIMIT {
            return Err(GatewayError::TooManyTokens {
                max: MULTICAST_LIMIT,
                got: message.tokens.len(),
            });
        }
        if message.tokens.is_empty() {
            return Ok(BatchResponse::default());
        }

        let bearer = self.auth.bearer().await?;

        let sends = message.tokens.iter().map(|token| {
            let single = message.for_token(token);
            let bearer = bearer.as_str();
            async move {
                let result = self.send_with_bearer(bearer, &single).await;
                SendResponse {
                    token: single.token,
                    result,
                }
            }
        });

        Ok(BatchResponse::from_responses(join_all(sends).await))
    }
}

/// Maps an FCM error response onto the gateway failure classes.
pub fn classify_error(status: StatusCode, body: &str) -> GatewayError {
    let Ok(parsed) = serde_json::from_str::<FcmErrorResponse>(body) else {
        return GatewayError::Rejected {
            code: status.as_u16().to_string(),
            message: body.to_string(),
        };
    };

    let error = parsed.error;
    let code = error.error_code().to_string();

    let invalid_token = match code.as_str() {
        "UNREGISTERED" => true,
        "INVALID_ARGUMENT" => error.message.to_lowercase().contains("registration token"),
        _ => false,
    };

    if invalid_token {
        GatewayError::InvalidToken(error.message)
    } else {
        GatewayError::Rejected {
            code,
            message: error.message,
        }
    }
}
