use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Hard per-call limit on multicast recipients.
pub const MULTICAST_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl MulticastMessage {
    /// Splits the recipient list into messages of at most `MULTICAST_LIMIT` tokens.
    pub fn chunks(&self) -> Vec<MulticastMessage> {
        self.tokens
            .chunks(MULTICAST_LIMIT)
            .map(|tokens| MulticastMessage {
                tokens: tokens.to_vec(),
                title: self.title.clone(),
                body: self.body.clone(),
                data: self.data.clone(),
            })
            .collect()
    }

    pub fn for_token(&self, token: &str) -> PushMessage {
        PushMessage {
            token: token.to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SendResponse {
    pub token: String,
    pub result: Result<String, GatewayError>,
}

#[derive(Debug, Default)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|r| r.result.is_ok()).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }
}

/// An order event whose handler failed, parked for platform-level retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEvent {
    pub original_payload: String,
    pub failure_reason: String,
    pub failed_at: String,
}
