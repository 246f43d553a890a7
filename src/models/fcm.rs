use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::message::PushMessage;

pub const ANDROID_PRIORITY: &str = "high";
pub const ANDROID_CHANNEL_ID: &str = "order_updates";
pub const NOTIFICATION_SOUND: &str = "default";
pub const APNS_BADGE: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct FcmRequest {
    pub message: FcmMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmMessage {
    pub token: String,
    pub notification: FcmNotification,

    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub data: HashMap<String, String>,

    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

impl From<&PushMessage> for FcmMessage {
    fn from(message: &PushMessage) -> Self {
        Self {
            token: message.token.clone(),
            notification: FcmNotification {
                title: message.title.clone(),
                body: message.body.clone(),
            },
            data: message.data.clone(),
            android: AndroidConfig::default(),
            apns: ApnsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AndroidConfig {
    pub priority: String,
    pub notification: AndroidNotification,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self {
            priority: ANDROID_PRIORITY.to_string(),
            notification: AndroidNotification {
                channel_id: ANDROID_CHANNEL_ID.to_string(),
                sound: NOTIFICATION_SOUND.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidNotification {
    pub channel_id: String,
    pub sound: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsConfig {
    pub payload: ApnsPayload,
}

impl Default for ApnsConfig {
    fn default() -> Self {
        Self {
            payload: ApnsPayload {
                aps: Aps {
                    sound: NOTIFICATION_SOUND.to_string(),
                    badge: APNS_BADGE,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aps {
    pub sound: String,
    pub badge: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmResponse {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorResponse {
    pub error: FcmErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorDetail {
    #[serde(rename = "@type", default)]
    pub type_url: String,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
}

impl FcmErrorBody {
    /// The FCM-specific error code if present, else the canonical RPC status.
    pub fn error_code(&self) -> &str {
        self.details
            .iter()
            .find_map(|d| d.error_code.as_deref())
            .unwrap_or(&self.status)
    }
}
