use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Data key every delivered payload carries.
pub const DATA_TYPE_KEY: &str = "type";
pub const DEFAULT_DATA_TYPE: &str = "general";

/// A queued message that has not been confirmed delivered yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    pub id: Uuid,
    pub fcm_token: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
    pub attempts: u32,
    /// Order whose `customerFcmToken` this record was addressed to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingNotification {
    pub fn is_unroutable(&self) -> bool {
        self.fcm_token.trim().is_empty()
    }

    /// Payload handed to the gateway: values stringified, `type` defaulted
    /// when absent, empty, `null`, `false` or zero.
    pub fn delivery_data(&self) -> HashMap<String, String> {
        let mut data = normalize_data(&self.data);
        if self.data.get(DATA_TYPE_KEY).is_none_or(is_blank_value) {
            data.insert(DATA_TYPE_KEY.to_string(), DEFAULT_DATA_TYPE.to_string());
        }
        data
    }
}

fn is_blank_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Bool(b) => !b,
        JsonValue::Number(n) => n.as_f64() == Some(0.0),
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(default)]
    pub fcm_token: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl NewNotification {
    pub fn into_pending(self, id: Uuid, created_at: DateTime<Utc>) -> PendingNotification {
        PendingNotification {
            id,
            fcm_token: self.fcm_token,
            title: self.title,
            body: self.body,
            data: self.data,
            attempts: 0,
            order_id: self.order_id,
            created_at,
        }
    }
}

/// A write decided during a drain cycle, committed with the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationMutation {
    Delete { id: Uuid },
    SetAttempts { id: Uuid, attempts: u32 },
}

/// How a single record left the drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Unroutable,
    InvalidToken,
    Exhausted,
    Retrying,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    /// Records dropped for having no token; not part of `processed`.
    pub skipped: usize,
    /// Records beyond the attempt budget, left untouched by this cycle.
    pub over_budget: usize,
}

impl DrainReport {
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.successful += 1,
            DeliveryOutcome::Unroutable => self.skipped += 1,
            _ => self.failed += 1,
        }
        self.processed = self.successful + self.failed;
    }
}

/// Flattens an arbitrary JSON object into the string-only map the gateway
/// accepts. Lossy: numbers and booleans become their display form, `null`
/// becomes `"null"`, nested values become their JSON text.
pub fn normalize_data(data: &Map<String, JsonValue>) -> HashMap<String, String> {
    data.iter()
        .map(|(key, value)| (key.clone(), stringify_value(value)))
        .collect()
}

pub fn stringify_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
