use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::models::notification::DrainReport;

#[derive(Debug, Clone, Serialize)]
pub struct DrainResponse {
    pub success: bool,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl From<DrainReport> for DrainResponse {
    fn from(report: DrainReport) -> Self {
        Self {
            success: true,
            processed: report.processed,
            successful: report.successful,
            failed: report.failed,
            skipped: report.skipped,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: String) -> Self {
        Self {
            success: false,
            error,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub fcm_token: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponseBody {
    pub success: bool,
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMultipleRequest {
    pub fcm_tokens: Vec<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMultipleResponseBody {
    pub success: bool,
    pub success_count: usize,
    pub failure_count: usize,
}
