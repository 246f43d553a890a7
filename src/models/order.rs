use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Accepted,
    InTransit,
    Completed,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Other(s) => s,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => OrderStatus::Pending,
            "accepted" => OrderStatus::Accepted,
            "in_transit" => OrderStatus::InTransit,
            "completed" => OrderStatus::Completed,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Other(s),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Other(String::new())
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fields of an order document this service reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_fcm_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl OrderSnapshot {
    pub fn customer_token(&self) -> Option<&str> {
        self.customer_fcm_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    #[serde(rename_all = "camelCase")]
    OrderCreated { order_id: String, order: OrderSnapshot },
    #[serde(rename_all = "camelCase")]
    OrderUpdated {
        order_id: String,
        before: OrderSnapshot,
        after: OrderSnapshot,
    },
}

impl OrderEvent {
    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::OrderCreated { order_id, .. } => order_id,
            OrderEvent::OrderUpdated { order_id, .. } => order_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserRole {
    Customer,
    Driver,
    Both,
    Other(String),
}

impl UserRole {
    /// Roles that receive new-order broadcasts.
    pub const DRIVER_CAPABLE: [UserRole; 2] = [UserRole::Driver, UserRole::Both];

    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Driver => "driver",
            UserRole::Both => "both",
            UserRole::Other(s) => s,
        }
    }
}

impl From<String> for UserRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "customer" => UserRole::Customer,
            "driver" => UserRole::Driver,
            "both" => UserRole::Both,
            _ => UserRole::Other(s),
        }
    }
}

impl From<UserRole> for String {
    fn from(role: UserRole) -> Self {
        role.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub role: UserRole,
    #[serde(default)]
    pub fcm_token: Option<String>,
}

impl UserRecord {
    pub fn push_token(&self) -> Option<&str> {
        self.fcm_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}
