use std::{collections::HashMap, sync::Arc};

use tracing::{debug, error, info, warn};

use crate::{
    clients::{
        messaging::Messaging,
        store::{OrderStore, UserDirectory},
    },
    error::TriggerError,
    models::{
        message::{MulticastMessage, PushMessage},
        order::{OrderEvent, OrderSnapshot, OrderStatus, UserRole},
    },
};

pub const NEW_ORDER_TITLE: &str = "New Order Available";
pub const NEW_ORDER_TYPE: &str = "new_order";
const UNKNOWN_ADDRESS: &str = "Unknown address";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTemplate {
    pub title: &'static str,
    pub body: &'static str,
    pub notification_type: &'static str,
}

/// Customer-facing message for a status, if that status is announced at all.
pub fn status_template(status: &OrderStatus) -> Option<StatusTemplate> {
    match status {
        OrderStatus::Accepted => Some(StatusTemplate {
            title: "Order Accepted",
            body: "A driver has accepted your order",
            notification_type: "order_accepted",
        }),
        OrderStatus::InTransit => Some(StatusTemplate {
            title: "Order In Transit",
            body: "Your order is on the way",
            notification_type: "order_in_transit",
        }),
        OrderStatus::Completed => Some(StatusTemplate {
            title: "Order Completed",
            body: "Your order has been delivered",
            notification_type: "order_completed",
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChangeOutcome {
    Unchanged,
    NotAnnounced,
    NoToken,
    Sent { message_id: String },
    TokenInvalidated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewOrderOutcome {
    NotPending,
    NoDriverTokens,
    Broadcast {
        chunks: usize,
        failed_chunks: usize,
        success_count: usize,
        failure_count: usize,
    },
}

/// Turns order lifecycle events into push notifications.
pub struct OrderEventHandler {
    users: Arc<dyn UserDirectory>,
    orders: Arc<dyn OrderStore>,
    messaging: Arc<Messaging>,
}

impl OrderEventHandler {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderStore>,
        messaging: Arc<Messaging>,
    ) -> Self {
        Self {
            users,
            orders,
            messaging,
        }
    }

    pub async fn handle(&self, event: &OrderEvent) -> Result<(), TriggerError> {
        match event {
            OrderEvent::OrderUpdated {
                order_id,
                before,
                after,
            } => {
                self.on_order_status_change(order_id, before, after).await?;
            }
            OrderEvent::OrderCreated { order_id, order } => {
                self.on_new_order(order_id, order).await?;
            }
        }
        Ok(())
    }

    /// Notifies the customer when an order moves to an announced status.
    ///
    /// The send is attempted immediately. Any gateway failure other than an
    /// invalid token is returned to the caller.
    pub async fn on_order_status_change(
        &self,
        order_id: &str,
        before: &OrderSnapshot,
        after: &OrderSnapshot,
    ) -> Result<StatusChangeOutcome, TriggerError> {
        if before.status == after.status {
            debug!(order_id, status = %after.status, "Order status unchanged");
            return Ok(StatusChangeOutcome::Unchanged);
        }

        let Some(template) = status_template(&after.status) else {
            debug!(order_id, status = %after.status, "No notification for status");
            return Ok(StatusChangeOutcome::NotAnnounced);
        };

        let Some(token) = self.resolve_customer_token(order_id, after).await else {
            info!(order_id, "No FCM token available for customer");
            return Ok(StatusChangeOutcome::NoToken);
        };

        let gateway = self.messaging.gateway()?;

        let message = PushMessage {
            token,
            title: template.title.to_string(),
            body: template.body.to_string(),
            data: HashMap::from([
                ("type".to_string(), template.notification_type.to_string()),
                ("orderId".to_string(), order_id.to_string()),
                ("status".to_string(), after.status.to_string()),
            ]),
        };

        match gateway.send(&message).await {
            Ok(message_id) => {
                info!(order_id, message_id = %message_id, "Order status notification sent");
                Ok(StatusChangeOutcome::Sent { message_id })
            }
            Err(e) if e.is_invalid_token() => {
                warn!(order_id, error = %e, "Invalid customer token, removing from order");
                if let Err(clear_err) = self.orders.clear_customer_token(order_id).await {
                    error!(order_id, error = %clear_err, "Failed to remove invalid customer token");
                }
                Ok(StatusChangeOutcome::TokenInvalidated)
            }
            Err(e) => {
                error!(order_id, error = %e, "Order status notification failed");
                Err(e.into())
            }
        }
    }

    /// Prefers the token on the order, then the customer's user record.
    /// A failed user lookup counts as no token.
    async fn resolve_customer_token(&self, order_id: &str, order: &OrderSnapshot) -> Option<String> {
        if let Some(token) = order.customer_token() {
            return Some(token.to_string());
        }

        debug!(order_id, customer_id = %order.customer_id, "Looking up customer token");
        match self.users.find_user(&order.customer_id).await {
            Ok(user) => user.and_then(|u| u.push_token().map(str::to_string)),
            Err(e) => {
                warn!(order_id, customer_id = %order.customer_id, error = %e, "Customer lookup failed");
                None
            }
        }
    }

    /// Broadcasts a new pending order to every driver with a token.
    ///
    /// Chunks are sent sequentially and a failed chunk does not stop the rest.
    pub async fn on_new_order(
        &self,
        order_id: &str,
        order: &OrderSnapshot,
    ) -> Result<NewOrderOutcome, TriggerError> {
        if order.status != OrderStatus::Pending {
            debug!(order_id, status = %order.status, "Order not pending, skipping drivers");
            return Ok(NewOrderOutcome::NotPending);
        }

        let drivers = self.users.find_by_roles(&UserRole::DRIVER_CAPABLE).await?;
        let tokens: Vec<String> = drivers
            .iter()
            .filter_map(|driver| driver.push_token().map(str::to_string))
            .collect();

        if tokens.is_empty() {
            info!(order_id, drivers = drivers.len(), "No driver FCM tokens available");
            return Ok(NewOrderOutcome::NoDriverTokens);
        }

        let gateway = self.messaging.gateway()?;
        let message = new_order_message(order_id, order, tokens);

        let chunks = message.chunks();
        let mut failed_chunks = 0;
        let mut success_count = 0;
        let mut failure_count = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            match gateway.send_multicast(chunk).await {
                Ok(response) => {
                    info!(
                        order_id,
                        chunk = index + 1,
                        success_count = response.success_count,
                        failure_count = response.failure_count,
                        "New order notification chunk sent"
                    );
                    success_count += response.success_count;
                    failure_count += response.failure_count;
                }
                Err(e) => {
                    error!(order_id, chunk = index + 1, error = %e, "New order notification chunk failed");
                    failed_chunks += 1;
                }
            }
        }

        Ok(NewOrderOutcome::Broadcast {
            chunks: chunks.len(),
            failed_chunks,
            success_count,
            failure_count,
        })
    }
}

pub fn new_order_message(order_id: &str, order: &OrderSnapshot, tokens: Vec<String>) -> MulticastMessage {
    let gas_quantity = order.gas_quantity.unwrap_or(0.0).to_string();
    let address = order
        .address
        .as_deref()
        .filter(|a| !a.is_empty())
        .unwrap_or(UNKNOWN_ADDRESS);

    MulticastMessage {
        tokens,
        title: NEW_ORDER_TITLE.to_string(),
        body: format!("{} gallons at {}", gas_quantity, address),
        data: HashMap::from([
            ("type".to_string(), NEW_ORDER_TYPE.to_string()),
            ("orderId".to_string(), order_id.to_string()),
            ("address".to_string(), address.to_string()),
            ("gasQuantity".to_string(), gas_quantity),
        ]),
    }
}
