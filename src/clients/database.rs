use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clients::store::{NotificationStore, OrderStore, UserDirectory},
    models::{
        notification::{NewNotification, NotificationMutation, PendingNotification},
        order::{UserRecord, UserRole},
    },
};

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.client
            .lock()
            .await
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to apply schema: {}", e))?;

        debug!("Database schema is up to date");
        Ok(())
    }
}

fn pending_from_row(row: &Row) -> Result<PendingNotification, Error> {
    let data: JsonValue = row.try_get("data")?;
    let attempts: i32 = row.try_get("attempts")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(PendingNotification {
        id: row.try_get("id")?,
        fcm_token: row.try_get("fcm_token")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        data: match data {
            JsonValue::Object(map) => map,
            _ => Default::default(),
        },
        attempts: u32::try_from(attempts).unwrap_or(0),
        order_id: row.try_get("order_id")?,
        created_at,
    })
}

fn user_from_row(row: &Row) -> Result<UserRecord, Error> {
    let role: String = row.try_get("role")?;
    Ok(UserRecord {
        id: row.try_get("id")?,
        role: UserRole::from(role),
        fcm_token: row.try_get("fcm_token")?,
    })
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn fetch_pending(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<PendingNotification>> {
        let max_attempts = i32::try_from(max_attempts)?;
        let limit = i64::try_from(limit)?;

        let rows = self
            .client
            .lock()
            .await
            .query(
                r#"
                SELECT id, fcm_token, title, body, data, attempts, order_id, created_at
                FROM pending_notifications
                WHERE attempts < $1
                ORDER BY created_at
                LIMIT $2
                "#,
                &[&max_attempts, &limit],
            )
            .await
            .map_err(|e| anyhow!("Failed to query pending notifications: {}", e))?;

        rows.iter().map(pending_from_row).collect()
    }

    async fn count_over_budget(&self, max_attempts: u32) -> Result<usize> {
        let max_attempts = i32::try_from(max_attempts)?;

        let row = self
            .client
            .lock()
            .await
            .query_one(
                "SELECT COUNT(*) FROM pending_notifications WHERE attempts >= $1",
                &[&max_attempts],
            )
            .await
            .map_err(|e| anyhow!("Failed to count over-budget notifications: {}", e))?;

        let count: i64 = row.get(0);
        Ok(usize::try_from(count)?)
    }

    async fn commit(&self, mutations: &[NotificationMutation]) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        let delete = tx
            .prepare("DELETE FROM pending_notifications WHERE id = $1")
            .await?;
        let update = tx
            .prepare("UPDATE pending_notifications SET attempts = $2 WHERE id = $1")
            .await?;

        for mutation in mutations {
            match mutation {
                NotificationMutation::Delete { id } => {
                    tx.execute(&delete, &[id]).await?;
                }
                NotificationMutation::SetAttempts { id, attempts } => {
                    let attempts = i32::try_from(*attempts)?;
                    tx.execute(&update, &[id, &attempts]).await?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| anyhow!("Failed to commit notification batch: {}", e))?;

        debug!(mutations = mutations.len(), "Notification batch committed");
        Ok(())
    }

    async fn enqueue(&self, notification: NewNotification) -> Result<PendingNotification> {
        let pending = notification.into_pending(Uuid::new_v4(), Utc::now());
        let data = JsonValue::Object(pending.data.clone());

        self.client
            .lock()
            .await
            .execute(
                r#"
                INSERT INTO pending_notifications (
                    id, fcm_token, title, body, data, attempts, order_id, created_at
                )
                VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
                "#,
                &[
                    &pending.id,
                    &pending.fcm_token,
                    &pending.title,
                    &pending.body,
                    &data,
                    &pending.order_id,
                    &pending.created_at,
                ],
            )
            .await
            .map_err(|e| anyhow!("Failed to enqueue notification: {}", e))?;

        debug!(notification_id = %pending.id, "Pending notification stored");
        Ok(pending)
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .lock()
            .await
            .simple_query("SELECT 1")
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn clear_customer_token(&self, order_id: &str) -> Result<()> {
        self.client
            .lock()
            .await
            .execute(
                "UPDATE orders SET customer_fcm_token = NULL WHERE id = $1",
                &[&order_id],
            )
            .await
            .map_err(|e| anyhow!("Failed to clear customer token: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PostgresStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let row = self
            .client
            .lock()
            .await
            .query_opt(
                "SELECT id, role, fcm_token FROM users WHERE id = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| anyhow!("Failed to read user {}: {}", user_id, e))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_roles(&self, roles: &[UserRole]) -> Result<Vec<UserRecord>> {
        let roles: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();

        let rows = self
            .client
            .lock()
            .await
            .query(
                "SELECT id, role, fcm_token FROM users WHERE role = ANY($1)",
                &[&roles],
            )
            .await
            .map_err(|e| anyhow!("Failed to query users by role: {}", e))?;

        rows.iter().map(user_from_row).collect()
    }
}
