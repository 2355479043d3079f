//! PostgreSQL Message Repository Implementation

use async_trait::async_trait;
use chrono::Utc;
use herald_common::{Message, MessageStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::repository::{ensure_terminal, MessageRepository, MessageRow, DEFAULT_TABLE};

/// PostgreSQL implementation of MessageRepository
pub struct PostgresMessageRepository {
    pool: PgPool,
    table: String,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, DEFAULT_TABLE)
    }

    pub fn with_table(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn parse_row(row: &PgRow) -> Result<Message, StoreError> {
        MessageRow {
            id: row.try_get("id")?,
            recipient: row.try_get("recipient")?,
            content: row.try_get("content")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            sent_at: row.try_get("sent_at")?,
        }
        .into_message()
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn get_pending(&self, limit: u32) -> Result<Vec<Message>, StoreError> {
        let query = format!(
            "SELECT id, recipient, content, status, created_at, updated_at, sent_at \
             FROM {} WHERE status = $1 ORDER BY created_at ASC, id ASC LIMIT $2",
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(MessageStatus::Pending.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let messages = rows.iter().map(Self::parse_row).collect::<Result<Vec<_>, _>>()?;
        debug!(table = %self.table, count = messages.len(), "Fetched pending messages");
        Ok(messages)
    }

    async fn update_status(&self, id: Uuid, status: MessageStatus) -> Result<(), StoreError> {
        ensure_terminal(id, status)?;
        let now = Utc::now().timestamp_millis();

        // FAILED keeps whatever sent_at an earlier SENT write left behind
        let query = format!(
            "UPDATE {} SET status = $1, updated_at = $2, \
             sent_at = CASE WHEN $1 = 'SENT' THEN $2 ELSE sent_at END \
             WHERE id = $3",
            self.table
        );

        let result = sqlx::query(&query)
            .bind(status.as_str())
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(%id, status = %status, rows = result.rows_affected(), "Updated message status");
        Ok(())
    }

    async fn create(&self, message: &Message) -> Result<(), StoreError> {
        message.validate()?;

        let query = format!(
            "INSERT INTO {} (id, recipient, content, status, created_at, updated_at, sent_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table
        );

        sqlx::query(&query)
            .bind(message.id.to_string())
            .bind(&message.to)
            .bind(&message.content)
            .bind(message.status.as_str())
            .bind(message.created_at.timestamp_millis())
            .bind(message.updated_at.timestamp_millis())
            .bind(message.sent_at.map(|t| t.timestamp_millis()))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_all_sent(&self) -> Result<Vec<Message>, StoreError> {
        let query = format!(
            "SELECT id, recipient, content, status, created_at, updated_at, sent_at \
             FROM {} WHERE status = $1 ORDER BY sent_at DESC NULLS LAST",
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(MessageStatus::Sent.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id VARCHAR(36) PRIMARY KEY,
                    recipient TEXT NOT NULL,
                    content TEXT NOT NULL,
                    status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    sent_at BIGINT
                )",
                self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_status_created ON {0} (status, created_at)",
                self.table
            ),
        ];

        // Prepared statements take one command each
        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!(table = %self.table, "PostgreSQL message schema initialized");
        Ok(())
    }
}
