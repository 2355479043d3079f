//! SQLite Message Repository Implementation
//!
//! Timestamps are stored as epoch milliseconds and ids as TEXT.

use async_trait::async_trait;
use chrono::Utc;
use herald_common::{Message, MessageStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::repository::{ensure_terminal, MessageRepository, MessageRow, DEFAULT_TABLE};

/// SQLite implementation of MessageRepository
pub struct SqliteMessageRepository {
    pool: SqlitePool,
    table: String,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_table(pool, DEFAULT_TABLE)
    }

    pub fn with_table(pool: SqlitePool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn parse_row(row: &SqliteRow) -> Result<Message, StoreError> {
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

    fn parse_rows(rows: &[SqliteRow]) -> Result<Vec<Message>, StoreError> {
        rows.iter().map(Self::parse_row).collect()
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn get_pending(&self, limit: u32) -> Result<Vec<Message>, StoreError> {
        let query = format!(
            "SELECT id, recipient, content, status, created_at, updated_at, sent_at \
             FROM {} WHERE status = ? ORDER BY created_at ASC, rowid ASC LIMIT ?",
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(MessageStatus::Pending.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let messages = Self::parse_rows(&rows)?;
        debug!(table = %self.table, count = messages.len(), "Fetched pending messages");
        Ok(messages)
    }

    async fn update_status(&self, id: Uuid, status: MessageStatus) -> Result<(), StoreError> {
        ensure_terminal(id, status)?;
        let now = Utc::now().timestamp_millis();

        let result = if status == MessageStatus::Sent {
            let query = format!(
                "UPDATE {} SET status = ?, updated_at = ?, sent_at = ? WHERE id = ?",
                self.table
            );
            sqlx::query(&query)
                .bind(status.as_str())
                .bind(now)
                .bind(now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?
        } else {
            let query = format!(
                "UPDATE {} SET status = ?, updated_at = ? WHERE id = ?",
                self.table
            );
            sqlx::query(&query)
                .bind(status.as_str())
                .bind(now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?
        };

        debug!(%id, status = %status, rows = result.rows_affected(), "Updated message status");
        Ok(())
    }

    async fn create(&self, message: &Message) -> Result<(), StoreError> {
        message.validate()?;

        let query = format!(
            "INSERT INTO {} (id, recipient, content, status, created_at, updated_at, sent_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
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
             FROM {} WHERE status = ? ORDER BY sent_at DESC, rowid DESC",
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(MessageStatus::Sent.as_str())
            .fetch_all(&self.pool)
            .await?;

        Self::parse_rows(&rows)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    recipient TEXT NOT NULL,
                    content TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'PENDING',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    sent_at INTEGER
                )",
                self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_status_created ON {0} (status, created_at)",
                self.table
            ),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!(table = %self.table, "SQLite message schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use herald_common::NewMessage;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqliteMessageRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteMessageRepository::new(pool);
        repo.init_schema().await.unwrap();
        repo
    }

    fn message_at(to: &str, offset_secs: i64) -> Message {
        let mut message = Message::new(NewMessage::new(to, "hello")).unwrap();
        message.created_at = message.created_at + ChronoDuration::seconds(offset_secs);
        message.updated_at = message.created_at;
        message
    }

    #[tokio::test]
    async fn test_pending_oldest_first_and_capped() {
        let repo = setup().await;
        let newest = message_at("+900000003", 30);
        let oldest = message_at("+900000001", -30);
        let middle = message_at("+900000002", 0);
        for m in [&newest, &oldest, &middle] {
            repo.create(m).await.unwrap();
        }

        let pending = repo.get_pending(2).await.unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![oldest.id, middle.id]);
        assert_eq!(pending[0].to, "+900000001");
    }

    #[tokio::test]
    async fn test_sent_stamps_sent_at() {
        let repo = setup().await;
        let message = message_at("+900000001", 0);
        repo.create(&message).await.unwrap();

        repo.update_status(message.id, MessageStatus::Sent).await.unwrap();

        assert!(repo.get_pending(10).await.unwrap().is_empty());
        let sent = repo.get_all_sent().await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, message.id);
        assert_eq!(sent[0].status, MessageStatus::Sent);
        assert!(sent[0].sent_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_is_not_listed_as_sent() {
        let repo = setup().await;
        let message = message_at("+900000001", 0);
        repo.create(&message).await.unwrap();

        repo.update_status(message.id, MessageStatus::Failed).await.unwrap();

        assert!(repo.get_pending(10).await.unwrap().is_empty());
        assert!(repo.get_all_sent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let repo = setup().await;
        let message = message_at("+900000001", 0);
        repo.create(&message).await.unwrap();

        repo.update_status(message.id, MessageStatus::Sent).await.unwrap();
        repo.update_status(message.id, MessageStatus::Failed).await.unwrap();
        assert!(repo.get_all_sent().await.unwrap().is_empty());

        repo.update_status(message.id, MessageStatus::Sent).await.unwrap();
        assert_eq!(repo.get_all_sent().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_target_is_refused() {
        let repo = setup().await;
        let message = message_at("+900000001", 0);
        repo.create(&message).await.unwrap();

        let result = repo.update_status(message.id, MessageStatus::Pending).await;
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_unknown_id_is_noop() {
        let repo = setup().await;
        repo.update_status(Uuid::new_v4(), MessageStatus::Sent).await.unwrap();
        assert!(repo.get_all_sent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_message() {
        let repo = setup().await;
        let mut message = message_at("+900000001", 0);
        message.content = String::new();

        let result = repo.create(&message).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(repo.get_pending(10).await.unwrap().is_empty());
    }
}
