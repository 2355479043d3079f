//! Message Store Trait
//!
//! The dispatch worker reads pending messages and records outcomes through
//! this interface; the control surface uses it to create and list messages.

use async_trait::async_trait;
use herald_common::{Message, MessageStatus};
use uuid::Uuid;

use crate::error::StoreError;

/// Persistence for outbound messages
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Up to `limit` `PENDING` messages, oldest first
    async fn get_pending(&self, limit: u32) -> Result<Vec<Message>, StoreError>;

    /// Unconditionally overwrite a message's status.
    ///
    /// There is no check against the current status, so concurrent writers
    /// resolve as last-write-wins. A `SENT` write also stamps `sent_at`.
    /// Targeting `PENDING` is refused. Unknown ids are a silent no-op.
    async fn update_status(&self, id: Uuid, status: MessageStatus) -> Result<(), StoreError>;

    /// Persist a new message after validating it
    async fn create(&self, message: &Message) -> Result<(), StoreError>;

    /// All `SENT` messages, most recently sent first
    async fn get_all_sent(&self) -> Result<Vec<Message>, StoreError>;

    /// Create tables and indexes if the backend needs them
    async fn init_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Status updates may only move a message into a terminal state
pub(crate) fn ensure_terminal(id: Uuid, status: MessageStatus) -> Result<(), StoreError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { id, status })
    }
}

/// Default table name for the SQL backends
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub const DEFAULT_TABLE: &str = "messages";

/// Raw column values as the SQL backends store them (epoch millis, TEXT ids)
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) struct MessageRow {
    pub id: String,
    pub recipient: String,
    pub content: String,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub sent_at: Option<i64>,
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl MessageRow {
    pub fn into_message(self) -> Result<Message, StoreError> {
        use chrono::DateTime;

        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::CorruptRow(format!("id {}: {}", self.id, e)))?;
        let status = self
            .status
            .parse::<MessageStatus>()
            .map_err(|e| StoreError::CorruptRow(format!("message {}: {}", id, e)))?;
        let timestamp = |column: &str, millis: i64| {
            DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                StoreError::CorruptRow(format!("message {}: invalid {} {}", id, column, millis))
            })
        };

        Ok(Message {
            id,
            to: self.recipient,
            content: self.content,
            status,
            created_at: timestamp("created_at", self.created_at)?,
            updated_at: timestamp("updated_at", self.updated_at)?,
            sent_at: self.sent_at.map(|ms| timestamp("sent_at", ms)).transpose()?,
        })
    }
}
