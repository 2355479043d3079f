use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod logging;

/// Upper bound on message content, counted in characters rather than bytes.
pub const MAX_CONTENT_LENGTH: usize = 160;

// ============================================================================
// Validation
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("recipient address must not be empty")]
    EmptyRecipient,

    #[error("message content must not be empty")]
    EmptyContent,

    #[error("message content exceeds {max} characters (got {length})")]
    ContentTooLong { length: usize, max: usize },

    #[error("unknown message status: {0}")]
    UnknownStatus(String),
}

fn validate_fields(to: &str, content: &str) -> Result<(), ValidationError> {
    if to.trim().is_empty() {
        return Err(ValidationError::EmptyRecipient);
    }
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let length = content.chars().count();
    if length > MAX_CONTENT_LENGTH {
        return Err(ValidationError::ContentTooLong {
            length,
            max: MAX_CONTENT_LENGTH,
        });
    }
    Ok(())
}

// ============================================================================
// Message Status
// ============================================================================

/// Delivery state of a message.
///
/// `PENDING` is the only initial state. The dispatch worker moves a message to
/// `SENT` or `FAILED`; nothing moves it back to `PENDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Sent | MessageStatus::Failed)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MessageStatus::Pending),
            "SENT" => Ok(MessageStatus::Sent),
            "FAILED" => Ok(MessageStatus::Failed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// An outbound message as persisted by the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    /// Destination address (e.g. a phone number)
    pub to: String,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a fresh `PENDING` message with a new identifier.
    pub fn new(new: NewMessage) -> Result<Self, ValidationError> {
        new.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            to: new.to,
            content: new.content,
            status: MessageStatus::Pending,
            created_at: now,
            updated_at: now,
            sent_at: None,
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.to, &self.content)
    }
}

/// Input for creating a message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewMessage {
    /// Destination address
    pub to: String,
    /// Message body, at most 160 characters
    pub content: String,
}

impl NewMessage {
    pub fn new(to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.to, &self.content)
    }
}
