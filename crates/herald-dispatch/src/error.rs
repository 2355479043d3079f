//! Error types for the dispatch engine

use herald_common::{MessageStatus, ValidationError};
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a message store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    #[error("Message {id} cannot be moved to {status}")]
    InvalidTransition { id: Uuid, status: MessageStatus },

    #[error("Corrupt message row: {0}")]
    CorruptRow(String),

    #[error("Message store unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a cache backend
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Everything that can go wrong during a dispatch cycle.
///
/// `FetchFailure` aborts a whole cycle. `TransportFailure` and
/// `RejectedByEndpoint` mark a single message `FAILED`. The remaining
/// variants are logged and never change a message's status.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to fetch pending messages: {0}")]
    FetchFailure(#[source] StoreError),

    #[error("Transport failure while delivering: {0}")]
    TransportFailure(#[source] reqwest::Error),

    #[error("Delivery endpoint rejected the message with HTTP {status}")]
    RejectedByEndpoint { status: u16, body: String },

    #[error("Unparseable delivery acknowledgment: {reason}")]
    AcknowledgmentUnparseable { reason: String },

    #[error("Failed to cache acknowledgment: {0}")]
    CacheWriteFailure(#[source] CacheError),

    #[error("Failed to update message status: {0}")]
    StatusUpdateFailure(#[source] StoreError),

    #[error("Failed to build delivery client: {0}")]
    Client(#[source] reqwest::Error),
}

impl DispatchError {
    /// True for errors that end with the message marked `FAILED`
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::TransportFailure(_) | DispatchError::RejectedByEndpoint { .. }
        )
    }
}
