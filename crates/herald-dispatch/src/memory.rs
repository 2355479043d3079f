//! In-memory message store.
//!
//! Same semantics as the SQL backends; used for local runs
//! (`database.type = "memory"`) and in tests.

use async_trait::async_trait;
use chrono::Utc;
use herald_common::{Message, MessageStatus};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::repository::{ensure_terminal, MessageRepository};

#[derive(Default)]
pub struct InMemoryMessageRepository {
    // Insertion order doubles as the tie-breaker for equal creation times
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a single message
    pub fn get(&self, id: Uuid) -> Option<Message> {
        self.messages.read().iter().find(|m| m.id == id).cloned()
    }

    /// Snapshot of every stored message, in insertion order
    pub fn all(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn get_pending(&self, limit: u32) -> Result<Vec<Message>, StoreError> {
        let mut pending: Vec<Message> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.status == MessageStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn update_status(&self, id: Uuid, status: MessageStatus) -> Result<(), StoreError> {
        ensure_terminal(id, status)?;

        let mut messages = self.messages.write();
        if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
            let now = Utc::now();
            message.status = status;
            message.updated_at = now;
            if status == MessageStatus::Sent {
                message.sent_at = Some(now);
            }
        }
        Ok(())
    }

    async fn create(&self, message: &Message) -> Result<(), StoreError> {
        message.validate()?;
        self.messages.write().push(message.clone());
        Ok(())
    }

    async fn get_all_sent(&self) -> Result<Vec<Message>, StoreError> {
        let mut sent: Vec<Message> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .cloned()
            .collect();
        sent.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(sent)
    }
}
