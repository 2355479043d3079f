//! Dispatch worker
//!
//! One dispatch cycle reads up to `batch_size` pending messages and spawns an
//! independent send task per message. The cycle does not wait for its sends;
//! callers that need completion hold on to the returned `DispatchCycle`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use herald_common::{Message, MessageStatus};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::MessageCache;
use crate::delivery::DeliveryClient;
use crate::error::DispatchError;
use crate::repository::MessageRepository;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub batch_size: u32,
    pub cache_ttl: Duration,
    pub cache_key_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            cache_key_prefix: "msg:".to_string(),
        }
    }
}

/// Outcome of a single send
#[derive(Debug)]
pub struct SendReport {
    pub message_id: Uuid,
    /// Status the worker attempted to record (`PENDING` only if the send never finished)
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub cached: bool,
    /// Delivery failures plus any non-fatal side-channel errors
    pub errors: Vec<DispatchError>,
}

impl SendReport {
    fn new(message_id: Uuid) -> Self {
        Self {
            message_id,
            status: MessageStatus::Pending,
            provider_message_id: None,
            cached: false,
            errors: Vec::new(),
        }
    }
}

/// Handles to the sends launched by one cycle.
///
/// Dropping it detaches the sends; they keep running to completion.
#[derive(Debug, Default)]
pub struct DispatchCycle {
    sends: Vec<JoinHandle<SendReport>>,
}

impl DispatchCycle {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of messages dispatched in this cycle
    pub fn len(&self) -> usize {
        self.sends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sends.is_empty()
    }

    /// Wait for every send of this cycle to finish
    pub async fn wait(self) -> Vec<SendReport> {
        join_all(self.sends)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(error = %e, "Send task did not complete");
                    None
                }
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct DispatchWorker {
    config: Arc<WorkerConfig>,
    repository: Arc<dyn MessageRepository>,
    cache: Option<Arc<dyn MessageCache>>,
    client: Arc<DeliveryClient>,
}

impl DispatchWorker {
    pub fn new(
        config: WorkerConfig,
        repository: Arc<dyn MessageRepository>,
        cache: Option<Arc<dyn MessageCache>>,
        client: Arc<DeliveryClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            repository,
            cache,
            client,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Fetch one batch and fan out one send per message.
    ///
    /// A store failure aborts the cycle before anything is touched; the next
    /// cycle retries on its own.
    pub async fn process_batch(&self) -> Result<DispatchCycle, DispatchError> {
        metrics::counter!("herald.dispatch.cycles_total").increment(1);

        let messages = match self.repository.get_pending(self.config.batch_size).await {
            Ok(messages) => messages,
            Err(e) => {
                metrics::counter!("herald.dispatch.fetch_errors_total").increment(1);
                return Err(DispatchError::FetchFailure(e));
            }
        };

        metrics::gauge!("herald.dispatch.batch_size").set(messages.len() as f64);

        if messages.is_empty() {
            debug!("No pending messages found");
            return Ok(DispatchCycle::empty());
        }

        info!(count = messages.len(), "Dispatching pending messages");

        let sends = messages
            .into_iter()
            .map(|message| {
                let worker = self.clone();
                let span = info_span!("send", message_id = %message.id);
                tokio::spawn(async move { worker.send_one(message).await }.instrument(span))
            })
            .collect();

        Ok(DispatchCycle { sends })
    }

    /// Deliver one message and record the outcome.
    ///
    /// Errors never escape: they end up in the report and the logs.
    pub async fn send_one(&self, message: Message) -> SendReport {
        let mut report = SendReport::new(message.id);

        let accepted = match self.client.deliver(&message).await {
            Ok(accepted) => accepted,
            Err(e) => {
                match &e {
                    DispatchError::RejectedByEndpoint { status, body } => {
                        warn!(message_id = %message.id, status, body = %body, "Delivery endpoint rejected message");
                    }
                    other => {
                        error!(message_id = %message.id, error = %other, "Failed to send message");
                    }
                }
                report.errors.push(e);
                self.record_status(&mut report, MessageStatus::Failed).await;
                metrics::counter!("herald.dispatch.failed_total").increment(1);
                return report;
            }
        };

        // The endpoint took the message; a bad acknowledgment only costs the cache entry
        let provider_id = match accepted.acknowledgment {
            Ok(ack) => ack.provider_id().map(str::to_owned),
            Err(e) => {
                error!(message_id = %message.id, error = %e, "Failed to decode delivery acknowledgment");
                report.errors.push(e);
                None
            }
        };

        self.record_status(&mut report, MessageStatus::Sent).await;
        metrics::counter!("herald.dispatch.sent_total").increment(1);
        info!(
            message_id = %message.id,
            remote_id = provider_id.as_deref().unwrap_or(""),
            status = accepted.status,
            "Message sent successfully"
        );

        if let (Some(cache), Some(remote_id)) = (&self.cache, provider_id.as_deref()) {
            match self.cache_acknowledgment(cache.as_ref(), remote_id, &message).await {
                Ok(()) => {
                    report.cached = true;
                    metrics::counter!("herald.dispatch.cache_writes_total").increment(1);
                    debug!(remote_id, "Cached acknowledgment");
                }
                Err(e) => {
                    metrics::counter!("herald.dispatch.cache_errors_total").increment(1);
                    error!(message_id = %message.id, remote_id, error = %e, "Cache write failed");
                    report.errors.push(e);
                }
            }
        }

        report.provider_message_id = provider_id;
        report
    }

    async fn record_status(&self, report: &mut SendReport, status: MessageStatus) {
        report.status = status;
        if let Err(e) = self.repository.update_status(report.message_id, status).await {
            error!(message_id = %report.message_id, status = %status, error = %e, "Failed to update message status");
            report.errors.push(DispatchError::StatusUpdateFailure(e));
        }
    }

    async fn cache_acknowledgment(
        &self,
        cache: &dyn MessageCache,
        remote_id: &str,
        message: &Message,
    ) -> Result<(), DispatchError> {
        let key = cache_key(&self.config.cache_key_prefix, remote_id);
        let value = cache_value(message.id);
        cache
            .set(&key, &value, self.config.cache_ttl)
            .await
            .map_err(DispatchError::CacheWriteFailure)
    }
}

pub fn cache_key(prefix: &str, remote_id: &str) -> String {
    format!("{}{}", prefix, remote_id)
}

fn cache_value(message_id: Uuid) -> String {
    format!("sent at: {} | id: {}", Utc::now().to_rfc3339(), message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_uses_prefix() {
        assert_eq!(cache_key("msg:", "ext-1"), "msg:ext-1");
    }

    #[test]
    fn test_cache_value_mentions_local_id() {
        let id = Uuid::new_v4();
        let value = cache_value(id);
        assert!(value.starts_with("sent at: "));
        assert!(value.ends_with(&format!("| id: {}", id)));
    }

    #[tokio::test]
    async fn test_empty_cycle_waits_immediately() {
        let cycle = DispatchCycle::empty();
        assert!(cycle.is_empty());
        assert!(cycle.wait().await.is_empty());
    }
}
