//! HTTP client for the delivery endpoint
//!
//! Request: `POST <endpoint>` with `{"to": ..., "content": ...}`.
//! Only HTTP 200 and 202 count as accepted; the accepted body is expected to
//! be `{"message": ..., "messageId": ...}`.

use std::time::Duration;

use herald_common::Message;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

/// Longest slice of a rejection body kept for logs
const MAX_REJECTION_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub endpoint_url: String,
    pub connect_timeout: Duration,
    /// Upper bound on a whole request including the response body
    pub request_timeout: Duration,
}

impl DeliveryConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Default::default()
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeliveryPayload<'a> {
    to: &'a str,
    content: &'a str,
}

/// Acknowledgment returned by the endpoint on acceptance.
///
/// Missing fields decode as empty strings; only a body that is not a JSON
/// object of this shape counts as unparseable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgment {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_id: String,
}

impl Acknowledgment {
    /// Provider-assigned id, if the endpoint sent a non-empty one
    pub fn provider_id(&self) -> Option<&str> {
        (!self.message_id.trim().is_empty()).then_some(self.message_id.as_str())
    }
}

/// A delivery the endpoint accepted (HTTP 200 or 202)
#[derive(Debug)]
pub struct AcceptedDelivery {
    pub status: u16,
    pub acknowledgment: Result<Acknowledgment, DispatchError>,
}

pub fn is_accepted(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::ACCEPTED
}

pub struct DeliveryClient {
    config: DeliveryConfig,
    client: reqwest::Client,
}

impl DeliveryClient {
    pub fn new(config: DeliveryConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(DispatchError::Client)?;

        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint_url
    }

    /// Send one message.
    ///
    /// Returns `TransportFailure` when no response arrived and
    /// `RejectedByEndpoint` for any status other than 200/202.
    pub async fn deliver(&self, message: &Message) -> Result<AcceptedDelivery, DispatchError> {
        let payload = DeliveryPayload {
            to: &message.to,
            content: &message.content,
        };

        debug!(message_id = %message.id, url = %self.config.endpoint_url, "Posting message to delivery endpoint");

        let response = self
            .client
            .post(&self.config.endpoint_url)
            .json(&payload)
            .send()
            .await
            .map_err(DispatchError::TransportFailure)?;

        let status = response.status();
        if !is_accepted(status) {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_REJECTION_BODY {
                let mut cut = MAX_REJECTION_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(DispatchError::RejectedByEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let acknowledgment = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice::<Acknowledgment>(&bytes).map_err(|e| {
                DispatchError::AcknowledgmentUnparseable { reason: e.to_string() }
            }),
            Err(e) => Err(DispatchError::AcknowledgmentUnparseable {
                reason: format!("failed to read response body: {}", e),
            }),
        };

        Ok(AcceptedDelivery {
            status: status.as_u16(),
            acknowledgment,
        })
    }
}
