use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request to queue a message for dispatch
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMessageRequest {
    /// Destination address
    #[schema(example = "+905551111111")]
    pub to: String,
    /// Message body, at most 160 characters
    #[schema(example = "Insider - Project")]
    pub content: String,
}

/// Result of a start/stop call
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SchedulerResponse {
    pub message: String,
    /// Whether the scheduler is running after the call
    pub running: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SchedulerStatusResponse {
    pub running: bool,
    pub interval_secs: u64,
    pub batch_size: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always UP while the process serves requests
    pub status: String,
    pub version: String,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
