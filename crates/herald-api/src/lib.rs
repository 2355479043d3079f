//! Herald HTTP API
//!
//! Control surface for the dispatch engine:
//! - Scheduler start/stop and status
//! - Message seeding and listing of sent messages
//! - Cache inspection
//! - Health and OpenAPI documentation

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use herald_common::{Message, MessageStatus, NewMessage};
use herald_dispatch::{MessageCache, MessageRepository, Scheduler};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error;
pub mod model;

pub use error::ApiError;
use model::{
    CreateMessageRequest, ErrorResponse, HealthResponse, SchedulerResponse,
    SchedulerStatusResponse,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub repository: Arc<dyn MessageRepository>,
    pub cache: Option<Arc<dyn MessageCache>>,
    /// Key prefix listed by `GET /messages/cache`
    pub cache_prefix: String,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Herald Message Dispatch API",
        version = "0.1.0",
        description = "Control the periodic message dispatcher and inspect its results"
    ),
    paths(
        start_scheduler,
        stop_scheduler,
        scheduler_status,
        list_sent_messages,
        create_message,
        list_cached_messages,
        health_handler,
    ),
    components(schemas(
        Message,
        MessageStatus,
        CreateMessageRequest,
        SchedulerResponse,
        SchedulerStatusResponse,
        HealthResponse,
        ErrorResponse,
    )),
    tags(
        (name = "scheduler", description = "Automatic sending control"),
        (name = "messages", description = "Message seeding and inspection"),
        (name = "health", description = "Health checks"),
    )
)]
pub struct ApiDoc;

/// Create the router with every control endpoint and the Swagger UI
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .route("/start", post(start_scheduler))
        .route("/stop", post(stop_scheduler))
        .route("/status", get(scheduler_status))
        .route("/sent-messages", get(list_sent_messages))
        .route("/messages", post(create_message))
        .route("/messages/cache", get(list_cached_messages))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start automatic sending
#[utoipa::path(
    post,
    path = "/start",
    tag = "scheduler",
    responses(
        (status = 200, description = "Scheduler is running", body = SchedulerResponse)
    )
)]
async fn start_scheduler(State(state): State<AppState>) -> Json<SchedulerResponse> {
    let message = if state.scheduler.start() {
        "Automatic message sending started"
    } else {
        "Automatic message sending already running"
    };

    Json(SchedulerResponse {
        message: message.to_string(),
        running: state.scheduler.is_running(),
    })
}

/// Stop automatic sending
#[utoipa::path(
    post,
    path = "/stop",
    tag = "scheduler",
    responses(
        (status = 200, description = "Scheduler is stopped", body = SchedulerResponse)
    )
)]
async fn stop_scheduler(State(state): State<AppState>) -> Json<SchedulerResponse> {
    let message = if state.scheduler.stop() {
        "Automatic message sending stopped"
    } else {
        "Automatic message sending already stopped"
    };

    Json(SchedulerResponse {
        message: message.to_string(),
        running: state.scheduler.is_running(),
    })
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "scheduler",
    responses(
        (status = 200, description = "Scheduler state", body = SchedulerStatusResponse)
    )
)]
async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatusResponse> {
    Json(SchedulerStatusResponse {
        running: state.scheduler.is_running(),
        interval_secs: state.scheduler.interval().as_secs(),
        batch_size: state.scheduler.batch_size(),
    })
}

/// List sent messages, most recently sent first
#[utoipa::path(
    get,
    path = "/sent-messages",
    tag = "messages",
    responses(
        (status = 200, description = "Sent messages", body = Vec<Message>),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
async fn list_sent_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.repository.get_all_sent().await?;
    Ok(Json(messages))
}

/// Queue a new PENDING message
#[utoipa::path(
    post,
    path = "/messages",
    tag = "messages",
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message queued", body = Message),
        (status = 400, description = "Invalid message", body = ErrorResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let message = Message::new(NewMessage::new(request.to, request.content))?;
    state.repository.create(&message).await?;

    info!(message_id = %message.id, "Message queued");
    Ok((StatusCode::CREATED, Json(message)))
}

/// List cached delivery acknowledgments
#[utoipa::path(
    get,
    path = "/messages/cache",
    tag = "messages",
    responses(
        (status = 200, description = "Cache entries by key", body = BTreeMap<String, String>),
        (status = 503, description = "No cache configured", body = ErrorResponse)
    )
)]
async fn list_cached_messages(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let cache = state.cache.as_ref().ok_or(ApiError::CacheUnavailable)?;
    let entries = cache.entries(&state.cache_prefix).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
