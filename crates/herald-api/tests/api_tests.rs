//! Control surface tests driven through the router with `oneshot`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use herald_api::{create_router, AppState};
use herald_common::{Message, MessageStatus, NewMessage};
use herald_dispatch::{
    DeliveryClient, DeliveryConfig, DispatchWorker, InMemoryMessageCache,
    InMemoryMessageRepository, MessageCache, MessageRepository, Scheduler, WorkerConfig,
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    repository: Arc<InMemoryMessageRepository>,
    scheduler: Arc<Scheduler>,
}

fn app(cache: Option<Arc<dyn MessageCache>>) -> TestApp {
    let repository = Arc::new(InMemoryMessageRepository::new());
    let client = DeliveryClient::new(DeliveryConfig::new("http://127.0.0.1:9/send")).unwrap();
    let worker = DispatchWorker::new(
        WorkerConfig::default(),
        repository.clone(),
        cache.clone(),
        Arc::new(client),
    );
    let scheduler = Arc::new(Scheduler::new(worker, Duration::from_secs(120)));

    let state = AppState {
        scheduler: scheduler.clone(),
        repository: repository.clone(),
        cache,
        cache_prefix: "msg:".to_string(),
    };

    TestApp {
        router: create_router(state),
        repository,
        scheduler,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app(None);
    let (status, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let app = app(None);

    let (status, body) = send(&app.router, post_empty("/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], true);
    assert!(app.scheduler.is_running());

    let (status, body) = send(&app.router, post_empty("/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], true);

    let (status, body) = send(&app.router, post_empty("/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert!(!app.scheduler.is_running());

    let (status, body) = send(&app.router, post_empty("/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn test_status_reports_configuration() {
    let app = app(None);
    let (status, body) = send(&app.router, get("/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["interval_secs"], 120);
    assert_eq!(body["batch_size"], 2);
}

#[tokio::test]
async fn test_create_message() {
    let app = app(None);
    let (status, body) = send(
        &app.router,
        post_json("/messages", json!({"to": "+905551111111", "content": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["to"], "+905551111111");

    let stored = app.repository.all();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id.to_string(), body["id"].as_str().unwrap());
}

#[tokio::test]
async fn test_create_rejects_long_content() {
    let app = app(None);
    let content = "x".repeat(161);
    let (status, body) = send(
        &app.router,
        post_json("/messages", json!({"to": "+905551111111", "content": content})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert!(app.repository.is_empty());
}

#[tokio::test]
async fn test_create_rejects_malformed_body() {
    let app = app(None);
    let (status, body) = send(&app.router, post_json("/messages", json!({"to": 42}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(app.repository.is_empty());
}

#[tokio::test]
async fn test_sent_messages_lists_only_sent() {
    let app = app(None);
    let sent = Message::new(NewMessage::new("+905550000001", "one")).unwrap();
    let pending = Message::new(NewMessage::new("+905550000002", "two")).unwrap();
    app.repository.create(&sent).await.unwrap();
    app.repository.create(&pending).await.unwrap();
    app.repository
        .update_status(sent.id, MessageStatus::Sent)
        .await
        .unwrap();

    let (status, body) = send(&app.router, get("/sent-messages")).await;

    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], sent.id.to_string());
    assert_eq!(list[0]["status"], "SENT");
    assert!(list[0]["sent_at"].is_string());
}

#[tokio::test]
async fn test_cache_listing_without_cache() {
    let app = app(None);
    let (status, body) = send(&app.router, get("/messages/cache")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "CACHE_UNAVAILABLE");
}

#[tokio::test]
async fn test_cache_listing_filters_by_prefix() {
    let cache = Arc::new(InMemoryMessageCache::new());
    cache
        .set("msg:ext-1", "sent at: now | id: 1", Duration::from_secs(60))
        .await
        .unwrap();
    cache
        .set("other:ext-2", "unrelated", Duration::from_secs(60))
        .await
        .unwrap();
    let app = app(Some(cache));

    let (status, body) = send(&app.router, get("/messages/cache")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"msg:ext-1": "sent at: now | id: 1"}));
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = app(None);
    let (status, body) = send(&app.router, get("/api-doc/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/start"].is_object());
    assert!(body["paths"]["/messages/cache"].is_object());
}
