#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use stockpile_api::config::ServerConfig;
use stockpile_api::router::build_app_router;
use stockpile_api::state::AppState;
use stockpile_core::event::{event_channel, AssetEvent};
use stockpile_core::schema::AssetTypeSchema;
use stockpile_db::repositories::AssetRepo;
use stockpile_db::store::{BackendType, StoreFactory};
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const ADMIN: &str = "admin";
pub const USER: &str = "alice";

/// Build a test `ServerConfig` with the memory datastore and one admin.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        default_result_size: 100,
        datastore: BackendType::Memory,
        database_url: None,
        asset_config_path: None,
        admin_users: BTreeSet::from([ADMIN.to_string()]),
        event_queue_capacity: 256,
        api_prefix: "/api/v1".to_string(),
    }
}

/// Field rules used by the API tests: `status` is required and must be
/// `enabled` or `disabled`.
pub fn test_schema() -> AssetTypeSchema {
    serde_json::from_value(json!({
        "required_fields": ["status"],
        "enforced_fields": {"status": ["enabled", "disabled"]}
    }))
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub events: mpsc::Receiver<AssetEvent>,
}

/// Build the full application router over a fresh in-memory store.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let (tx, rx) = event_channel(config.event_queue_capacity);
    let repo = AssetRepo::new(
        StoreFactory::memory(),
        test_schema(),
        config.default_result_size,
        tx,
    );
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };
    TestApp {
        router: build_app_router(state, &config),
        events: rx,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-remote-user", user);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn post_json(app: &Router, uri: &str, user: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(user), Some(body)).await
}

pub async fn put_json(app: &Router, uri: &str, user: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(user), Some(body)).await
}

pub async fn delete(app: &Router, uri: &str, user: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(user), None).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
