#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

pub const ORIGINS: &str = "http://localhost:3205";

pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// POST with an `Idempotency-Key` header, as the fan-out worker sends it
pub async fn post_with_key(app: &Router, uri: &str, key: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(bite_core::IDEMPOTENCY_KEY_HEADER, key)
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub async fn get_json(app: &Router, uri: &str) -> Value {
    let (status, body) = call(app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK, "GET {} failed: {}", uri, body);
    serde_json::from_str(&body).unwrap()
}

pub async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, text) = call(app, method, uri, Some(body)).await;
    let json = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, json)
}

/// Polls `uri` until `ready` accepts the body
pub async fn wait_for(app: &Router, uri: &str, ready: impl Fn(&Value) -> bool) -> Value {
    let mut last = Value::Null;
    for _ in 0..300 {
        last = get_json(app, uri).await;
        if ready(&last) {
            return last;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting on {}; last response: {}", uri, last);
}
