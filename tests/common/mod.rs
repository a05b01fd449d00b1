//! Shared helpers for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use http::Request;

use deepseek_proxy::config::{ApiKey, Config, DeepSeekConfig};
use deepseek_proxy::proxy::{create_router, AppState};

/// Build the proxy app pointed at `base_url`, optionally with an API key.
pub fn test_app(base_url: &str, api_key: Option<&str>) -> axum::Router {
    let config = Config {
        deepseek: DeepSeekConfig {
            api_key: api_key.map(ApiKey::from),
            base_url: base_url.to_string(),
            model: "deepseek-v3".to_string(),
        },
        ..Config::default()
    };

    create_router(AppState::new(config).expect("build app state"))
}

/// POST a JSON body to `uri`.
pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read the whole response body as bytes.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body")
        .to_vec()
}

/// Parse the response body as JSON and return (status_code, json_value).
pub async fn parse_body(response: axum::response::Response) -> (http::StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = body_bytes(response).await;
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
    (status, json)
}

/// A one-message conversation request body.
pub fn hello_request() -> serde_json::Value {
    serde_json::json!({
        "messages": [{"role": "user", "content": "Say hello"}]
    })
}
