//! DeepSeek chat completion client.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use reqwest::{header, Client, RequestBuilder};

use crate::config::{ApiKey, Config};
use crate::error::{Error, Result};
use crate::proxy::stream::{relay_events, StreamChunk};
use crate::proxy::types::{
    first_choice_content, ChatResponse, Message, UpstreamPayload, CHAT_COMPLETION_OBJECT,
};

/// Fixed timeout for a provider request. For streams it bounds only the wait
/// for response headers, not the body.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the provider's chat completion endpoint.
///
/// Cheap to clone: the HTTP client and configuration are both shared.
#[derive(Clone)]
pub struct DeepSeekClient {
    http: Client,
    config: Arc<Config>,
}

impl DeepSeekClient {
    pub fn new(http: Client, config: Arc<Config>) -> Self {
        Self { http, config }
    }

    /// Build the shared HTTP client.
    ///
    /// No client-wide total timeout is set, so streaming bodies may run as
    /// long as the provider keeps sending.
    pub fn build_http_client() -> reqwest::Result<Client> {
        Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
    }

    fn api_key(&self) -> Result<&ApiKey> {
        self.config.deepseek.api_key.as_ref().ok_or_else(|| {
            Error::Configuration("DeepSeek API key is not configured".to_string())
        })
    }

    /// Explicit override, or the configured default model.
    pub fn resolve_model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.config.deepseek.model.as_str())
    }

    fn post(&self, api_key: &ApiKey, payload: &UpstreamPayload<'_>) -> RequestBuilder {
        self.http
            .post(self.config.deepseek.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", api_key.expose_secret()),
            )
            .json(payload)
    }

    /// Request a single, complete chat completion.
    pub async fn complete(
        &self,
        messages: &[Message],
        model: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ChatResponse> {
        let api_key = self.api_key()?;
        let model = self.resolve_model(model);
        let payload = UpstreamPayload {
            messages,
            model,
            temperature,
            max_tokens,
            stream: false,
        };

        tracing::info!(
            model = %model,
            messages = messages.len(),
            "Forwarding chat completion to DeepSeek"
        );

        let response = self
            .post(api_key, &payload)
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach DeepSeek API");
                Error::from(e)
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(upstream_error(response).await);
        }

        let text = response.text().await?;
        let body: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse DeepSeek response");
            Error::Upstream {
                status: status.as_u16(),
                message: format!("invalid JSON in response: {}", e),
            }
        })?;

        build_chat_response(body, model)
    }

    /// Request a streaming chat completion.
    ///
    /// Errors before the first byte (missing key, non-200 status, connect
    /// failure) are returned directly. After that, deltas arrive lazily;
    /// dropping the stream closes the upstream connection.
    pub async fn stream_complete(
        &self,
        messages: &[Message],
        model: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<impl Stream<Item = Result<StreamChunk>> + Send + 'static> {
        let api_key = self.api_key()?;
        let model = self.resolve_model(model);
        let payload = UpstreamPayload {
            messages,
            model,
            temperature,
            max_tokens,
            stream: true,
        };

        tracing::info!(
            model = %model,
            messages = messages.len(),
            "Opening streaming chat completion to DeepSeek"
        );

        let response = tokio::time::timeout(UPSTREAM_TIMEOUT, self.post(api_key, &payload).send())
            .await
            .map_err(|_| {
                tracing::error!("Timed out waiting for DeepSeek stream to start");
                Error::Timeout(UPSTREAM_TIMEOUT.as_secs())
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach DeepSeek API");
                Error::from(e)
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(upstream_error(response).await);
        }

        Ok(relay_events(response.bytes_stream()))
    }
}

/// Read a failed provider response into an [`Error::Upstream`].
async fn upstream_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body);

    tracing::error!(
        status = %status,
        body = %body,
        "DeepSeek API returned error"
    );

    Error::Upstream {
        status: status.as_u16(),
        message,
    }
}

/// `error.message` from a JSON error body, or the raw body text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Assemble a [`ChatResponse`] from a successful provider reply.
fn build_chat_response(body: serde_json::Value, resolved_model: &str) -> Result<ChatResponse> {
    let choices = body
        .get("choices")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    if first_choice_content(&choices).is_none() {
        return Err(Error::Upstream {
            status: 200,
            message: "malformed response: missing choices[0].message.content".to_string(),
        });
    }

    let id = body
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4()));

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(resolved_model)
        .to_string();

    let usage = body
        .get("usage")
        .and_then(|u| u.as_object())
        .cloned()
        .unwrap_or_default();

    Ok(ChatResponse {
        id,
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created: chrono::Utc::now().timestamp(),
        model,
        choices,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeepSeekConfig;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base_url: &str, api_key: Option<&str>) -> DeepSeekClient {
        let config = Config {
            deepseek: DeepSeekConfig {
                api_key: api_key.map(ApiKey::from),
                base_url: base_url.to_string(),
                model: "deepseek-v3".to_string(),
            },
            ..Config::default()
        };
        DeepSeekClient::new(Client::new(), Arc::new(config))
    }

    fn conversation() -> Vec<Message> {
        vec![Message::user("Say hello")]
    }

    #[test]
    fn test_extract_error_message_json() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"rate limited","type":"x"}}"#),
            "rate limited"
        );
    }

    #[test]
    fn test_extract_error_message_falls_back_to_raw() {
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(
            extract_error_message(r#"{"error":"plain string"}"#),
            r#"{"error":"plain string"}"#
        );
    }

    #[test]
    fn test_build_chat_response_relays_fields() {
        let body = serde_json::json!({
            "id": "chatcmpl-abc",
            "model": "deepseek-v3",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        });

        let response = build_chat_response(body, "fallback").unwrap();
        assert_eq!(response.id, "chatcmpl-abc");
        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.model, "deepseek-v3");
        assert_eq!(response.assistant_content(), Some("Hello"));
        assert_eq!(response.usage["total_tokens"], 4);
        assert!(response.created > 0);
    }

    #[test]
    fn test_build_chat_response_fills_missing_fields() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi"}}]
        });

        let response = build_chat_response(body, "deepseek-chat").unwrap();
        assert!(response.id.starts_with("chatcmpl-"));
        assert_eq!(response.model, "deepseek-chat");
        assert!(response.usage.is_empty());
    }

    #[test]
    fn test_build_chat_response_requires_content() {
        let err = build_chat_response(serde_json::json!({"choices": []}), "m").unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
    }

    #[test]
    fn test_resolve_model() {
        let client = client_for("http://unused", None);
        assert_eq!(client.resolve_model(None), "deepseek-v3");
        assert_eq!(client.resolve_model(Some("")), "deepseek-v3");
        assert_eq!(client.resolve_model(Some("deepseek-chat")), "deepseek-chat");
    }

    #[tokio::test]
    async fn test_complete_without_key_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let err = client
            .complete(&conversation(), None, 0.7, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = client
            .stream_complete(&conversation(), None, 0.7, 1024)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_complete_sends_payload_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{"role": "user", "content": "Say hello"}],
                "model": "deepseek-v3",
                "max_tokens": 1024,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "deepseek-v3",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello"}}],
                "usage": {"total_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Some("sk-test"));
        let response = client
            .complete(&conversation(), None, 0.7, 1024)
            .await
            .unwrap();

        assert_eq!(response.assistant_content(), Some("Hello"));
        assert_eq!(response.model, "deepseek-v3");
    }

    #[tokio::test]
    async fn test_complete_maps_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "rate limited"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Some("sk-test"));
        let err = client
            .complete(&conversation(), None, 0.7, 1024)
            .await
            .unwrap_err();

        match err {
            Error::Upstream { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("Expected Upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_complete_yields_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Some("sk-test"));
        let deltas: Vec<String> = client
            .stream_complete(&conversation(), None, 0.7, 1024)
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap().content)
            .collect()
            .await;

        assert_eq!(deltas, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn test_stream_complete_maps_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Some("sk-bad"));
        let err = client
            .stream_complete(&conversation(), None, 0.7, 1024)
            .await
            .err()
            .unwrap();

        match err {
            Error::Upstream { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "unauthorized");
            }
            other => panic!("Expected Upstream error, got {:?}", other),
        }
    }
}
