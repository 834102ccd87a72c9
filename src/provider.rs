//! Chat-completion transport.
//!
//! Thin client for an OpenAI-compatible chat completions endpoint
//! (LM Studio-style). Transport problems (connection failure,
//! timeout, non-success status) surface as [`ModelError::Unavailable`]
//! and are recovered by the orchestrator; they are never security
//! violations.
//!
//! Content extraction is defensive: it tolerates the standard
//! `choices[0].message.content` shape, a direct `content` or `text`
//! field, and a bare string, and it never fails; an unrecognizable
//! body yields an empty string sentinel.

use crate::config::ModelConfig;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Transport failure talking to the model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model unavailable: {detail}")]
    Unavailable { detail: String },
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

/// Chat-completion client.
pub struct ModelClient {
    url: String,
    client: reqwest::Client,
    max_tokens: u32,
}

impl ModelClient {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            url: config.url.trim().to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            max_tokens: config.max_tokens,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One completion round-trip. The system and user turns are kept
    /// separate on the wire; wrapped untrusted content must only ever
    /// travel in the user turn.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> Result<String, ModelError> {
        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable {
                detail: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Unavailable {
                detail: format!("HTTP {status}"),
            });
        }

        let value: Value = response.json().await.map_err(|e| ModelError::Unavailable {
            detail: format!("unreadable body: {e}"),
        })?;

        Ok(Self::extract_content(&value))
    }

    /// Best-effort content extraction over the known response shapes.
    /// Never fails; unknown shapes yield the empty sentinel.
    pub fn extract_content(value: &Value) -> String {
        // Standard OpenAI shape.
        if let Some(content) = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
        {
            return content.to_string();
        }
        // Direct content field.
        if let Some(content) = value.get("content").and_then(Value::as_str) {
            return content.to_string();
        }
        // Some servers use a bare text field.
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return text.to_string();
        }
        // A plain string body.
        if let Some(s) = value.as_str() {
            return s.to_string();
        }
        tracing::warn!("Could not extract content from model response");
        String::new()
    }

    /// Whether the endpoint is reachable (models listing).
    pub async fn check_connection(&self) -> bool {
        let probe = self.url.replace("/chat/completions", "/models");
        matches!(
            self.client.get(&probe).send().await,
            Ok(resp) if resp.status().is_success()
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(url: String) -> ModelClient {
        ModelClient::from_config(&ModelConfig {
            url,
            temperature: 0.7,
            max_tokens: 256,
            timeout_secs: 5,
        })
    }

    #[test]
    fn extract_standard_shape() {
        let value = json!({"choices": [{"message": {"content": "안녕하세요"}}]});
        assert_eq!(ModelClient::extract_content(&value), "안녕하세요");
    }

    #[test]
    fn extract_fallback_shapes() {
        assert_eq!(
            ModelClient::extract_content(&json!({"content": "direct"})),
            "direct"
        );
        assert_eq!(ModelClient::extract_content(&json!({"text": "bare"})), "bare");
        assert_eq!(ModelClient::extract_content(&json!("plain string")), "plain string");
    }

    #[test]
    fn extract_never_fails_on_garbage() {
        for value in [
            json!(null),
            json!(42),
            json!({"choices": []}),
            json!({"choices": [{"message": {}}]}),
            json!({"choices": [{"message": {"content": 7}}]}),
        ] {
            assert_eq!(ModelClient::extract_content(&value), "");
        }
    }

    #[tokio::test]
    async fn complete_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "<summary>네!</summary>"}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(format!("{}/v1/chat/completions", server.uri()));
        let text = client.complete("system", "user", 0.7).await.unwrap();
        assert_eq!(text, "<summary>네!</summary>");
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(format!("{}/v1/chat/completions", server.uri()));
        let err = client.complete("s", "u", 0.7).await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn connection_refused_is_unavailable() {
        // Nothing listens on this port.
        let client = client_for("http://127.0.0.1:1/v1/chat/completions".to_string());
        let err = client.complete("s", "u", 0.7).await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn unrecognizable_body_yields_empty_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"weird": true})))
            .mount(&server)
            .await;

        let client = client_for(format!("{}/v1/chat/completions", server.uri()));
        let text = client.complete("s", "u", 0.7).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn check_connection_probes_models_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(format!("{}/v1/chat/completions", server.uri()));
        assert!(client.check_connection().await);
    }
}
