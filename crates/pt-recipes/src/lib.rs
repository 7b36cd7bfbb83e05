//! HTTP text-completion client used for recipe suggestions.
//!
//! Talks to any OpenAI-compatible `chat/completions` endpoint. Every failure,
//! whether network, status, or body shape, surfaces as
//! [`CoreError::RecommendationFailed`] so callers can treat suggestions as
//! best-effort.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pt_core::{CoreError, CoreResult, RecommendationService};

/// Connection settings for [`CompletionClient`].
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub endpoint: String,
    /// Model name.
    pub model: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

/// Recommendation service backed by a chat-completion HTTP API.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    settings: CompletionSettings,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl CompletionClient {
    /// Build a client with its own connection pool.
    pub fn new(settings: CompletionSettings) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("pantry/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(|err| CoreError::RecommendationFailed(err.to_string()))?;
        Ok(Self::with_http(settings, http))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_http(settings: CompletionSettings, http: reqwest::Client) -> Self {
        Self { http, settings }
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl RecommendationService for CompletionClient {
    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.http.post(self.url()).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        debug!(url = %self.url(), model = %self.settings.model, "requesting completion");
        let response = request.send().await.map_err(|err| {
            warn!(error = %err, "completion request failed");
            CoreError::RecommendationFailed(format!("request failed: {err}"))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| CoreError::RecommendationFailed(err.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "completion endpoint returned an error");
            return Err(CoreError::RecommendationFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        parse_completion_body(&text)
    }
}

/// Extract the first choice's text from a chat-completion response body.
pub fn parse_completion_body(body: &str) -> CoreResult<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|err| CoreError::RecommendationFailed(format!("malformed response: {err}")))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CoreError::RecommendationFailed("response contained no text".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const OK_BODY: &str =
        r#"{"id":"c1","choices":[{"index":0,"message":{"role":"assistant","content":"Pancakes\nOmelette"}}]}"#;

    fn client(endpoint: String, api_key: Option<&str>) -> CompletionClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        CompletionClient::with_http(
            CompletionSettings {
                endpoint,
                model: "test-model".into(),
                api_key: api_key.map(str::to_string),
                timeout: Duration::from_secs(5),
            },
            http,
        )
    }

    #[test]
    fn parses_first_choice() {
        assert_eq!(parse_completion_body(OK_BODY).unwrap(), "Pancakes\nOmelette");
    }

    #[test]
    fn rejects_bodies_without_text() {
        assert!(matches!(
            parse_completion_body(r#"{"choices":[]}"#),
            Err(CoreError::RecommendationFailed(_))
        ));
        assert!(matches!(
            parse_completion_body(r#"{"choices":[{"message":{"role":"assistant"}}]}"#),
            Err(CoreError::RecommendationFailed(_))
        ));
        assert!(matches!(
            parse_completion_body("<html>"),
            Err(CoreError::RecommendationFailed(_))
        ));
    }

    #[tokio::test]
    async fn posts_prompt_and_returns_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body(json!({
                        "model": "test-model",
                        "messages": [{ "role": "user", "content": "what can I cook?" }]
                    }));
                then.status(200)
                    .header("content-type", "application/json")
                    .body(OK_BODY);
            })
            .await;

        // Trailing slashes on the endpoint are tolerated.
        let text = client(server.url("/v1/"), Some("test-key"))
            .complete("what can I cook?")
            .await
            .unwrap();
        assert_eq!(text, "Pancakes\nOmelette");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_a_recommendation_failure() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body(r#"{"error":"overloaded"}"#);
            })
            .await;

        let result = client(server.url("/v1"), None).complete("anything").await;
        assert_eq!(
            result,
            Err(CoreError::RecommendationFailed(
                r#"HTTP 500: {"error":"overloaded"}"#.into()
            ))
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_recommendation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).body("not json");
            })
            .await;

        let result = client(server.url("/v1"), None).complete("anything").await;
        assert!(matches!(result, Err(CoreError::RecommendationFailed(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_recommendation_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(format!("http://{addr}"), None).complete("anything").await;
        assert!(matches!(result, Err(CoreError::RecommendationFailed(_))));
    }
}
