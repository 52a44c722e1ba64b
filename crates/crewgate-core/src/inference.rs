//! HTTP client for the local inference server (Ollama-compatible API).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::InferenceError;

/// Default base URL of the local inference server.
pub const DEFAULT_INFERENCE_URL: &str = "http://localhost:11434";

/// Client for the `/api/generate` and `/api/tags` endpoints.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    chat_timeout: Duration,
    tags_timeout: Duration,
}

impl InferenceClient {
    /// Create a new client for `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: normalize_base_url(&base_url.into()),
            chat_timeout: Duration::from_secs(30),
            tags_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    pub fn with_tags_timeout(mut self, timeout: Duration) -> Self {
        self.tags_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a prompt to the generate endpoint and return the response text.
    ///
    /// Streaming responses are newline-delimited JSON; their `response`
    /// fragments are concatenated.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, model, stream, "Sending generate request");

        let response = self
            .client
            .post(&url)
            .timeout(self.chat_timeout)
            .json(&GenerateRequest {
                model,
                prompt,
                stream,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), body = %body, "Inference server returned an error");
            return Err(InferenceError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        if stream {
            parse_streamed(&body)
        } else {
            let parsed: GenerateResponse = serde_json::from_str(&body)
                .map_err(|e| InferenceError::Malformed(e.to_string()))?;
            Ok(parsed.response)
        }
    }

    /// Names of the models the server has pulled.
    pub async fn list_tags(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.tags_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let tags: TagsResponse =
            serde_json::from_str(&body).map_err(|e| InferenceError::Malformed(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Strip trailing slashes and a legacy `/api/generate` suffix.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/api/generate")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

fn parse_streamed(body: &str) -> Result<String, InferenceError> {
    let mut out = String::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let chunk: GenerateResponse =
            serde_json::from_str(line).map_err(|e| InferenceError::Malformed(e.to_string()))?;
        out.push_str(&chunk.response);
    }
    Ok(out)
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:11434/api/generate"),
            "http://localhost:11434"
        );
        assert_eq!(normalize_base_url("http://host:1/"), "http://host:1");
    }

    #[test]
    fn test_parse_streamed_concatenates() {
        let body = "{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":false}\n{\"done\":true}\n";
        assert_eq!(parse_streamed(body).unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_generate_returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "smollm2:135m",
                "prompt": "Hello",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "This is a test response",
                "model": "smollm2:135m"
            })))
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri());
        let text = client.generate("smollm2:135m", "Hello", false).await.unwrap();
        assert_eq!(text, "This is a test response");
    }

    #[tokio::test]
    async fn test_generate_surfaces_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = InferenceClient::new(server.uri())
            .generate("missing", "hi", false)
            .await
            .unwrap_err();
        match err {
            InferenceError::Upstream { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = InferenceClient::new(server.uri())
            .with_chat_timeout(Duration::from_millis(100))
            .generate("m", "hi", false)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connectivity_error() {
        // Port 9 (discard) is not served in test environments.
        let err = InferenceClient::new("http://127.0.0.1:9")
            .generate("m", "hi", false)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_list_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "smollm2:135m"}, {"name": "llama2"}]
            })))
            .mount(&server)
            .await;

        let tags = InferenceClient::new(server.uri()).list_tags().await.unwrap();
        assert_eq!(tags, vec!["smollm2:135m", "llama2"]);
    }

    #[tokio::test]
    async fn test_list_tags_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = InferenceClient::new(server.uri()).list_tags().await.unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));
    }
}
