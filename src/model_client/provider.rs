//! The HTTP boundary to the single configured embedding/generation provider.
//!
//! [`ModelProvider`] is deliberately narrow: one provider, one text model,
//! one embedding model, no fallback or routing. [`ModelClient`] (in
//! `mod.rs`) wraps whatever implements this trait with queueing, spacing
//! and retry; this module only knows how to make one request and turn its
//! response (or failure) into a typed result.

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single turn in a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Result of a single generation call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub tokens_used: Option<u32>,
}

/// Result of a single embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embedding: Vec<f32>,
}

/// What a provider request can fail with, before the retry/backoff policy
/// in `mod.rs` decides what to do about it.
pub type ProviderResult<T> = std::result::Result<T, ModelError>;

/// The single external surface the Model Client talks through.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        params: GenerationParams,
    ) -> ProviderResult<GenerationResult>;

    async fn embed(&self, text: &str) -> ProviderResult<EmbeddingResult>;
}

/// A generic chat-completion/embedding provider reached over HTTP, in the
/// same request/response shape used by local model servers: a `/generate`
/// endpoint taking a message list and sampling options, and an `/embed`
/// endpoint taking a single prompt string.
pub struct HttpModelProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    text_model: String,
    embedding_model: String,
}

impl HttpModelProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        text_model: impl Into<String>,
        embedding_model: impl Into<String>,
        request_timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            text_model: text_model.into(),
            embedding_model: embedding_model.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Turn a completed HTTP response into either a typed success or a
    /// typed `ModelError`, classifying retryability from the status code.
    async fn classify(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(ModelError::RateLimited { retry_after_ms });
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Transient(format!("{status}: {body}")));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ModelError::InvalidResponse(format!("{status}: {body}")))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    message: Message,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn generate(
        &self,
        messages: &[Message],
        params: GenerationParams,
    ) -> ProviderResult<GenerationResult> {
        let request = GenerateRequest {
            model: &self.text_model,
            messages,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_output_tokens,
            },
        };

        let builder = self.authorize(self.http.post(self.endpoint("generate")).json(&request));
        let response = builder.send().await.map_err(classify_transport_error)?;
        let response = Self::classify(response).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(GenerationResult {
            text: parsed.message.content,
            tokens_used: parsed.eval_count,
        })
    }

    async fn embed(&self, text: &str) -> ProviderResult<EmbeddingResult> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let builder = self.authorize(self.http.post(self.endpoint("embed")).json(&request));
        let response = builder.send().await.map_err(classify_transport_error)?;
        let response = Self::classify(response).await?;
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(EmbeddingResult {
            embedding: parsed.embedding,
        })
    }
}

/// Connection resets and similar transport-level failures are treated as
/// transient; anything reqwest already classifies as a timeout is
/// surfaced as such so the caller's own deadline bookkeeping stays in sync.
fn classify_transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout
    } else {
        ModelError::Transient(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_parses_a_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "hello there"},
                "eval_count": 12
            })))
            .mount(&server)
            .await;

        let provider = HttpModelProvider::new(
            server.uri(),
            None,
            "text-model",
            "embed-model",
            std::time::Duration::from_secs(5),
        )
        .unwrap();

        let result = provider
            .generate(
                &[user_message("hi")],
                GenerationParams {
                    temperature: 0.2,
                    max_output_tokens: 256,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.text, "hello there");
        assert_eq!(result.tokens_used, Some(12));
    }

    #[tokio::test]
    async fn server_error_is_classified_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = HttpModelProvider::new(
            server.uri(),
            None,
            "text-model",
            "embed-model",
            std::time::Duration::from_secs(5),
        )
        .unwrap();

        let err = provider.embed("some text").await.unwrap_err();
        assert!(matches!(err, ModelError::Transient(_)));
    }

    #[tokio::test]
    async fn rate_limit_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "2"),
            )
            .mount(&server)
            .await;

        let provider = HttpModelProvider::new(
            server.uri(),
            None,
            "text-model",
            "embed-model",
            std::time::Duration::from_secs(5),
        )
        .unwrap();

        let err = provider.embed("some text").await.unwrap_err();
        match err {
            ModelError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, Some(2000)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
