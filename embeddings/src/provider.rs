//! Embedding providers.
//!
//! The HTTP client speaks to OpenAI-compatible servers, KoboldCpp's
//! embeddings extension, and plain `{text} -> {embedding}` servers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Default request timeout for the HTTP client.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Model name KoboldCpp expects when none is configured.
const KOBOLD_DEFAULT_MODEL: &str = "kcpp";

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Model to use (provider-specific).
    pub model: Option<String>,
}

impl EmbeddingRequest {
    /// Create a new embedding request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Response from embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The generated embedding.
    pub embedding: Embedding,

    /// Model reported by the server, if any.
    pub model: Option<String>,

    /// Dimension of the embedding.
    pub dimension: usize,
}

impl EmbeddingResponse {
    fn new(embedding: Embedding, model: Option<String>) -> Self {
        Self {
            dimension: embedding.len(),
            embedding,
            model,
        }
    }
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Generate an embedding for the given text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;
}

/// Request/response dialect of the embedding server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    /// `POST {base}/v1/embeddings` with `{model?, input}`, answered by `{data: [{embedding}]}`.
    #[default]
    OpenAi,
    /// `POST {base}/api/extra/embeddings` with `{model, input, truncate}`.
    KoboldCpp,
    /// `POST {endpoint}` with `{text}`, answered by `{embedding}`.
    Simple,
}

impl ApiFormat {
    /// Resolve the URL requests are sent to.
    pub fn resolve_endpoint(self, raw: &str) -> Result<Url> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmbeddingError::Configuration(
                "embedding endpoint URL is not configured".to_string(),
            ));
        }

        let mut url = Url::parse(trimmed).map_err(|e| {
            EmbeddingError::Configuration(format!("invalid endpoint URL {trimmed:?}: {e}"))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(EmbeddingError::Configuration(format!(
                "unsupported endpoint scheme {:?}",
                url.scheme()
            )));
        }

        let path = url.path().trim_end_matches('/').to_string();
        if self == Self::Simple || path.ends_with("/embeddings") {
            return Ok(url);
        }

        match self {
            Self::OpenAi => {
                let base = path.strip_suffix("/v1").unwrap_or(&path);
                url.set_path(&format!("{base}/v1/embeddings"));
            }
            Self::KoboldCpp => url.set_path(&format!("{path}/api/extra/embeddings")),
            Self::Simple => {}
        }

        Ok(url)
    }

    fn request_body(self, text: &str, model: Option<&str>) -> Value {
        match self {
            Self::OpenAi => {
                let mut body = serde_json::json!({ "input": text });
                if let Some(model) = model {
                    body["model"] = serde_json::json!(model);
                }
                body
            }
            Self::KoboldCpp => serde_json::json!({
                "model": model.unwrap_or(KOBOLD_DEFAULT_MODEL),
                "input": text,
                "truncate": true,
            }),
            Self::Simple => serde_json::json!({ "text": text }),
        }
    }
}

/// Connection settings for an embedding server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Server URL; see [`ApiFormat::resolve_endpoint`].
    pub endpoint_url: String,

    /// Sent as a bearer token when present.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name forwarded to the server.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub api_format: ApiFormat,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ConnectionConfig {
    /// Create a configuration for the given endpoint.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            api_key: None,
            model: None,
            api_format: ApiFormat::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the request/response format.
    pub fn with_api_format(mut self, format: ApiFormat) -> Self {
        self.api_format = format;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP embedding provider.
pub struct HttpEmbeddingClient {
    /// Fully resolved request URL.
    endpoint: Url,

    /// API key.
    api_key: Option<String>,

    /// Default model.
    model: Option<String>,

    format: ApiFormat,

    /// HTTP client.
    client: reqwest::Client,
}

impl HttpEmbeddingClient {
    /// Create a client, validating the endpoint.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let endpoint = config.api_format.resolve_endpoint(&config.endpoint_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| {
                EmbeddingError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        debug!("Embedding endpoint resolved to {endpoint}");

        Ok(Self {
            endpoint,
            api_key: config
                .api_key
                .as_ref()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            model: config.model.clone().filter(|m| !m.trim().is_empty()),
            format: config.api_format,
            client,
        })
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    fn name(&self) -> &str {
        match self.format {
            ApiFormat::OpenAi => "openai",
            ApiFormat::KoboldCpp => "koboldcpp",
            ApiFormat::Simple => "simple",
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request.model.as_deref().or(self.model.as_deref());
        let body = self.format.request_body(&request.text, model);

        debug!(
            "Requesting embedding for {} characters from {}",
            request.text.len(),
            self.endpoint
        );

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(ref api_key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::protocol(status.as_u16(), &error_text));
        }

        let text = response.text().await?;
        let (embedding, model) = parse_embedding_response(&text)?;

        info!("Generated embedding with {} dimensions", embedding.len());

        Ok(EmbeddingResponse::new(embedding, model))
    }
}

/// Extract the first embedding from a response body.
///
/// Envelopes are tried in a fixed order: `{data: [{embedding}]}`,
/// `{embedding}`, `[{embedding}]`, `{embeddings: [[...]]}`.
pub fn parse_embedding_response(body: &str) -> Result<(Embedding, Option<String>)> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::ResponseShape(format!("response is not JSON: {e}")))?;

    let raw = locate_embedding(&value).ok_or_else(|| {
        EmbeddingError::ResponseShape("embedding not found in response".to_string())
    })?;

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Ok((to_vector(raw)?, model))
}

fn locate_embedding(value: &Value) -> Option<&Value> {
    value
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|first| first.get("embedding"))
        .or_else(|| value.get("embedding"))
        .or_else(|| {
            value
                .as_array()
                .and_then(|items| items.first())
                .and_then(|first| first.get("embedding"))
        })
        .or_else(|| {
            value
                .get("embeddings")
                .and_then(Value::as_array)
                .and_then(|items| items.first())
        })
}

fn to_vector(raw: &Value) -> Result<Embedding> {
    let items = raw
        .as_array()
        .ok_or_else(|| EmbeddingError::ResponseShape("embedding is not an array".to_string()))?;

    if items.is_empty() {
        return Err(EmbeddingError::ResponseShape("embedding is empty".to_string()));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let value = item.as_f64().ok_or_else(|| {
                EmbeddingError::ResponseShape(format!("embedding entry {i} is not a number"))
            })?;
            let value = value as f32;
            if !value.is_finite() {
                return Err(EmbeddingError::ResponseShape(format!(
                    "embedding entry {i} is not a finite f32"
                )));
            }
            Ok(value)
        })
        .collect()
}
