//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]** returns errors; used when embeddings are not configured.
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]** calls the OpenAI (or compatible) `/v1/embeddings` endpoint.
//!
//! Also provides [`cosine_similarity`], the ranking measure used by the
//! vector retriever.
//!
//! # Provider Selection
//!
//! ```rust
//! # use cve_kb::config::EmbeddingConfig;
//! # use cve_kb::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EmbeddingConfig;
use crate::error::KbError;
use crate::http::{join_url, JsonEndpoint};

/// Turns text into a fixed-dimension vector.
///
/// One call embeds one text. Implementations surface transport failures as
/// [`KbError::ServiceUnavailable`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError>;
}

// ============ Disabled Provider ============

/// Used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        Err(KbError::unavailable(
            "embedding",
            "embed",
            text,
            "embedding provider is disabled; set [embedding] provider in the config",
        ))
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). The model must already be pulled.
pub struct OllamaEmbedder {
    model: String,
    endpoint: JsonEndpoint,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, KbError> {
        let model = config.model.clone().unwrap_or_default();
        let base = config.url.as_deref().unwrap_or("http://localhost:11434");
        let endpoint = JsonEndpoint::new(
            "ollama",
            join_url(base, "/api/embed"),
            None,
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self { model, endpoint })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let body = json!({ "model": self.model, "input": text });
        let response = self.endpoint.post("embed", text, &body).await?;
        first_vector(self.endpoint.service(), response.get("embeddings"), |v| Some(v))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable. `embedding.url`
/// overrides the base URL for compatible servers.
pub struct OpenAIEmbedder {
    model: String,
    endpoint: JsonEndpoint,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, KbError> {
        let model = config.model.clone().unwrap_or_default();
        let api_key = openai_api_key()?;
        let base = config.url.as_deref().unwrap_or("https://api.openai.com");
        let endpoint = JsonEndpoint::new(
            "openai",
            join_url(base, "/v1/embeddings"),
            Some(api_key),
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self { model, endpoint })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let body = json!({ "model": self.model, "input": [text] });
        let response = self.endpoint.post("embed", text, &body).await?;
        first_vector(self.endpoint.service(), response.get("data"), |item| {
            item.get("embedding")
        })
    }
}

pub(crate) fn openai_api_key() -> Result<String, KbError> {
    std::env::var("OPENAI_API_KEY").map_err(|_| KbError::InvalidResponse {
        service: "openai".to_string(),
        reason: "OPENAI_API_KEY environment variable not set".to_string(),
    })
}

/// Pull the first embedding out of a response array, using `pick` to reach
/// the numeric array inside each element.
fn first_vector<'a>(
    service: &str,
    list: Option<&'a Value>,
    pick: impl Fn(&'a Value) -> Option<&'a Value>,
) -> Result<Vec<f32>, KbError> {
    let invalid = |reason: &str| KbError::InvalidResponse {
        service: service.to_string(),
        reason: reason.to_string(),
    };

    let first = list
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .ok_or_else(|| invalid("missing embeddings array"))?;
    let numbers = pick(first)
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("embedding is not an array"))?;

    numbers
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| invalid("embedding contains a non-numeric value"))
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

/// Cosine similarity between two embedding vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
///
/// Sums run in `f64` so very large or very small components neither overflow
/// nor round down to zero; the finished ratio is narrowed back to `f32`.
///
/// Fails with [`KbError::DimensionMismatch`] on vectors of different length,
/// [`KbError::DegenerateVector`] when either norm is exactly zero (an empty
/// vector included) and [`KbError::NonFiniteVector`] when a component is NaN
/// or infinite. It never returns 0 or NaN in place of an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, KbError> {
    if a.len() != b.len() {
        return Err(KbError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if !(dot.is_finite() && norm_a.is_finite() && norm_b.is_finite()) {
        return Err(KbError::NonFiniteVector { index: None });
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(KbError::DegenerateVector { index: None });
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}
