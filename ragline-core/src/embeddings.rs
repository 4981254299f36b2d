//! Query embedding client.
//!
//! Vector indexes that only accept query vectors (Chroma's HTTP API among them)
//! need the question embedded first. The engine never computes embeddings
//! locally; it calls an embeddings endpoint through the `Embedder` trait.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Configuration for the embeddings endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Base URL of an OpenAI-compatible API (without the `/v1` suffix).
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_model() -> String {
    "text-embedding-3-small".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
        }
    }
}

/// OpenAI API embedder (uses text-embedding-3-small by default).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Pull the first embedding vector out of an `/v1/embeddings` response body.
    fn parse_embedding(json: &Value) -> Result<Vec<f32>, RetrievalError> {
        let values = json["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| RetrievalError::Embedding {
                message: "response has no data[0].embedding array".into(),
            })?;
        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| RetrievalError::Embedding {
                        message: format!("non-numeric embedding component: {}", v),
                    })
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        debug!(url = %url, model = %self.model, "Requesting query embedding");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::Embedding {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Embedding {
                message: format!("HTTP {}: {}", status.as_u16(), body_text),
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RetrievalError::Embedding {
                message: format!("Invalid JSON: {}", e),
            })?;
        Self::parse_embedding(&json)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
