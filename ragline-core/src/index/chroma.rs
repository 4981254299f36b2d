//! Chroma vector index over its v2 HTTP API.
//!
//! Collections are looked up by name once (`resolve`) and then queried by id.
//! Chroma's HTTP query endpoint takes vectors, so the question is embedded
//! through an [`Embedder`] before each search.

use super::{CollectionHandle, VectorIndex};
use crate::config::IndexConfig;
use crate::embeddings::Embedder;
use crate::error::RetrievalError;
use crate::types::{Passage, PassageMetadata};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Chroma HTTP client bound to one tenant and database.
pub struct ChromaIndex {
    client: Client,
    base_url: String,
    tenant: String,
    database: String,
    token: Option<String>,
    embedder: Arc<dyn Embedder>,
}

impl ChromaIndex {
    pub fn new(config: &IndexConfig, token: Option<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            tenant: config.tenant.clone(),
            database: config.database.clone(),
            token,
            embedder,
        }
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header("x-chroma-token", token),
            None => builder,
        }
    }

    fn transport_error(err: reqwest::Error) -> RetrievalError {
        if err.is_connect() || err.is_timeout() {
            RetrievalError::Unreachable {
                message: err.to_string(),
            }
        } else {
            RetrievalError::Backend {
                message: err.to_string(),
            }
        }
    }

    /// Map a non-success lookup response; Chroma reports missing collections
    /// as 404 on recent servers and as an error body on older ones.
    fn lookup_error(name: &str, status: StatusCode, body: &str) -> RetrievalError {
        if status == StatusCode::NOT_FOUND || body.contains("does not exist") {
            RetrievalError::CollectionNotFound {
                name: name.to_string(),
            }
        } else {
            RetrievalError::Backend {
                message: format!("HTTP {}: {}", status.as_u16(), body),
            }
        }
    }

    /// Convert a query response (one query row) into ordered passages.
    fn parse_query_response(body: &Value) -> Result<Vec<Passage>, RetrievalError> {
        let row = |field: &str| body.get(field).and_then(|v| v.get(0)).and_then(Value::as_array);

        let documents = row("documents").ok_or_else(|| RetrievalError::Backend {
            message: "query response has no documents".into(),
        })?;
        let metadatas = row("metadatas");
        let distances = row("distances");

        let passages = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let metadata = metadatas
                    .and_then(|m| m.get(i))
                    .map(Self::parse_metadata)
                    .unwrap_or_default();
                let score = distances
                    .and_then(|d| d.get(i))
                    .and_then(Value::as_f64)
                    .map(|distance| (1.0 / (1.0 + distance)) as f32);
                Passage {
                    content: doc.as_str().unwrap_or_default().to_string(),
                    metadata,
                    score,
                }
            })
            .collect();
        Ok(passages)
    }

    fn parse_metadata(meta: &Value) -> PassageMetadata {
        let text = |key: &str| match meta.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let chunk = match meta.get("chunk") {
            Some(Value::Number(n)) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            }),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        PassageMetadata {
            source: text("source"),
            chunk,
            id: text("id"),
        }
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn resolve(&self, collection: &str) -> Result<CollectionHandle, RetrievalError> {
        let url = format!("{}/{}", self.collections_url(), collection);
        debug!(url = %url, "Resolving Chroma collection");

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::lookup_error(collection, status, &body));
        }

        let json: Value = response.json().await.map_err(|e| RetrievalError::Backend {
            message: format!("Invalid collection JSON: {}", e),
        })?;
        let id = json
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RetrievalError::Backend {
                message: format!("collection '{}' has no id", collection),
            })?;
        Ok(CollectionHandle {
            name: collection.to_string(),
            id: id.to_string(),
        })
    }

    async fn search(
        &self,
        collection: &CollectionHandle,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let embedding = self.embedder.embed(query).await?;
        let url = format!("{}/{}/query", self.collections_url(), collection.id);
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::lookup_error(&collection.name, status, &body));
        }

        let json: Value = response.json().await.map_err(|e| RetrievalError::Backend {
            message: format!("Invalid query JSON: {}", e),
        })?;
        Self::parse_query_response(&json)
    }

    fn backend_name(&self) -> &str {
        "chroma"
    }
}
