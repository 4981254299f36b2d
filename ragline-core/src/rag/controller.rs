//! The question-answering entry point.

use super::cache::PipelineCache;
use super::pipeline::{IndexPipelineFactory, PipelineSettings};
use super::sources::extract_sources;
use crate::brain::LlmProvider;
use crate::config::RaglineConfig;
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::types::{RagEvent, RagResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs RETRIEVE then GENERATE against cached per-collection pipelines.
///
/// Terminal on success or on the first failure. There are no retries and no
/// second retrieval: generation only ever sees the passages retrieved for this
/// request.
pub struct RagController {
    cache: PipelineCache,
    default_collection: String,
}

impl RagController {
    pub fn new(cache: PipelineCache, default_collection: impl Into<String>) -> Self {
        Self {
            cache,
            default_collection: default_collection.into(),
        }
    }

    /// Wire a controller over `index` and `provider` using the configured
    /// retrieval depth, deadlines, context budget and cache capacity.
    pub fn from_config(
        config: &RaglineConfig,
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let factory =
            IndexPipelineFactory::new(index, provider, PipelineSettings::from_config(config));
        let cache = PipelineCache::new(Arc::new(factory), config.rag.cache_capacity);
        Self::new(cache, config.rag.default_collection.clone())
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    /// Answer a question without streaming.
    pub async fn ask(
        &self,
        question: &str,
        collection: Option<&str>,
    ) -> Result<RagResult, RagError> {
        self.run(question, collection, None).await
    }

    /// Answer a question, sending every generated token to `sink` before returning.
    ///
    /// Dropping the receiving end of `sink` cancels generation.
    pub async fn ask_streaming(
        &self,
        question: &str,
        collection: Option<&str>,
        sink: &mpsc::Sender<RagEvent>,
    ) -> Result<RagResult, RagError> {
        self.run(question, collection, Some(sink)).await
    }

    async fn run(
        &self,
        question: &str,
        collection: Option<&str>,
        sink: Option<&mpsc::Sender<RagEvent>>,
    ) -> Result<RagResult, RagError> {
        let request_id = Uuid::new_v4();
        let collection = collection.unwrap_or(self.default_collection.as_str());
        let start = Instant::now();
        info!(%request_id, collection, streaming = sink.is_some(), "Answering question");

        let pipeline = self.cache.get_or_build(collection).await?;

        // RETRIEVE
        let passages = pipeline.retriever.retrieve(question).await.map_err(|e| {
            warn!(%request_id, collection, error = %e, "Retrieval failed");
            RagError::from(e)
        })?;
        let sources = extract_sources(&passages);
        let context = pipeline.formatter.format(&passages);
        if context.truncated {
            warn!(
                %request_id,
                retrieved = passages.len(),
                used = context.passages_used,
                max_chars = pipeline.formatter.max_chars(),
                "Context truncated to fit budget"
            );
        }
        debug!(%request_id, passages = passages.len(), "Context assembled");

        // GENERATE
        let answer = pipeline
            .generator
            .generate(question, &context.text, sink)
            .await
            .map_err(|e| {
                warn!(%request_id, collection, error = %e, "Generation failed");
                RagError::from(e)
            })?;

        info!(
            %request_id,
            sources = sources.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Answer complete"
        );
        Ok(RagResult { answer, sources })
    }
}
