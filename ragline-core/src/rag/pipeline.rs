//! A bound retrieval + generation pipeline for one collection.

use super::context::ContextFormatter;
use super::generator::{GenerationSettings, Generator};
use super::retriever::Retriever;
use crate::brain::LlmProvider;
use crate::config::RaglineConfig;
use crate::error::{RagError, RetrievalError};
use crate::index::{VectorIndex, validate_collection_name};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Retriever, formatter and generator bound to one collection.
///
/// Built once per collection and shared read-only across requests.
pub struct Pipeline {
    pub retriever: Retriever,
    pub formatter: ContextFormatter,
    pub generator: Generator,
}

impl Pipeline {
    pub fn collection(&self) -> &str {
        &self.retriever.collection().name
    }
}

/// Constructs pipelines on cache misses.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn build(&self, collection: &str) -> Result<Pipeline, RagError>;
}

/// Per-pipeline settings taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub retrieval_timeout: Duration,
    pub max_context_chars: Option<usize>,
    pub generation: GenerationSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            retrieval_timeout: Duration::from_secs(30),
            max_context_chars: None,
            generation: GenerationSettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &RaglineConfig) -> Self {
        Self {
            top_k: config.rag.top_k,
            retrieval_timeout: Duration::from_secs(config.rag.retrieval_timeout_secs),
            max_context_chars: config.rag.max_context_chars,
            generation: GenerationSettings {
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
                timeout: Duration::from_secs(config.rag.generation_timeout_secs),
                stream_buffer: config.rag.stream_buffer,
            },
        }
    }
}

/// Builds pipelines over a shared vector index and language model.
pub struct IndexPipelineFactory {
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn LlmProvider>,
    settings: PipelineSettings,
}

impl IndexPipelineFactory {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn LlmProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            index,
            provider,
            settings,
        }
    }
}

#[async_trait]
impl PipelineFactory for IndexPipelineFactory {
    async fn build(&self, collection: &str) -> Result<Pipeline, RagError> {
        validate_collection_name(collection)?;

        let timeout = self.settings.retrieval_timeout;
        let handle = tokio::time::timeout(timeout, self.index.resolve(collection))
            .await
            .map_err(|_| RetrievalError::Timeout {
                timeout_secs: timeout.as_secs(),
            })??;

        info!(
            collection,
            backend = self.index.backend_name(),
            model = self.provider.model_name(),
            top_k = self.settings.top_k,
            "Built pipeline"
        );

        Ok(Pipeline {
            retriever: Retriever::new(
                self.index.clone(),
                handle,
                self.settings.top_k,
                self.settings.retrieval_timeout,
            ),
            formatter: ContextFormatter::new(self.settings.max_context_chars),
            generator: Generator::new(self.provider.clone(), self.settings.generation.clone()),
        })
    }
}
