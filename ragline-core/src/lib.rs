//! # Ragline Core
//!
//! Streaming retrieval-augmented answering engine.
//! Provides the RAG controller and its per-collection pipeline cache, the
//! LLM interface (brain) and providers, the vector index abstraction with a
//! Chroma adapter, configuration, and fundamental types.

pub mod brain;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod providers;
pub mod rag;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{ConfigOverrides, RaglineConfig, load_config};
pub use embeddings::{Embedder, OpenAiEmbedder};
pub use error::{
    ConfigError, GenerationError, LlmError, RagError, Result, RetrievalError, ValidationError,
    validate_question,
};
pub use index::{ChromaIndex, CollectionHandle, StaticIndex, VectorIndex};
pub use providers::create_provider;
pub use rag::{PipelineCache, RagController};
pub use types::{
    CompletionRequest, Message, Passage, PassageMetadata, RagEvent, RagResult, Role,
    SourceRecord, StreamEvent, TokenUsage,
};
