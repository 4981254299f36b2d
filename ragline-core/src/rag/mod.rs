//! Retrieval-augmented answering engine.
//!
//! A question flows through a per-collection [`Pipeline`] obtained from the
//! [`PipelineCache`]: the [`Retriever`] fetches ranked passages, the
//! [`ContextFormatter`] turns them into numbered citation blocks, and the
//! [`Generator`] streams a grounded answer. [`extract_sources`] maps the same
//! passages to the citation records returned alongside the answer.

pub mod cache;
pub mod context;
pub mod controller;
pub mod generator;
pub mod pipeline;
pub mod retriever;
pub mod sources;

pub use cache::PipelineCache;
pub use context::{ContextFormatter, FormattedContext, NO_CONTEXT_MARKER};
pub use controller::RagController;
pub use generator::{GenerationSettings, Generator, SYSTEM_PROMPT};
pub use pipeline::{IndexPipelineFactory, Pipeline, PipelineFactory, PipelineSettings};
pub use retriever::Retriever;
pub use sources::extract_sources;
