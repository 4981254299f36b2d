//! Vector index abstraction.
//!
//! The engine never manages ingestion, embeddings or index lifecycle. It only
//! needs two things from a backend: bind a collection name to whatever the
//! backend uses internally, and run a top-k similarity search against it.

pub mod chroma;
pub mod memory;

use crate::error::RetrievalError;
use crate::types::Passage;
use async_trait::async_trait;

pub use chroma::ChromaIndex;
pub use memory::StaticIndex;

/// A collection bound to backend-specific identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    /// Name the caller asked for.
    pub name: String,
    /// Identifier the backend addresses the collection by.
    pub id: String,
}

/// Similarity search capability over named collections.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Look up a collection once, when its pipeline is built.
    async fn resolve(&self, collection: &str) -> Result<CollectionHandle, RetrievalError>;

    /// Return up to `k` passages ordered by decreasing similarity to `query`.
    ///
    /// An empty result is not an error.
    async fn search(
        &self,
        collection: &CollectionHandle,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, RetrievalError>;

    /// Short backend label used in logs.
    fn backend_name(&self) -> &str;
}

/// Check a collection name against the naming rules vector stores share:
/// 3 to 512 characters of `[A-Za-z0-9._-]`, starting and ending alphanumeric.
pub fn validate_collection_name(name: &str) -> Result<(), RetrievalError> {
    let reject = |reason: &str| {
        Err(RetrievalError::InvalidCollection {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    let len = name.chars().count();
    if !(3..=512).contains(&len) {
        return reject("length must be between 3 and 512 characters");
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return reject(&format!("character '{}' is not allowed", bad));
    }
    let first_last_ok = name
        .chars()
        .next()
        .zip(name.chars().last())
        .is_some_and(|(a, b)| a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric());
    if !first_last_ok {
        return reject("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return reject("must not contain '..'");
    }
    Ok(())
}
