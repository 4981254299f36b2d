//! Retriever bound to one collection.

use crate::error::RetrievalError;
use crate::index::{CollectionHandle, VectorIndex};
use crate::types::Passage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Runs top-k similarity search against a resolved collection.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    collection: CollectionHandle,
    top_k: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        collection: CollectionHandle,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            collection,
            top_k,
            timeout,
        }
    }

    pub fn collection(&self) -> &CollectionHandle {
        &self.collection
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Return up to `k` passages, most similar first. An empty result is not an error.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Passage>, RetrievalError> {
        let start = Instant::now();
        let search = self.index.search(&self.collection, question, self.top_k);
        let mut passages = tokio::time::timeout(self.timeout, search)
            .await
            .map_err(|_| RetrievalError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;
        // Backends are asked for k, but never trusted to honor it.
        passages.truncate(self.top_k);

        debug!(
            backend = self.index.backend_name(),
            collection = %self.collection.name,
            k = self.top_k,
            found = passages.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retrieval complete"
        );
        Ok(passages)
    }
}
