//! In-memory index with fixed, pre-ranked passages per collection.
//!
//! Used by tests and offline demos. Searches return the stored passages in
//! stored order, truncated to `k`; the fixture order stands in for ranking.

use super::{CollectionHandle, VectorIndex};
use crate::error::RetrievalError;
use crate::types::Passage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Static passages keyed by collection name.
#[derive(Default)]
pub struct StaticIndex {
    collections: HashMap<String, Vec<Passage>>,
    failure: Mutex<Option<String>>,
    search_delay: Option<Duration>,
    resolve_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl StaticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection and its ranked passages.
    pub fn with_collection(mut self, name: &str, passages: Vec<Passage>) -> Self {
        self.collections.insert(name.to_string(), passages);
        self
    }

    /// Delay every search, e.g. to exercise deadlines.
    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    /// Make every subsequent search fail as if the backend were down.
    pub fn fail_searches(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    /// Let searches succeed again.
    pub fn heal(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn resolve_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn resolve(&self, collection: &str) -> Result<CollectionHandle, RetrievalError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if !self.collections.contains_key(collection) {
            return Err(RetrievalError::CollectionNotFound {
                name: collection.to_string(),
            });
        }
        Ok(CollectionHandle {
            name: collection.to_string(),
            id: collection.to_string(),
        })
    }

    async fn search(
        &self,
        collection: &CollectionHandle,
        _query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, RetrievalError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(message) = failure {
            return Err(RetrievalError::Unreachable { message });
        }
        let passages = self
            .collections
            .get(&collection.id)
            .ok_or_else(|| RetrievalError::CollectionNotFound {
                name: collection.name.clone(),
            })?;
        Ok(passages.iter().take(k).cloned().collect())
    }

    fn backend_name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> StaticIndex {
        StaticIndex::new().with_collection(
            "docs",
            vec![
                Passage::new("a").with_source("f1"),
                Passage::new("b").with_source("f2"),
                Passage::new("c").with_source("f3"),
            ],
        )
    }

    #[tokio::test]
    async fn test_search_truncates_to_k_in_order() {
        let index = index();
        let handle = index.resolve("docs").await.unwrap();
        let passages = index.search(&handle, "anything", 2).await.unwrap();
        let contents: Vec<_> = passages.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
        assert_eq!(index.search_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_collection() {
        let index = index();
        let err = index.resolve("missing").await.unwrap_err();
        assert!(matches!(err, RetrievalError::CollectionNotFound { .. }));
        assert_eq!(index.resolve_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection_and_heal() {
        let index = index();
        let handle = index.resolve("docs").await.unwrap();
        index.fail_searches("index offline");
        assert!(matches!(
            index.search(&handle, "q", 4).await,
            Err(RetrievalError::Unreachable { .. })
        ));
        index.heal();
        assert_eq!(index.search(&handle, "q", 4).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_collection_is_not_an_error() {
        let index = StaticIndex::new().with_collection("empty", Vec::new());
        let handle = index.resolve("empty").await.unwrap();
        assert!(index.search(&handle, "q", 4).await.unwrap().is_empty());
    }
}
