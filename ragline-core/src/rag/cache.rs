//! Bounded, single-flight pipeline cache.
//!
//! Built pipelines live in an LRU. Builds in progress live in a separate
//! pending map keyed by collection, each behind a `tokio::sync::OnceCell`, so
//! concurrent misses for the same key await one shared build and an in-flight
//! build is never evicted. A pipeline enters the LRU only once its build
//! succeeds; failed builds leave nothing behind and never displace a cached
//! entry.
//!
//! Hits are not lock-free. Promoting an entry in the LRU mutates its recency
//! list, so each lookup takes the map mutex for one O(1) operation. The mutex
//! is never held across an await and builds run outside it.

use super::pipeline::{Pipeline, PipelineFactory};
use crate::error::RagError;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

type BuildSlot = Arc<OnceCell<Result<Arc<Pipeline>, RagError>>>;

struct Slots {
    ready: LruCache<String, Arc<Pipeline>>,
    pending: HashMap<String, BuildSlot>,
}

/// LRU cache of collection pipelines with explicit lifecycle control.
pub struct PipelineCache {
    factory: Arc<dyn PipelineFactory>,
    slots: Mutex<Slots>,
    builds: AtomicUsize,
}

impl PipelineCache {
    /// Create a cache holding at most `capacity` pipelines (minimum 1).
    pub fn new(factory: Arc<dyn PipelineFactory>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            factory,
            slots: Mutex::new(Slots {
                ready: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
            builds: AtomicUsize::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the pipeline for `collection`, building it on first use.
    ///
    /// Concurrent callers for an uncached key share a single build. Evicting
    /// or invalidating an entry never affects pipelines already handed out.
    pub async fn get_or_build(&self, collection: &str) -> Result<Arc<Pipeline>, RagError> {
        let slot = {
            let mut slots = self.slots();
            if let Some(pipeline) = slots.ready.get(collection) {
                return Ok(pipeline.clone());
            }
            slots
                .pending
                .entry(collection.to_string())
                .or_default()
                .clone()
        };

        slot.get_or_init(|| async {
            self.builds.fetch_add(1, Ordering::SeqCst);
            debug!(collection, "Building pipeline");
            let outcome = self.factory.build(collection).await.map(Arc::new);
            self.settle(collection, &slot, &outcome);
            outcome
        })
        .await
        .clone()
    }

    /// Retire the pending slot and, on success, publish the pipeline.
    ///
    /// Nothing is published if the slot was invalidated while building.
    fn settle(
        &self,
        collection: &str,
        slot: &BuildSlot,
        outcome: &Result<Arc<Pipeline>, RagError>,
    ) {
        let mut slots = self.slots();
        let owned = slots
            .pending
            .get(collection)
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        if owned {
            slots.pending.remove(collection);
        }

        match outcome {
            Ok(pipeline) if owned => {
                if let Some((evicted, _)) = slots.ready.push(collection.to_string(), pipeline.clone())
                    && evicted != collection
                {
                    debug!(evicted = %evicted, "Evicted least recently used pipeline");
                }
            }
            Ok(_) => debug!(collection, "Pipeline invalidated during build, not cached"),
            Err(e) => warn!(collection, error = %e, "Pipeline build failed"),
        }
    }

    /// Drop the entry for `collection`, including a build still in progress.
    /// Returns whether a built pipeline was present.
    pub fn invalidate(&self, collection: &str) -> bool {
        let mut slots = self.slots();
        slots.pending.remove(collection);
        slots.ready.pop(collection).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut slots = self.slots();
        slots.pending.clear();
        slots.ready.clear();
    }

    /// Number of built pipelines currently cached.
    pub fn len(&self) -> usize {
        self.slots().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().ready.is_empty()
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.slots().ready.contains(collection)
    }

    pub fn capacity(&self) -> usize {
        self.slots().ready.cap().get()
    }

    /// Number of pipeline builds started since creation.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::RetrievalError;
    use crate::index::StaticIndex;
    use crate::rag::pipeline::{IndexPipelineFactory, PipelineSettings};
    use crate::types::Passage;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Wraps the real factory with a delay so builds overlap.
    struct SlowFactory {
        inner: IndexPipelineFactory,
        delay: Duration,
    }

    #[async_trait]
    impl PipelineFactory for SlowFactory {
        async fn build(&self, collection: &str) -> Result<Pipeline, RagError> {
            tokio::time::sleep(self.delay).await;
            self.inner.build(collection).await
        }
    }

    fn index() -> Arc<StaticIndex> {
        Arc::new(
            StaticIndex::new()
                .with_collection("docs", vec![Passage::new("a")])
                .with_collection("hr-handbook", vec![Passage::new("b")])
                .with_collection("eng-notes", vec![Passage::new("c")]),
        )
    }

    fn cache(index: Arc<StaticIndex>, capacity: usize) -> PipelineCache {
        let inner = IndexPipelineFactory::new(
            index,
            Arc::new(MockLlmProvider::new()),
            PipelineSettings::default(),
        );
        let factory = SlowFactory {
            inner,
            delay: Duration::from_millis(20),
        };
        PipelineCache::new(Arc::new(factory), capacity)
    }

    #[tokio::test]
    async fn test_hit_returns_same_pipeline() {
        let cache = cache(index(), 8);
        let first = cache.get_or_build("docs").await.unwrap();
        let second = cache.get_or_build("docs").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.build_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_build_once() {
        let index = index();
        let cache = Arc::new(cache(index.clone(), 8));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_build("docs").await })
            })
            .collect();

        let mut pipelines = Vec::new();
        for handle in handles {
            pipelines.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(cache.build_count(), 1);
        assert_eq!(index.resolve_count(), 1);
        assert!(pipelines.iter().all(|p| Arc::ptr_eq(p, &pipelines[0])));
    }

    #[tokio::test]
    async fn test_distinct_keys_build_separately() {
        let cache = cache(index(), 8);
        let docs = cache.get_or_build("docs").await.unwrap();
        let hr = cache.get_or_build("hr-handbook").await.unwrap();
        assert!(!Arc::ptr_eq(&docs, &hr));
        assert_eq!(hr.collection(), "hr-handbook");
        assert_eq!(cache.build_count(), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction_keeps_handed_out_pipeline_valid() {
        let cache = cache(index(), 2);
        let docs = cache.get_or_build("docs").await.unwrap();
        cache.get_or_build("hr-handbook").await.unwrap();
        // Touch docs so hr-handbook becomes least recently used.
        cache.get_or_build("docs").await.unwrap();
        cache.get_or_build("eng-notes").await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("docs"));
        assert!(!cache.contains("hr-handbook"));
        assert!(cache.contains("eng-notes"));

        cache.invalidate("docs");
        // The evicted pipeline still works for whoever holds it.
        assert_eq!(docs.retriever.retrieve("q").await.unwrap().len(), 1);

        cache.get_or_build("hr-handbook").await.unwrap();
        assert_eq!(cache.build_count(), 4);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache(index(), 8);
        let first = cache.get_or_build("docs").await.unwrap();
        cache.get_or_build("hr-handbook").await.unwrap();

        assert!(cache.invalidate("docs"));
        assert!(!cache.invalidate("docs"));
        let rebuilt = cache.get_or_build("docs").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(cache.build_count(), 3);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_leaves_no_entry() {
        let cache = cache(index(), 8);
        let err = cache.get_or_build("missing").await.err().unwrap();
        assert!(matches!(
            err,
            RagError::Retrieval(RetrievalError::CollectionNotFound { .. })
        ));
        assert!(!cache.contains("missing"));
        assert!(cache.is_empty());

        // A later request tries again instead of replaying the failure.
        cache.get_or_build("missing").await.err().unwrap();
        assert_eq!(cache.build_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_failed_build_is_shared() {
        let cache = cache(index(), 8);
        let results =
            futures::future::join_all((0..8).map(|_| cache.get_or_build("missing"))).await;
        assert!(results.iter().all(Result::is_err));
        assert_eq!(cache.build_count(), 1);
        assert!(!cache.contains("missing"));
    }

    #[tokio::test]
    async fn test_failed_build_at_capacity_keeps_cached_pipelines() {
        let cache = cache(index(), 2);
        cache.get_or_build("docs").await.unwrap();
        cache.get_or_build("hr-handbook").await.unwrap();

        cache.get_or_build("no-such-collection").await.err().unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("docs"));
        assert!(cache.contains("hr-handbook"));
        cache.get_or_build("docs").await.unwrap();
        assert_eq!(cache.build_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_build_survives_eviction_pressure() {
        let index = index();
        let cache = Arc::new(cache(index.clone(), 1));

        let spawn_get = |collection: &'static str| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_build(collection).await })
        };
        // Builds take 20ms; both requests below land while docs is still building.
        let first_docs = spawn_get("docs");
        tokio::time::sleep(Duration::from_millis(5)).await;
        let hr = spawn_get("hr-handbook");
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second_docs = spawn_get("docs");

        let first_docs = first_docs.await.unwrap().unwrap();
        let second_docs = second_docs.await.unwrap().unwrap();
        hr.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first_docs, &second_docs));
        assert_eq!(cache.build_count(), 2);
        assert_eq!(index.resolve_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_build_discards_result() {
        let cache = Arc::new(cache(index(), 8));
        let building = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_build("docs").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(!cache.invalidate("docs"));
        // The waiting caller still gets its pipeline, but it is not cached.
        building.await.unwrap().unwrap();
        assert!(!cache.contains("docs"));
        cache.get_or_build("docs").await.unwrap();
        assert_eq!(cache.build_count(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = cache(index(), 0);
        assert_eq!(cache.capacity(), 1);
    }
}
