//! Brain module: LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait the generator streams answers through, and a
//! scriptable `MockLlmProvider` used by tests and offline runs.

use crate::error::LlmError;
use crate::types::{CompletionRequest, StreamEvent, TokenUsage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Trait for LLM providers that can stream a completion.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a streaming completion, sending events to the channel.
    ///
    /// Implementations push `StreamEvent::Token` in production order and finish
    /// with `StreamEvent::Done`. When `tx` is closed the implementation must stop
    /// reading from upstream and return.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// One scripted reply of the mock provider.
#[derive(Debug, Clone, Default)]
struct MockScript {
    chunks: Vec<String>,
    failure: Option<String>,
}

/// A scriptable provider for tests.
///
/// Replies are consumed in queue order; once the queue is empty the provider
/// keeps replaying its default script.
pub struct MockLlmProvider {
    model: String,
    default_script: MockScript,
    queued: Mutex<Vec<MockScript>>,
    chunk_delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            default_script: MockScript::default(),
            queued: Mutex::new(Vec::new()),
            chunk_delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that always streams the given chunks.
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut provider = Self::new();
        provider.default_script.chunks = chunks.into_iter().map(Into::into).collect();
        provider
    }

    /// Create a provider that streams `chunks` and then fails with `message`.
    pub fn failing_after<I, S>(chunks: I, message: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut provider = Self::with_chunks(chunks);
        provider.default_script.failure = Some(message.to_string());
        provider
    }

    /// Sleep this long before each chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Queue a one-off reply for the next call.
    pub fn queue_chunks<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockScript {
                chunks: chunks.into_iter().map(Into::into).collect(),
                failure: None,
            });
    }

    /// Number of streaming calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_script(&self) -> MockScript {
        let mut queued = self.queued.lock().unwrap_or_else(PoisonError::into_inner);
        if queued.is_empty() {
            self.default_script.clone()
        } else {
            queued.remove(0)
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let script = self.next_script();
        let mut output_tokens = 0;
        for chunk in script.chunks {
            if let Some(delay) = self.chunk_delay {
                tokio::time::sleep(delay).await;
            }
            if tx.send(StreamEvent::Token(chunk)).await.is_err() {
                // Receiver dropped, stop producing.
                return Ok(());
            }
            output_tokens += 1;
        }

        if let Some(message) = script.failure {
            return Err(LlmError::Streaming { message });
        }

        let _ = tx
            .send(StreamEvent::Done {
                usage: TokenUsage {
                    input_tokens: 0,
                    output_tokens,
                },
            })
            .await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(provider: &MockLlmProvider) -> (Vec<String>, Result<(), LlmError>) {
        let (tx, mut rx) = mpsc::channel(16);
        let result = provider
            .complete_streaming(CompletionRequest::default(), tx)
            .await;
        let mut tokens = Vec::new();
        while let Some(event) = rx.recv().await {
            if let StreamEvent::Token(t) = event {
                tokens.push(t);
            }
        }
        (tokens, result)
    }

    #[tokio::test]
    async fn test_mock_streams_default_chunks() {
        let provider = MockLlmProvider::with_chunks(["Hello", " world"]);
        let (tokens, result) = drain(&provider).await;
        assert!(result.is_ok());
        assert_eq!(tokens, vec!["Hello", " world"]);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_queued_reply_takes_precedence() {
        let provider = MockLlmProvider::with_chunks(["default"]);
        provider.queue_chunks(["queued"]);
        assert_eq!(drain(&provider).await.0, vec!["queued"]);
        assert_eq!(drain(&provider).await.0, vec!["default"]);
    }

    #[tokio::test]
    async fn test_mock_failing_after_emits_then_errors() {
        let provider = MockLlmProvider::failing_after(["a", "b"], "boom");
        let (tokens, result) = drain(&provider).await;
        assert_eq!(tokens, vec!["a", "b"]);
        assert!(matches!(result, Err(LlmError::Streaming { .. })));
    }

    #[tokio::test]
    async fn test_mock_stops_when_receiver_dropped() {
        let provider = MockLlmProvider::with_chunks(["a", "b", "c"]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = provider
            .complete_streaming(CompletionRequest::default(), tx)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let provider = MockLlmProvider::new();
        let _ = drain(&provider).await;
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(provider.model_name(), "mock-model");
    }
}
