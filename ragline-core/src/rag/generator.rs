//! Grounded answer generation with incremental token delivery.
//!
//! The provider pushes chunks into a bounded internal channel; the generator
//! drains it, forwards each chunk to the caller's sink and accumulates the
//! answer. Both channels are bounded, so a slow sink throttles the provider
//! instead of letting chunks pile up. Dropping the generation future drops the
//! provider call with it, which releases the upstream connection.

use crate::brain::LlmProvider;
use crate::error::{GenerationError, LlmError};
use crate::types::{CompletionRequest, Message, RagEvent, StreamEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Fixed instruction sent ahead of every question.
pub const SYSTEM_PROMPT: &str = "You answer questions using only the numbered context passages \
you are given. Cite the passages you rely on as [n]. If the context is missing or does not \
contain the answer, say that you don't know and suggest which documents should be ingested \
to answer the question better.";

/// Knobs fixed when a generator is bound into a pipeline.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout: Duration,
    /// Capacity of the provider-to-generator channel.
    pub stream_buffer: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
            stream_buffer: 64,
        }
    }
}

/// Streams a grounded answer from a language model.
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    settings: GenerationSettings,
}

impl Generator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: GenerationSettings) -> Self {
        Self { provider, settings }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Build the two-message prompt for one question.
    pub fn build_request(&self, question: &str, context: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(format!("Question: {}\n\nContext:\n{}", question, context)),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            model: None,
        }
    }

    /// Generate an answer, forwarding every chunk to `sink` as it arrives.
    ///
    /// Returns the concatenation of all chunks in production order; zero
    /// chunks yield an empty answer. On failure, chunks already forwarded stay
    /// delivered and no answer is returned.
    pub async fn generate(
        &self,
        question: &str,
        context: &str,
        sink: Option<&mpsc::Sender<RagEvent>>,
    ) -> Result<String, GenerationError> {
        let timeout = self.settings.timeout;
        tokio::time::timeout(timeout, self.stream_answer(question, context, sink))
            .await
            .map_err(|_| GenerationError::Timeout {
                timeout_secs: timeout.as_secs(),
            })?
    }

    async fn stream_answer(
        &self,
        question: &str,
        context: &str,
        sink: Option<&mpsc::Sender<RagEvent>>,
    ) -> Result<String, GenerationError> {
        let start = Instant::now();
        let request = self.build_request(question, context);
        let (tx, mut rx) = mpsc::channel(self.settings.stream_buffer.max(1));
        let mut producer = self.provider.complete_streaming(request, tx);
        let mut producer_result: Option<Result<(), LlmError>> = None;
        let mut answer = String::new();
        let mut chunks = 0usize;

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(StreamEvent::Token(chunk)) => {
                        if chunk.is_empty() {
                            continue;
                        }
                        answer.push_str(&chunk);
                        chunks += 1;
                        if let Some(sink) = sink
                            && sink.send(RagEvent::token(chunk)).await.is_err()
                        {
                            debug!(chunks, "Token sink closed, abandoning generation");
                            return Err(GenerationError::Cancelled);
                        }
                    }
                    Some(StreamEvent::Done { usage }) => {
                        debug!(
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            total_tokens = usage.total(),
                            "Provider reported usage"
                        );
                    }
                    Some(StreamEvent::Error(message)) => {
                        return Err(LlmError::Streaming { message }.into());
                    }
                    // Sender dropped: the provider call has finished.
                    None => break,
                },
                result = &mut producer, if producer_result.is_none() => {
                    producer_result = Some(result);
                }
            }
        }

        let result = match producer_result {
            Some(result) => result,
            None => producer.await,
        };
        result?;

        debug!(
            model = self.provider.model_name(),
            chunks,
            answer_chars = answer.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(answer)
    }
}
